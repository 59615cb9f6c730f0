use thiserror::Error;

/// Errors reported by pool operations.
///
/// Every failure is local and synchronous: a failed operation never aborts the
/// process and never leaves the pool in an inconsistent state. Failed
/// operations are no-ops on the pool's visible state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// A creation or expansion parameter was invalid. This is a caller bug;
    /// the pool never retries or adjusts parameters on the caller's behalf.
    #[error("invalid pool configuration: {problem}")]
    InvalidConfig {
        /// A human-readable description of the parameter problem.
        problem: String,
    },

    /// The underlying allocation for a new arena could not be satisfied.
    ///
    /// The caller may retry after releasing memory pressure elsewhere; the
    /// pool itself performs no automatic retry.
    #[error("failed to allocate {bytes} bytes for a new arena")]
    OutOfMemory {
        /// The size of the allocation request that the system allocator declined.
        bytes: usize,
    },

    /// The free list was empty at allocation time.
    ///
    /// This is an expected, recoverable condition, not a bug: the pool never
    /// grows implicitly, so the caller decides whether to
    /// [`expand()`](crate::HandlePool::expand) or to propagate the error.
    #[error("no free slots remain in the pool; call expand() before allocating again")]
    PoolExhausted,

    /// The handle's slot index does not reference any slot issued by this
    /// pool. This is a caller bug and is always reported.
    #[error("handle index {index} does not reference any slot issued by this pool")]
    InvalidHandle {
        /// The slot index carried by the rejected handle.
        index: u16,
    },

    /// The handle's generation no longer matches its slot, covering both
    /// use-after-free and double-free. This is a caller bug and is never
    /// silently tolerated.
    #[error(
        "stale handle for slot {index}: handle carries generation {handle_generation} but the slot is at generation {slot_generation}"
    )]
    StaleHandle {
        /// The slot index carried by the rejected handle.
        index: u16,

        /// The generation snapshot the handle was issued with.
        handle_generation: u16,

        /// The generation the slot currently carries.
        slot_generation: u16,
    },
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`PoolError`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, PoolError>;
