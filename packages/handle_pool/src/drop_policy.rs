/// Determines how the pool reacts to being dropped while slots are still
/// allocated.
///
/// By default the pool releases all of its arenas regardless of outstanding
/// handles, which implicitly invalidates every handle - exactly the documented
/// contract of pool teardown.
///
/// # Examples
///
/// ```
/// use handle_pool::{DropPolicy, HandlePool};
///
/// // The drop policy is set at pool creation time.
/// let pool = HandlePool::builder()
///     .slot_size(32)
///     .initial_slots(8)
///     .drop_policy(DropPolicy::MustNotDropSlots)
///     .build()?;
/// # Ok::<(), handle_pool::PoolError>(())
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool releases its arenas when dropped even if slots are still
    /// allocated. This is the default. Any handle still held afterward is
    /// permanently invalid.
    #[default]
    MayDropSlots,

    /// The pool panics if any slot is still allocated when it is dropped.
    ///
    /// This may be valuable as a leak tripwire when every allocation is
    /// expected to be paired with a free before teardown, or when unsafe code
    /// holds resolved slot pointers that must not outlive their slots.
    MustNotDropSlots,
}
