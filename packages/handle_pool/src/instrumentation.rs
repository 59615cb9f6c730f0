use std::fmt;
use std::ptr::NonNull;

/// Byte-level memory instrumentation callbacks for a
/// [`HandlePool`](crate::HandlePool).
///
/// These exist to let an external memory-checking tool observe slot lifetimes
/// at the byte level: mark a fresh arena inaccessible, a just-allocated slot
/// accessible, and a just-freed slot inaccessible again. They are a capability,
/// not a dependency - the pool's generation check is the primary, always-on
/// defense and behaves identically whether or not instrumentation is wired in.
///
/// Every callback has a no-op default body, so an implementation overrides
/// only the events it cares about. Callbacks receive `&self`; implementations
/// that record state use interior mutability.
///
/// Wire an implementation in through
/// [`HandlePoolBuilder::instrumentation()`](crate::HandlePoolBuilder::instrumentation).
///
/// # Example
///
/// ```rust
/// use std::ptr::NonNull;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use handle_pool::{HandlePool, PoolInstrumentation};
///
/// #[derive(Debug, Default)]
/// struct AllocationCounter {
///     allocated: AtomicUsize,
/// }
///
/// impl PoolInstrumentation for AllocationCounter {
///     fn on_slot_allocated(&self, slot: NonNull<u8>, len: usize) {
///         let _ = (slot, len);
///         self.allocated.fetch_add(1, Ordering::Relaxed);
///     }
/// }
///
/// let mut pool = HandlePool::builder()
///     .slot_size(16)
///     .initial_slots(4)
///     .instrumentation(AllocationCounter::default())
///     .build()?;
///
/// let _handle = pool.allocate()?;
/// # Ok::<(), handle_pool::PoolError>(())
/// ```
pub trait PoolInstrumentation: fmt::Debug + Send {
    /// Called once per arena, immediately after its region is allocated and
    /// before any slot in it can be handed out. The region covers the arena's
    /// entire allocation; a memory checker would mark it inaccessible until
    /// individual slots are allocated.
    fn on_region_created(&self, region: NonNull<u8>, len: usize) {
        let _ = (region, len);
    }

    /// Called when a slot is handed out; `slot` is the base address of the
    /// slot's data region and `len` is the pool's slot size.
    fn on_slot_allocated(&self, slot: NonNull<u8>, len: usize) {
        let _ = (slot, len);
    }

    /// Called when a slot is returned to the free list; the data region must
    /// no longer be touched by the former handle holder.
    fn on_slot_freed(&self, slot: NonNull<u8>, len: usize) {
        let _ = (slot, len);
    }
}

/// The default instrumentation: every callback does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInstrumentation;

impl PoolInstrumentation for NoInstrumentation {}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(NoInstrumentation: Send, Sync, Copy, Debug, Default);

    #[test]
    fn default_callbacks_accept_any_region() {
        let instrumentation = NoInstrumentation;

        let mut bytes = [0_u8; 4];
        let ptr = NonNull::new(bytes.as_mut_ptr()).expect("stack array address is never null");

        instrumentation.on_region_created(ptr, bytes.len());
        instrumentation.on_slot_allocated(ptr, bytes.len());
        instrumentation.on_slot_freed(ptr, bytes.len());
    }
}
