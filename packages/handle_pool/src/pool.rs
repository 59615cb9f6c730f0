use std::num::NonZero;
use std::ptr::NonNull;
use std::thread;

use crate::error::{PoolError, Result};
use crate::{
    Arena, DropPolicy, FREE_LIST_NIL, Handle, HandlePoolBuilder, PoolInstrumentation, SlotMeta,
};

/// A slab pool of uniformly sized memory slots, identified by stable
/// generation-checked [`Handle`] values instead of raw pointers.
///
/// The pool hands out fixed-size slots in O(1) via an intrusive free list and
/// takes them back in O(1). Capacity grows only on explicit
/// [`expand()`](Self::expand) calls; growth appends a new arena and never
/// moves existing slots, so every outstanding handle and resolved pointer
/// stays valid across growth.
///
/// Each slot carries a generation counter that advances every time the slot
/// is reallocated. A handle snapshots the generation at allocation time, and
/// the pool checks the snapshot on every [`free()`](Self::free) and
/// [`resolve()`](Self::resolve). Handles that outlive their allocation are
/// therefore rejected with [`PoolError::StaleHandle`] instead of silently
/// aliasing the slot's next occupant. This catches use-after-free and
/// double-free at the API boundary.
///
/// # Example
///
/// ```rust
/// use handle_pool::HandlePool;
///
/// let mut pool = HandlePool::new(64, 32)?;
///
/// let handle = pool.allocate()?;
///
/// // Handles are plain Copy values; stash them anywhere.
/// let data = pool.resolve(handle)?;
///
/// // SAFETY: the slot is ours until we free it, and a usize fits in 32
/// // word-aligned bytes.
/// unsafe {
///     data.cast::<usize>().write(42);
/// }
///
/// pool.free(handle)?;
///
/// // The handle is now dead; the pool says so instead of handing back
/// // someone else's memory.
/// assert!(pool.resolve(handle).is_err());
/// # Ok::<(), handle_pool::PoolError>(())
/// ```
///
/// # Thread safety
///
/// The pool is single-threaded: all mutation goes through `&mut self`, so the
/// type is `Send` but not `Sync`. Wrap it in a `Mutex` for shared use.
#[derive(Debug)]
pub struct HandlePool {
    /// Usable bytes per slot, fixed at creation.
    slot_size: usize,

    /// Arenas in ascending base index order. Never empty after construction.
    arenas: Vec<Arena>,

    /// Global index of the first free slot, or [`FREE_LIST_NIL`].
    free_head: u32,

    /// Total slots across all arenas. Capped at [`Self::MAX_SLOTS`].
    total_slots: u32,

    /// Number of currently allocated slots.
    allocated: usize,

    drop_policy: DropPolicy,

    instrumentation: Box<dyn PoolInstrumentation>,
}

impl HandlePool {
    /// The maximum number of slots a pool may hold, across all arenas.
    ///
    /// Handles index slots with 16 bits, so the global index space is
    /// exactly this large. Creation or expansion beyond the cap fails with
    /// [`PoolError::InvalidConfig`].
    pub const MAX_SLOTS: usize = 1 << 16;

    /// The minimum accepted slot size, one machine word.
    ///
    /// Smaller slots would waste more on bookkeeping than they store, and
    /// word-size slots guarantee callers can always write a pointer or
    /// `usize` into a slot.
    pub const MIN_SLOT_SIZE: usize = size_of::<usize>();

    /// Creates a pool with `initial_slots` slots of `slot_size` bytes each,
    /// using default policies.
    ///
    /// Use [`builder()`](Self::builder) to customize the drop policy or to
    /// attach instrumentation.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if `initial_slots` is zero or
    /// exceeds [`Self::MAX_SLOTS`], or if `slot_size` is below
    /// [`Self::MIN_SLOT_SIZE`]. Returns [`PoolError::OutOfMemory`] if the
    /// initial arena cannot be allocated.
    ///
    /// # Example
    ///
    /// ```rust
    /// use handle_pool::HandlePool;
    ///
    /// let pool = HandlePool::new(128, 64)?;
    ///
    /// assert_eq!(pool.capacity(), 128);
    /// assert_eq!(pool.slot_size(), 64);
    /// assert!(pool.is_empty());
    /// # Ok::<(), handle_pool::PoolError>(())
    /// ```
    pub fn new(initial_slots: usize, slot_size: usize) -> Result<Self> {
        Self::builder()
            .initial_slots(initial_slots)
            .slot_size(slot_size)
            .build()
    }

    /// Starts building a pool with a custom configuration.
    #[must_use]
    pub fn builder() -> HandlePoolBuilder {
        HandlePoolBuilder::new()
    }

    pub(crate) fn new_inner(
        initial_slots: usize,
        slot_size: usize,
        drop_policy: DropPolicy,
        instrumentation: Box<dyn PoolInstrumentation>,
    ) -> Result<Self> {
        if slot_size < Self::MIN_SLOT_SIZE {
            return Err(PoolError::InvalidConfig {
                problem: format!(
                    "slot_size {slot_size} is below the minimum of {} bytes",
                    Self::MIN_SLOT_SIZE
                ),
            });
        }

        if initial_slots == 0 {
            return Err(PoolError::InvalidConfig {
                problem: "initial_slots must be non-zero".to_string(),
            });
        }

        let mut pool = Self {
            slot_size,
            arenas: Vec::new(),
            free_head: FREE_LIST_NIL,
            total_slots: 0,
            allocated: 0,
            drop_policy,
            instrumentation,
        };

        pool.expand(initial_slots)?;

        Ok(pool)
    }

    /// Checks out a free slot and returns a handle to it.
    ///
    /// The returned handle carries the slot's freshly advanced generation.
    /// Slot contents are uninitialized; the holder is expected to write
    /// before reading.
    ///
    /// O(1): pops the head of the free list.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolExhausted`] when no free slot remains. The
    /// pool never grows implicitly; call [`expand()`](Self::expand) and
    /// retry.
    ///
    /// # Example
    ///
    /// ```rust
    /// use handle_pool::{HandlePool, PoolError};
    ///
    /// let mut pool = HandlePool::new(1, 16)?;
    ///
    /// let handle = pool.allocate()?;
    /// assert_eq!(pool.len(), 1);
    ///
    /// // The only slot is taken now.
    /// assert!(matches!(pool.allocate(), Err(PoolError::PoolExhausted)));
    ///
    /// pool.free(handle)?;
    /// # Ok::<(), handle_pool::PoolError>(())
    /// ```
    pub fn allocate(&mut self) -> Result<Handle> {
        let global_index = self.free_head;

        if global_index == FREE_LIST_NIL {
            return Err(PoolError::PoolExhausted);
        }

        let (arena_index, local_index) = self
            .locate(global_index)
            .expect("free list entries always reference slots owned by this pool");

        let arena = self
            .arenas
            .get_mut(arena_index)
            .expect("locate() returned an in-bounds arena index");

        let meta = arena.slot_meta_mut(local_index);

        let SlotMeta::Free {
            generation,
            next_free,
        } = *meta
        else {
            unreachable!("free list head references an occupied slot");
        };

        let generation = next_generation(generation);
        *meta = SlotMeta::Occupied { generation };

        let data_ptr = arena.data_ptr(local_index);

        self.free_head = next_free;

        // Cannot overflow: bounded by MAX_SLOTS.
        self.allocated = self.allocated.wrapping_add(1);

        self.instrumentation
            .on_slot_allocated(data_ptr, self.slot_size);

        let index =
            u16::try_from(global_index).expect("global indexes are capped at 16 bits by MAX_SLOTS");

        Ok(Handle::from_parts(index, generation))
    }

    /// Returns a slot to the pool, invalidating `handle` and every copy of it.
    ///
    /// Freeing [`Handle::NONE`] is an explicitly supported no-op, so callers
    /// can unconditionally free optional handle fields.
    ///
    /// O(1): pushes the slot onto the free list. Failed frees change nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] if the handle's index references
    /// no slot of this pool, and [`PoolError::StaleHandle`] if the slot is
    /// already free or has been reallocated since the handle was issued.
    /// A double free is therefore reported, not absorbed:
    ///
    /// ```rust
    /// use handle_pool::{HandlePool, PoolError};
    ///
    /// let mut pool = HandlePool::new(4, 16)?;
    ///
    /// let handle = pool.allocate()?;
    /// pool.free(handle)?;
    ///
    /// assert!(matches!(
    ///     pool.free(handle),
    ///     Err(PoolError::StaleHandle { .. })
    /// ));
    /// # Ok::<(), handle_pool::PoolError>(())
    /// ```
    pub fn free(&mut self, handle: Handle) -> Result<()> {
        if handle.is_none() {
            return Ok(());
        }

        let index = handle.index();
        let global_index = u32::from(index);

        let Some((arena_index, local_index)) = self.locate(global_index) else {
            return Err(PoolError::InvalidHandle { index });
        };

        let arena = self
            .arenas
            .get_mut(arena_index)
            .expect("locate() returned an in-bounds arena index");

        let meta = arena.slot_meta_mut(local_index);

        match *meta {
            SlotMeta::Occupied { generation } if generation == handle.generation() => {
                // The generation is retained on the free slot so that the
                // next allocation advances past it.
                *meta = SlotMeta::Free {
                    generation,
                    next_free: self.free_head,
                };

                let data_ptr = arena.data_ptr(local_index);

                self.free_head = global_index;

                // Cannot underflow: the slot we just released was counted.
                self.allocated = self.allocated.wrapping_sub(1);

                self.instrumentation.on_slot_freed(data_ptr, self.slot_size);

                Ok(())
            }
            SlotMeta::Occupied { generation } | SlotMeta::Free { generation, .. } => {
                Err(PoolError::StaleHandle {
                    index,
                    handle_generation: handle.generation(),
                    slot_generation: generation,
                })
            }
        }
    }

    /// Grows the pool by `additional_slots` slots without invalidating any
    /// outstanding handle or resolved pointer.
    ///
    /// Growth allocates one new arena and splices its slots onto the front of
    /// the free list, so allocations immediately after an expansion prefer
    /// the fresh slots.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if `additional_slots` is zero or
    /// would push the pool past [`Self::MAX_SLOTS`], and
    /// [`PoolError::OutOfMemory`] if the arena allocation fails. The pool is
    /// unchanged on failure.
    ///
    /// # Example
    ///
    /// ```rust
    /// use handle_pool::{HandlePool, PoolError};
    ///
    /// let mut pool = HandlePool::new(1, 16)?;
    /// let first = pool.allocate()?;
    ///
    /// // Exhaustion is the caller's signal to grow.
    /// assert!(matches!(pool.allocate(), Err(PoolError::PoolExhausted)));
    /// pool.expand(8)?;
    ///
    /// let second = pool.allocate()?;
    ///
    /// // Growth did not disturb the pre-existing allocation.
    /// assert!(pool.resolve(first).is_ok());
    /// assert!(pool.resolve(second).is_ok());
    /// assert_eq!(pool.capacity(), 9);
    /// # Ok::<(), handle_pool::PoolError>(())
    /// ```
    pub fn expand(&mut self, additional_slots: usize) -> Result<()> {
        if additional_slots == 0 {
            return Err(PoolError::InvalidConfig {
                problem: "cannot expand a pool by zero slots".to_string(),
            });
        }

        let current = usize::try_from(self.total_slots)
            .expect("u32 always fits in usize on supported platforms");

        let within_cap = current
            .checked_add(additional_slots)
            .is_some_and(|total| total <= Self::MAX_SLOTS);

        if !within_cap {
            return Err(PoolError::InvalidConfig {
                problem: format!(
                    "expanding a pool of {current} slots by {additional_slots} would exceed the maximum of {} slots",
                    Self::MAX_SLOTS
                ),
            });
        }

        let slot_count = u32::try_from(additional_slots)
            .expect("bounded by MAX_SLOTS, which fits in u32");
        let slot_count = NonZero::new(slot_count).expect("zero was rejected above");

        let base_index = self.total_slots;

        let mut arena = Arena::new(base_index, slot_count, self.slot_size)?;

        // The arena's slots arrive pre-chained in ascending order with the
        // last slot unterminated. Splice the chain onto the current free list.
        {
            // Cannot underflow: slot_count is NonZero.
            let last_local = slot_count.get().wrapping_sub(1);

            let meta = arena.slot_meta_mut(last_local);

            let SlotMeta::Free { generation, .. } = *meta else {
                unreachable!("a fresh arena contains only free slots");
            };

            *meta = SlotMeta::Free {
                generation,
                next_free: self.free_head,
            };
        }

        self.instrumentation
            .on_region_created(arena.region_ptr(), arena.region_len());

        self.arenas.push(arena);
        self.free_head = base_index;

        // Cannot overflow: checked against MAX_SLOTS above.
        self.total_slots = self.total_slots.wrapping_add(slot_count.get());

        Ok(())
    }

    /// Translates a handle into the base address of its slot's data region.
    ///
    /// The pointer is valid for reads and writes of up to
    /// [`slot_size()`](Self::slot_size) bytes, is aligned for `usize`, and
    /// stays valid until the slot is freed or the pool is dropped, whichever
    /// comes first. The pool does not track resolved pointers; the handle
    /// remains the unit of ownership.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidHandle`] for [`Handle::NONE`] and for
    /// indexes outside the pool, and [`PoolError::StaleHandle`] when the
    /// handle's generation snapshot no longer matches the slot.
    ///
    /// # Example
    ///
    /// ```rust
    /// use handle_pool::HandlePool;
    ///
    /// let mut pool = HandlePool::new(8, 16)?;
    /// let handle = pool.allocate()?;
    ///
    /// let data = pool.resolve(handle)?;
    ///
    /// // SAFETY: we own the slot and a usize fits in 16 word-aligned bytes.
    /// unsafe {
    ///     data.cast::<usize>().write(7);
    ///     assert_eq!(data.cast::<usize>().read(), 7);
    /// }
    ///
    /// pool.free(handle)?;
    /// # Ok::<(), handle_pool::PoolError>(())
    /// ```
    pub fn resolve(&self, handle: Handle) -> Result<NonNull<u8>> {
        let index = handle.index();

        if handle.is_none() {
            return Err(PoolError::InvalidHandle { index });
        }

        let global_index = u32::from(index);

        let Some((arena_index, local_index)) = self.locate(global_index) else {
            return Err(PoolError::InvalidHandle { index });
        };

        let arena = self
            .arenas
            .get(arena_index)
            .expect("locate() returned an in-bounds arena index");

        match *arena.slot_meta(local_index) {
            SlotMeta::Occupied { generation } if generation == handle.generation() => {
                Ok(arena.data_ptr(local_index))
            }
            SlotMeta::Occupied { generation } | SlotMeta::Free { generation, .. } => {
                Err(PoolError::StaleHandle {
                    index,
                    handle_generation: handle.generation(),
                    slot_generation: generation,
                })
            }
        }
    }

    /// The number of currently allocated slots.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use and/or infinite loop.
    #[inline]
    pub fn len(&self) -> usize {
        self.allocated
    }

    /// Whether the pool has no allocated slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocated == 0
    }

    /// The total number of slots, allocated and free, across all arenas.
    #[must_use]
    pub fn capacity(&self) -> usize {
        usize::try_from(self.total_slots).expect("u32 always fits in usize on supported platforms")
    }

    /// The number of slots available for allocation without expanding.
    #[must_use]
    pub fn free_slot_count(&self) -> usize {
        // Cannot underflow: allocated never exceeds the slot total.
        self.capacity().wrapping_sub(self.allocated)
    }

    /// The usable size in bytes of every slot.
    #[must_use]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Maps a global slot index to (arena index, local index within arena).
    ///
    /// Arenas are sorted by base index, so a binary search finds the last
    /// arena whose range starts at or below the global index.
    fn locate(&self, global_index: u32) -> Option<(usize, u32)> {
        if global_index >= self.total_slots {
            return None;
        }

        // Cannot underflow: the first arena starts at base index 0, so the
        // partition point is at least 1 for any in-range index.
        let arena_index = self
            .arenas
            .partition_point(|arena| arena.base_index() <= global_index)
            .wrapping_sub(1);

        let arena = self.arenas.get(arena_index)?;

        debug_assert!(arena.contains(global_index));

        Some((arena_index, global_index.wrapping_sub(arena.base_index())))
    }

    /// Verifies free list consistency: no cycles, only free slots on the
    /// list, and a length matching the free slot count.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        let mut seen = 0_usize;
        let mut cursor = self.free_head;

        while cursor != FREE_LIST_NIL {
            assert!(seen < Self::MAX_SLOTS, "free list contains a cycle");

            let (arena_index, local_index) = self
                .locate(cursor)
                .expect("free list references a slot outside the pool");

            let arena = self
                .arenas
                .get(arena_index)
                .expect("locate() returned an in-bounds arena index");

            let SlotMeta::Free { next_free, .. } = *arena.slot_meta(local_index) else {
                panic!("free list references occupied slot {cursor}");
            };

            cursor = next_free;
            seen = seen.wrapping_add(1);
        }

        assert_eq!(
            seen,
            self.free_slot_count(),
            "free list length disagrees with the allocation counters"
        );
    }
}

/// Advances a slot generation, skipping the reserved value 0 on wraparound so
/// that no issued handle ever equals [`Handle::NONE`].
fn next_generation(generation: u16) -> u16 {
    let next = generation.wrapping_add(1);
    if next == 0 { 1 } else { next }
}

impl Drop for HandlePool {
    fn drop(&mut self) {
        if thread::panicking() {
            // Do not double panic; it obscures the original problem.
            return;
        }

        if matches!(self.drop_policy, DropPolicy::MustNotDropSlots) {
            assert!(
                self.allocated == 0,
                "dropped a pool with {} slots still allocated under DropPolicy::MustNotDropSlots",
                self.allocated
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::fmt::Debug;
    use std::ptr::NonNull;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(HandlePool: Send, Debug);
    assert_not_impl_any!(HandlePool: Sync, Clone);

    #[test]
    fn new_pool_is_empty_with_requested_capacity() {
        let pool = HandlePool::new(16, 32).expect("valid configuration");

        assert_eq!(pool.capacity(), 16);
        assert_eq!(pool.len(), 0);
        assert!(pool.is_empty());
        assert_eq!(pool.free_slot_count(), 16);
        assert_eq!(pool.slot_size(), 32);
    }

    #[test]
    fn zero_initial_slots_is_rejected() {
        assert!(matches!(
            HandlePool::new(0, 16),
            Err(PoolError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn undersized_slots_are_rejected() {
        assert!(matches!(
            HandlePool::new(4, HandlePool::MIN_SLOT_SIZE - 1),
            Err(PoolError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn oversized_initial_capacity_is_rejected() {
        assert!(matches!(
            HandlePool::new(HandlePool::MAX_SLOTS + 1, 16),
            Err(PoolError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn allocate_and_free_round_trip() {
        let mut pool = HandlePool::new(4, 16).expect("valid configuration");

        let handle = pool.allocate().expect("pool has free slots");
        assert_eq!(pool.len(), 1);
        assert!(!handle.is_none());

        pool.free(handle).expect("handle is live");
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn first_allocation_of_a_slot_is_generation_one() {
        let mut pool = HandlePool::new(4, 16).expect("valid configuration");

        let handle = pool.allocate().expect("pool has free slots");
        assert_eq!(handle.generation(), 1);
    }

    #[test]
    fn freed_slots_are_recycled() {
        let mut pool = HandlePool::new(3, 16).expect("valid configuration");

        let first: Vec<_> = (0..3)
            .map(|_| pool.allocate().expect("pool has free slots"))
            .collect();

        let first_indexes: HashSet<u16> = first.iter().map(|handle| handle.index()).collect();
        assert_eq!(first_indexes.len(), 3);

        for handle in first {
            pool.free(handle).expect("handle is live");
        }

        let second_indexes: HashSet<u16> = (0..3)
            .map(|_| pool.allocate().expect("pool has free slots").index())
            .collect();

        // Same slots, reissued.
        assert_eq!(first_indexes, second_indexes);
    }

    #[test]
    fn most_recently_freed_slot_is_reused_first() {
        let mut pool = HandlePool::new(4, 16).expect("valid configuration");

        let keep = pool.allocate().expect("pool has free slots");
        let recycled = pool.allocate().expect("pool has free slots");

        pool.free(recycled).expect("handle is live");

        let next = pool.allocate().expect("pool has free slots");
        assert_eq!(next.index(), recycled.index());
        assert_ne!(next.index(), keep.index());
    }

    #[test]
    fn double_free_is_stale_and_pool_stays_sound() {
        let mut pool = HandlePool::new(2, 16).expect("valid configuration");

        let handle = pool.allocate().expect("pool has free slots");
        pool.free(handle).expect("first free succeeds");

        assert!(matches!(
            pool.free(handle),
            Err(PoolError::StaleHandle { .. })
        ));

        // The failed free changed nothing; both slots remain allocatable.
        let a = pool.allocate().expect("pool has free slots");
        let b = pool.allocate().expect("pool has free slots");
        assert_ne!(a.index(), b.index());
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn slot_generation_advances_on_each_reallocation() {
        let mut pool = HandlePool::new(1, 16).expect("valid configuration");

        for expected_generation in 1..=5_u16 {
            let handle = pool.allocate().expect("pool has free slots");
            assert_eq!(handle.index(), 0);
            assert_eq!(handle.generation(), expected_generation);
            pool.free(handle).expect("handle is live");
        }
    }

    #[test]
    fn stale_handle_reports_both_generations() {
        let mut pool = HandlePool::new(1, 16).expect("valid configuration");

        let old = pool.allocate().expect("pool has free slots");
        pool.free(old).expect("handle is live");
        let _current = pool.allocate().expect("pool has free slots");

        let Err(PoolError::StaleHandle {
            index,
            handle_generation,
            slot_generation,
        }) = pool.free(old)
        else {
            panic!("freeing a superseded handle must report staleness");
        };

        assert_eq!(index, 0);
        assert_eq!(handle_generation, 1);
        assert_eq!(slot_generation, 2);
    }

    #[test]
    fn freeing_none_is_a_no_op() {
        let mut pool = HandlePool::new(2, 16).expect("valid configuration");
        let handle = pool.allocate().expect("pool has free slots");

        pool.free(Handle::NONE).expect("NONE is always freeable");

        assert_eq!(pool.len(), 1);
        assert!(pool.resolve(handle).is_ok());
    }

    #[test]
    fn out_of_range_index_is_invalid_handle() {
        let mut pool = HandlePool::new(4, 16).expect("valid configuration");

        let crafted = Handle::from_parts(99, 1);

        assert!(matches!(
            pool.free(crafted),
            Err(PoolError::InvalidHandle { index: 99 })
        ));
        assert!(matches!(
            pool.resolve(crafted),
            Err(PoolError::InvalidHandle { index: 99 })
        ));
    }

    #[test]
    fn resolve_none_is_invalid_handle() {
        let pool = HandlePool::new(4, 16).expect("valid configuration");

        assert!(matches!(
            pool.resolve(Handle::NONE),
            Err(PoolError::InvalidHandle { index: 0 })
        ));
    }

    #[test]
    fn resolved_pointers_carry_slot_data() {
        let mut pool = HandlePool::new(4, 16).expect("valid configuration");

        let first = pool.allocate().expect("pool has free slots");
        let second = pool.allocate().expect("pool has free slots");

        let first_ptr = pool.resolve(first).expect("handle is live");
        let second_ptr = pool.resolve(second).expect("handle is live");

        // SAFETY: the slot is allocated to us and 16 bytes hold a usize.
        unsafe {
            first_ptr.cast::<usize>().write(0xAAAA);
        }
        // SAFETY: the slot is allocated to us and 16 bytes hold a usize.
        unsafe {
            second_ptr.cast::<usize>().write(0xBBBB);
        }

        // SAFETY: reading back the value written above to a live slot.
        let first_value = unsafe { first_ptr.cast::<usize>().read() };
        // SAFETY: reading back the value written above to a live slot.
        let second_value = unsafe { second_ptr.cast::<usize>().read() };

        assert_eq!(first_value, 0xAAAA);
        assert_eq!(second_value, 0xBBBB);

        pool.free(first).expect("handle is live");
        pool.free(second).expect("handle is live");
    }

    #[test]
    fn resolve_rejects_freed_handle() {
        let mut pool = HandlePool::new(2, 16).expect("valid configuration");

        let handle = pool.allocate().expect("pool has free slots");
        pool.free(handle).expect("handle is live");

        assert!(matches!(
            pool.resolve(handle),
            Err(PoolError::StaleHandle { .. })
        ));
    }

    #[test]
    fn exhausted_pool_reports_and_recovers_via_expand() {
        let mut pool = HandlePool::new(1, 16).expect("valid configuration");

        let first = pool.allocate().expect("pool has free slots");
        assert!(matches!(pool.allocate(), Err(PoolError::PoolExhausted)));

        pool.expand(1).expect("within the slot cap");

        let second = pool.allocate().expect("expansion added a free slot");

        // The new slot has a never-before-issued index.
        assert_eq!(second.index(), 1);
        assert_ne!(first.index(), second.index());
    }

    #[test]
    fn handles_survive_growth() {
        let mut pool = HandlePool::new(2, 16).expect("valid configuration");

        let handle = pool.allocate().expect("pool has free slots");
        let before = pool.resolve(handle).expect("handle is live");

        // SAFETY: the slot is ours and holds a usize.
        unsafe {
            before.cast::<usize>().write(314);
        }

        pool.expand(64).expect("within the slot cap");
        pool.expand(128).expect("within the slot cap");

        let after = pool.resolve(handle).expect("handle survived growth");
        assert_eq!(after, before);

        // SAFETY: same live slot as above.
        let value = unsafe { after.cast::<usize>().read() };
        assert_eq!(value, 314);
    }

    #[test]
    fn expansion_slots_are_preferred_for_new_allocations() {
        let mut pool = HandlePool::new(2, 16).expect("valid configuration");

        pool.expand(2).expect("within the slot cap");

        // The freshly spliced slots sit at the head of the free list.
        let handle = pool.allocate().expect("pool has free slots");
        assert_eq!(handle.index(), 2);
    }

    #[test]
    fn allocations_span_arenas() {
        let mut pool = HandlePool::new(2, 16).expect("valid configuration");
        pool.expand(3).expect("within the slot cap");

        let handles: Vec<_> = (0..5)
            .map(|_| pool.allocate().expect("pool has free slots"))
            .collect();

        let indexes: HashSet<u16> = handles.iter().map(|handle| handle.index()).collect();
        assert_eq!(indexes, HashSet::from([0, 1, 2, 3, 4]));

        assert!(matches!(pool.allocate(), Err(PoolError::PoolExhausted)));

        for handle in handles {
            pool.free(handle).expect("handle is live");
        }
    }

    #[test]
    fn expand_by_zero_is_rejected() {
        let mut pool = HandlePool::new(2, 16).expect("valid configuration");

        assert!(matches!(
            pool.expand(0),
            Err(PoolError::InvalidConfig { .. })
        ));
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn expand_past_the_slot_cap_is_rejected() {
        let mut pool = HandlePool::new(HandlePool::MAX_SLOTS, 16).expect("valid configuration");

        assert!(matches!(
            pool.expand(1),
            Err(PoolError::InvalidConfig { .. })
        ));
        assert_eq!(pool.capacity(), HandlePool::MAX_SLOTS);
    }

    #[test]
    fn exhaustion_free_reallocation_trace() {
        let mut pool = HandlePool::new(4, 16).expect("valid configuration");

        let handles: Vec<_> = (0..4)
            .map(|_| pool.allocate().expect("pool has free slots"))
            .collect();

        for handle in &handles {
            assert_eq!(handle.generation(), 1);
        }

        assert!(matches!(pool.allocate(), Err(PoolError::PoolExhausted)));

        let released = handles[1];
        pool.free(released).expect("handle is live");

        let reissued = pool.allocate().expect("the freed slot is available");
        assert_eq!(reissued.index(), released.index());
        assert_eq!(reissued.generation(), 2);

        // The superseded handle is now detectably stale.
        assert!(matches!(
            pool.free(released),
            Err(PoolError::StaleHandle { .. })
        ));
    }

    #[test]
    fn instrumentation_observes_slot_lifecycle() {
        #[derive(Debug, Default)]
        struct Recorder {
            regions: Arc<AtomicUsize>,
            allocated: Arc<AtomicUsize>,
            freed: Arc<AtomicUsize>,
        }

        impl PoolInstrumentation for Recorder {
            fn on_region_created(&self, region: NonNull<u8>, len: usize) {
                let _ = (region, len);
                self.regions.fetch_add(1, Ordering::Relaxed);
            }

            fn on_slot_allocated(&self, slot: NonNull<u8>, len: usize) {
                let _ = (slot, len);
                self.allocated.fetch_add(1, Ordering::Relaxed);
            }

            fn on_slot_freed(&self, slot: NonNull<u8>, len: usize) {
                let _ = (slot, len);
                self.freed.fetch_add(1, Ordering::Relaxed);
            }
        }

        let recorder = Recorder::default();
        let regions = Arc::clone(&recorder.regions);
        let allocated = Arc::clone(&recorder.allocated);
        let freed = Arc::clone(&recorder.freed);

        let mut pool = HandlePool::builder()
            .slot_size(16)
            .initial_slots(2)
            .instrumentation(recorder)
            .build()
            .expect("valid configuration");

        assert_eq!(regions.load(Ordering::Relaxed), 1);

        let handle = pool.allocate().expect("pool has free slots");
        pool.free(handle).expect("handle is live");
        pool.expand(2).expect("within the slot cap");

        assert_eq!(regions.load(Ordering::Relaxed), 2);
        assert_eq!(allocated.load(Ordering::Relaxed), 1);
        assert_eq!(freed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn may_drop_slots_tolerates_leaked_handles() {
        let mut pool = HandlePool::new(2, 16).expect("valid configuration");

        let _leaked = pool.allocate().expect("pool has free slots");

        // Default policy: dropping with outstanding allocations is fine.
        drop(pool);
    }

    #[test]
    #[should_panic]
    fn must_not_drop_slots_panics_on_leak() {
        let mut pool = HandlePool::builder()
            .slot_size(16)
            .initial_slots(2)
            .drop_policy(DropPolicy::MustNotDropSlots)
            .build()
            .expect("valid configuration");

        let _leaked = pool.allocate().expect("pool has free slots");

        drop(pool);
    }

    #[test]
    fn must_not_drop_slots_accepts_clean_teardown() {
        let mut pool = HandlePool::builder()
            .slot_size(16)
            .initial_slots(2)
            .drop_policy(DropPolicy::MustNotDropSlots)
            .build()
            .expect("valid configuration");

        let handle = pool.allocate().expect("pool has free slots");
        pool.free(handle).expect("handle is live");

        drop(pool);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn free_list_stays_consistent_under_mixed_workload() {
        let mut pool = HandlePool::new(4, 16).expect("valid configuration");
        pool.integrity_check();

        let mut held = Vec::new();

        for round in 0..8_usize {
            for _ in 0..3 {
                if let Ok(handle) = pool.allocate() {
                    held.push(handle);
                }
            }

            // Free every other held handle.
            let mut index = round % 2;
            while index < held.len() {
                let handle = held.swap_remove(index);
                pool.free(handle).expect("handle is live");
                index += 2;
            }

            if round == 4 {
                pool.expand(4).expect("within the slot cap");
            }

            pool.integrity_check();
        }

        for handle in held {
            pool.free(handle).expect("handle is live");
        }

        pool.integrity_check();
        assert!(pool.is_empty());
    }
}
