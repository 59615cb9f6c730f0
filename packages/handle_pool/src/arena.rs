use std::alloc::{Layout, alloc, dealloc};
use std::num::NonZero;
use std::ptr::NonNull;

use crate::error::{PoolError, Result};

/// Link value marking the end of the free list.
pub(crate) const FREE_LIST_NIL: u32 = u32::MAX;

/// Per-slot metadata header, co-located with the slot's storage.
///
/// Invariant: a slot is `Occupied` if and only if exactly one live handle
/// carries its current generation. Occupied generations are never zero - the
/// pool's generation advance starts at 1 and skips 0 on wraparound.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SlotMeta {
    /// The slot is checked out via a handle carrying this generation.
    Occupied {
        /// The generation stamped into the owning handle.
        generation: u16,
    },

    /// The slot is on the free list.
    Free {
        /// The generation the slot most recently carried while occupied,
        /// or 0 if it has never been allocated.
        generation: u16,

        /// Global index of the next free slot, or [`FREE_LIST_NIL`].
        next_free: u32,
    },
}

/// One contiguous block of uniformly sized slots, allocated in a single
/// request from the system allocator.
///
/// Each slot is a [`SlotMeta`] header followed by `slot_size` bytes of
/// caller-owned storage, with alignment padding between header and data. The
/// block never moves and is released only when the arena is dropped, which is
/// what makes handle stability across pool growth possible.
///
/// An arena covers the half-open global index range
/// `base_index .. base_index + slot_count`; the pool assigns these ranges
/// monotonically and never renumbers them.
///
/// # Out of band access
///
/// The arena does not create or keep references to slot data, so it is valid
/// for callers to access slot memory via resolved pointers even when not
/// holding a reference to the pool.
#[derive(Debug)]
pub(crate) struct Arena {
    /// Global index of this arena's first slot.
    base_index: u32,

    /// Number of slots in this arena, fixed at creation.
    slot_count: NonZero<u32>,

    /// Precomputed stride, data offset and whole-region layout.
    layout_info: ArenaLayoutInfo,

    /// Base pointer of the arena's single allocation.
    first_entry_ptr: NonNull<u8>,
}

/// Layout calculations for an [`Arena`].
#[derive(Clone, Debug, Eq, PartialEq)]
struct ArenaLayoutInfo {
    /// Combined header+data layout, padded so its size is the stride between
    /// consecutive entries.
    entry_layout: Layout,

    /// Byte offset from an entry's header to its data region.
    data_offset: usize,

    /// Layout of the entire arena allocation.
    region_layout: Layout,
}

impl ArenaLayoutInfo {
    /// Calculates the layout for `slot_count` entries of `slot_size` data
    /// bytes each. Rejects parameter combinations whose sizes cannot be
    /// represented.
    fn calculate(slot_size: usize, slot_count: NonZero<u32>) -> Result<Self> {
        let oversized = || PoolError::InvalidConfig {
            problem: format!("slot_size {slot_size} exceeds the maximum representable arena size"),
        };

        let meta_layout = Layout::new::<SlotMeta>();

        // Slot data is aligned for at least one machine word, so callers can
        // store word-sized values at a resolved address without repacking.
        let data_layout = Layout::from_size_align(slot_size, align_of::<usize>())
            .map_err(|_err| oversized())?;

        let (entry_layout, data_offset) =
            meta_layout.extend(data_layout).map_err(|_err| oversized())?;

        // Layout::pad_to_align() makes the size a multiple of the alignment,
        // which is exactly the stride needed between consecutive entries.
        let entry_layout = entry_layout.pad_to_align();

        let count = usize::try_from(slot_count.get())
            .expect("u32 always fits in usize on supported platforms");

        let total_size = entry_layout.size().checked_mul(count).ok_or_else(oversized)?;

        let region_layout = Layout::from_size_align(total_size, entry_layout.align())
            .map_err(|_err| oversized())?;

        Ok(Self {
            entry_layout,
            data_offset,
            region_layout,
        })
    }
}

impl Arena {
    /// Allocates an arena of `slot_count` slots covering the global index
    /// range starting at `base_index`.
    ///
    /// Every slot starts as [`SlotMeta::Free`] at generation 0, linked to its
    /// successor within this arena; the last slot links to [`FREE_LIST_NIL`].
    /// The pool splices this chain onto its free list.
    ///
    /// Fails with [`PoolError::OutOfMemory`] if the allocation cannot be
    /// satisfied; no state is retained on failure.
    pub(crate) fn new(base_index: u32, slot_count: NonZero<u32>, slot_size: usize) -> Result<Self> {
        let layout_info = ArenaLayoutInfo::calculate(slot_size, slot_count)?;

        // SAFETY: region_layout is never zero-sized - the entry header alone
        // has nonzero size and slot_count is NonZero.
        let raw = unsafe { alloc(layout_info.region_layout) };

        let first_entry_ptr = NonNull::new(raw).ok_or(PoolError::OutOfMemory {
            bytes: layout_info.region_layout.size(),
        })?;

        let arena = Self {
            base_index,
            slot_count,
            layout_info,
            first_entry_ptr,
        };

        // Thread the fresh slots into an intra-arena chain in ascending
        // global index order.
        for local in 0..slot_count.get() {
            // Cannot overflow: slot totals are capped well below u32::MAX.
            let successor = local.wrapping_add(1);

            let next_free = if successor < slot_count.get() {
                base_index.wrapping_add(successor)
            } else {
                FREE_LIST_NIL
            };

            let meta_ptr = arena.meta_ptr(local);

            // SAFETY: meta_ptr is in bounds and properly aligned per the
            // layout calculation, and we exclusively own the fresh allocation.
            unsafe {
                meta_ptr.write(SlotMeta::Free {
                    generation: 0,
                    next_free,
                });
            }
        }

        Ok(arena)
    }

    /// Global index of this arena's first slot.
    #[must_use]
    pub(crate) fn base_index(&self) -> u32 {
        self.base_index
    }

    /// Number of slots in this arena.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use and/or infinite loop.
    pub(crate) fn slot_count(&self) -> u32 {
        self.slot_count.get()
    }

    /// Whether `global_index` falls inside this arena's index range.
    #[must_use]
    pub(crate) fn contains(&self, global_index: u32) -> bool {
        // The subtraction cannot wrap below the lower-bound check.
        global_index >= self.base_index
            && global_index.wrapping_sub(self.base_index) < self.slot_count.get()
    }

    fn entry_ptr(&self, local_index: u32) -> NonNull<u8> {
        assert!(
            local_index < self.slot_count.get(),
            "slot {local_index} out of bounds in arena of {} slots",
            self.slot_count.get()
        );

        let local = usize::try_from(local_index)
            .expect("u32 always fits in usize on supported platforms");

        // Guarded by the bounds check above; cannot overflow because that
        // would imply the arena extends beyond virtual memory.
        let offset = local.wrapping_mul(self.layout_info.entry_layout.size());

        // SAFETY: first_entry_ptr is valid from our allocation in new() and
        // the offset stays inside the region per the bounds check.
        unsafe { self.first_entry_ptr.byte_add(offset) }
    }

    fn meta_ptr(&self, local_index: u32) -> NonNull<SlotMeta> {
        #[expect(
            clippy::cast_ptr_alignment,
            reason = "every entry starts on a SlotMeta-aligned boundary because the stride is a multiple of the entry alignment"
        )]
        let ptr = self.entry_ptr(local_index).cast::<SlotMeta>();
        ptr
    }

    /// Shared view of a slot's metadata header.
    #[must_use]
    pub(crate) fn slot_meta(&self, local_index: u32) -> &SlotMeta {
        let ptr = self.meta_ptr(local_index);

        // SAFETY: the header was initialized in new() and shared access is
        // tied to the &self borrow.
        unsafe { ptr.as_ref() }
    }

    /// Exclusive view of a slot's metadata header.
    #[must_use]
    #[expect(clippy::needless_pass_by_ref_mut, reason = "false positive")]
    pub(crate) fn slot_meta_mut(&mut self, local_index: u32) -> &mut SlotMeta {
        let mut ptr = self.meta_ptr(local_index);

        // SAFETY: the header was initialized in new() and exclusive access is
        // tied to the &mut self borrow.
        unsafe { ptr.as_mut() }
    }

    /// Base address of a slot's data region.
    #[must_use]
    pub(crate) fn data_ptr(&self, local_index: u32) -> NonNull<u8> {
        // SAFETY: data_offset points inside the bounds-checked entry per the
        // layout calculation.
        unsafe { self.entry_ptr(local_index).byte_add(self.layout_info.data_offset) }
    }

    /// Base address of the arena's whole allocation, for instrumentation.
    #[must_use]
    pub(crate) fn region_ptr(&self) -> NonNull<u8> {
        self.first_entry_ptr
    }

    /// Size in bytes of the arena's whole allocation, for instrumentation.
    #[must_use]
    pub(crate) fn region_len(&self) -> usize {
        self.layout_info.region_layout.size()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SlotMeta is plain data, so no per-entry teardown is needed.
        //
        // SAFETY: the memory was allocated with region_layout in new(), has
        // not been deallocated, and the layout parameters are unchanged.
        unsafe {
            dealloc(self.first_entry_ptr.as_ptr(), self.layout_info.region_layout);
        }
    }
}

// SAFETY: Arena contains a raw pointer (NonNull<u8>) but uses it purely for
// memory management within its own allocation. The arena does not share the
// pointer with other threads and does not rely on thread-local state; all
// access is protected by Rust's borrowing rules through &self/&mut self.
unsafe impl Send for Arena {}

#[cfg(test)]
mod tests {
    use std::num::NonZero;

    use super::*;

    fn count(n: u32) -> NonZero<u32> {
        NonZero::new(n).expect("test slot counts are non-zero")
    }

    #[test]
    fn new_threads_slots_in_ascending_order() {
        let arena = Arena::new(10, count(3), 16).expect("small arena allocation succeeds");

        assert_eq!(
            *arena.slot_meta(0),
            SlotMeta::Free {
                generation: 0,
                next_free: 11
            }
        );
        assert_eq!(
            *arena.slot_meta(1),
            SlotMeta::Free {
                generation: 0,
                next_free: 12
            }
        );
        assert_eq!(
            *arena.slot_meta(2),
            SlotMeta::Free {
                generation: 0,
                next_free: FREE_LIST_NIL
            }
        );
    }

    #[test]
    fn contains_covers_exactly_the_assigned_range() {
        let arena = Arena::new(4, count(2), 16).expect("small arena allocation succeeds");

        assert!(!arena.contains(3));
        assert!(arena.contains(4));
        assert!(arena.contains(5));
        assert!(!arena.contains(6));
        assert_eq!(arena.base_index(), 4);
        assert_eq!(arena.slot_count(), 2);
    }

    #[test]
    fn meta_mutations_persist() {
        let mut arena = Arena::new(0, count(2), 16).expect("small arena allocation succeeds");

        *arena.slot_meta_mut(1) = SlotMeta::Occupied { generation: 3 };

        assert_eq!(*arena.slot_meta(1), SlotMeta::Occupied { generation: 3 });
        // The neighboring slot is untouched.
        assert_eq!(
            *arena.slot_meta(0),
            SlotMeta::Free {
                generation: 0,
                next_free: 1
            }
        );
    }

    #[test]
    fn data_regions_do_not_overlap_headers_or_each_other() {
        let arena = Arena::new(0, count(3), 16).expect("small arena allocation succeeds");

        for local in 0..3_u8 {
            let data = arena.data_ptr(u32::from(local));

            // SAFETY: each data region is 16 exclusively owned bytes.
            unsafe {
                data.write_bytes(0x10 | local, 16);
            }
        }

        // Headers survived the data writes.
        for local in 0..3_u8 {
            assert!(matches!(
                *arena.slot_meta(u32::from(local)),
                SlotMeta::Free { .. }
            ));

            let data = arena.data_ptr(u32::from(local));

            // SAFETY: reading back the bytes written above.
            let first = unsafe { data.read() };
            assert_eq!(first, 0x10 | local);
        }
    }

    #[test]
    fn data_is_word_aligned() {
        let arena = Arena::new(0, count(2), 24).expect("small arena allocation succeeds");

        for local in 0..2_u32 {
            let addr = arena.data_ptr(local).addr().get();
            assert_eq!(addr % align_of::<usize>(), 0);
        }
    }

    #[test]
    fn absurd_slot_size_is_invalid_config() {
        let result = Arena::new(0, count(2), usize::MAX - 7);

        assert!(matches!(
            result,
            Err(PoolError::InvalidConfig { .. })
        ));
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_slot_panics() {
        let arena = Arena::new(0, count(1), 16).expect("small arena allocation succeeds");
        let _ = arena.slot_meta(1);
    }
}
