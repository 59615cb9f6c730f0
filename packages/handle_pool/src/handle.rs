use std::fmt;

/// Number of low bits of a handle that carry the global slot index.
const INDEX_BITS: u32 = 16;

/// Mask selecting the index bits of a packed handle.
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// An opaque 32-bit key identifying a checked-out slot in a
/// [`HandlePool`](crate::HandlePool).
///
/// A handle packs the slot's global index (low 16 bits) with a snapshot of the
/// slot's generation counter taken at allocation time (high 16 bits). The pool
/// validates the generation on every [`free()`](crate::HandlePool::free) and
/// [`resolve()`](crate::HandlePool::resolve), so a handle that outlives its
/// allocation is rejected instead of silently aliasing whatever occupies the
/// slot next.
///
/// Handles are plain values: copy them, store them in collections, send them
/// across threads. They borrow nothing from the pool.
///
/// The all-zero bit pattern is reserved as [`Handle::NONE`], the "no handle"
/// value, and is also the [`Default`]. The pool never issues it: slot
/// generations start above zero and skip zero on wraparound.
///
/// # Example
///
/// ```rust
/// use handle_pool::{Handle, HandlePool};
///
/// let mut pool = HandlePool::new(2, 16)?;
///
/// let handle = pool.allocate()?;
/// assert!(!handle.is_none());
/// assert_eq!(handle.generation(), 1);
///
/// // A field holding "no handle yet" starts as the sentinel.
/// let unset = Handle::default();
/// assert!(unset.is_none());
/// # Ok::<(), handle_pool::PoolError>(())
/// ```
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct Handle(u32);

impl Handle {
    /// The reserved "no handle" value.
    ///
    /// Freeing it is an Ok no-op; resolving it is always an error.
    pub const NONE: Self = Self(0);

    /// Packs a global slot index and a generation snapshot into a handle.
    ///
    /// Only the pool constructs handles; callers receive them from
    /// [`allocate()`](crate::HandlePool::allocate).
    #[must_use]
    pub(crate) fn from_parts(index: u16, generation: u16) -> Self {
        Self((u32::from(generation) << INDEX_BITS) | u32::from(index))
    }

    /// The global slot index this handle refers to.
    #[must_use]
    #[inline]
    pub fn index(self) -> u16 {
        u16::try_from(self.0 & INDEX_MASK).expect("masking to 16 bits cannot exceed u16")
    }

    /// The generation counter snapshot taken when this handle was issued.
    #[must_use]
    #[inline]
    pub fn generation(self) -> u16 {
        u16::try_from(self.0 >> INDEX_BITS).expect("shifting a u32 right by 16 leaves 16 bits")
    }

    /// Whether this is the reserved [`Handle::NONE`] value.
    #[must_use]
    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("Handle::NONE")
        } else {
            f.debug_struct("Handle")
                .field("index", &self.index())
                .field("generation", &self.generation())
                .finish()
        }
    }
}
