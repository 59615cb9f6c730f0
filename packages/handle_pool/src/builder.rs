use std::cell::Cell;
use std::marker::PhantomData;

use crate::error::Result;
use crate::{DropPolicy, HandlePool, NoInstrumentation, PoolInstrumentation};

/// Configures and creates a [`HandlePool`].
///
/// Slot size and initial capacity are required; everything else defaults.
/// Start with [`HandlePool::builder()`].
///
/// # Example
///
/// ```rust
/// use handle_pool::{DropPolicy, HandlePool};
///
/// let pool = HandlePool::builder()
///     .slot_size_of::<[u64; 4]>()
///     .initial_slots(256)
///     .drop_policy(DropPolicy::MustNotDropSlots)
///     .build()?;
///
/// assert_eq!(pool.slot_size(), 32);
/// assert_eq!(pool.capacity(), 256);
/// # Ok::<(), handle_pool::PoolError>(())
/// ```
#[derive(Debug)]
#[must_use]
pub struct HandlePoolBuilder {
    slot_size: Option<usize>,
    initial_slots: Option<usize>,
    drop_policy: DropPolicy,
    instrumentation: Box<dyn PoolInstrumentation>,

    _single_threaded: PhantomData<Cell<()>>,
}

impl HandlePoolBuilder {
    pub(crate) fn new() -> Self {
        Self {
            slot_size: None,
            initial_slots: None,
            drop_policy: DropPolicy::default(),
            instrumentation: Box::new(NoInstrumentation),
            _single_threaded: PhantomData,
        }
    }

    /// Sets the usable size in bytes of every slot. Required.
    ///
    /// Must be at least [`HandlePool::MIN_SLOT_SIZE`]; smaller values are
    /// rejected by [`build()`](Self::build).
    pub fn slot_size(mut self, slot_size: usize) -> Self {
        self.slot_size = Some(slot_size);
        self
    }

    /// Sets the slot size to fit values of type `T`.
    ///
    /// Sizes below [`HandlePool::MIN_SLOT_SIZE`] are rounded up to it, so
    /// this accepts any `T`, including zero-sized types.
    ///
    /// Note that slot data is aligned for `usize`; types with stricter
    /// alignment need an explicit [`slot_size()`](Self::slot_size) with
    /// manual padding.
    pub fn slot_size_of<T>(self) -> Self {
        self.slot_size(size_of::<T>().max(HandlePool::MIN_SLOT_SIZE))
    }

    /// Sets the number of slots the pool starts with. Required.
    ///
    /// Must be non-zero and at most [`HandlePool::MAX_SLOTS`]; other values
    /// are rejected by [`build()`](Self::build).
    pub fn initial_slots(mut self, initial_slots: usize) -> Self {
        self.initial_slots = Some(initial_slots);
        self
    }

    /// Sets how the pool reacts to being dropped with slots still allocated.
    ///
    /// Defaults to [`DropPolicy::MayDropSlots`].
    pub fn drop_policy(mut self, drop_policy: DropPolicy) -> Self {
        self.drop_policy = drop_policy;
        self
    }

    /// Attaches memory instrumentation callbacks to the pool.
    ///
    /// Defaults to [`NoInstrumentation`].
    pub fn instrumentation(mut self, instrumentation: impl PoolInstrumentation + 'static) -> Self {
        self.instrumentation = Box::new(instrumentation);
        self
    }

    /// Creates the pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`](crate::PoolError::InvalidConfig)
    /// if a provided value is out of range, and
    /// [`PoolError::OutOfMemory`](crate::PoolError::OutOfMemory) if the
    /// initial arena cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if a required setting was never provided. Missing settings are
    /// a programming error, unlike out-of-range values, which may be
    /// runtime-dependent.
    pub fn build(self) -> Result<HandlePool> {
        let slot_size = self
            .slot_size
            .expect("slot_size must be set before building a pool");

        let initial_slots = self
            .initial_slots
            .expect("initial_slots must be set before building a pool");

        HandlePool::new_inner(
            initial_slots,
            slot_size,
            self.drop_policy,
            self.instrumentation,
        )
    }
}
