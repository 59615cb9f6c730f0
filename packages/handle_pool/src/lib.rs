//! A slab pool allocator that issues stable, generation-checked handles instead of raw pointers.
//!
//! This crate provides [`HandlePool`], a pool of uniformly sized memory slots with O(1)
//! allocation and release via an intrusive free list. Callers receive compact 32-bit
//! [`Handle`] values rather than pointers; the pool validates every handle it is given, so
//! use-after-free and double-free become ordinary, reportable errors instead of memory
//! corruption.
//!
//! # Key Features
//!
//! - **Stable handles**: A handle stays valid until its slot is freed, across any number of
//!   pool expansions
//! - **Generation checking**: Each slot carries a reuse counter; stale handles are rejected
//!   with [`PoolError::StaleHandle`] rather than aliasing the slot's next occupant
//! - **O(1) operations**: [`allocate()`](HandlePool::allocate) and
//!   [`free()`](HandlePool::free) each touch a single free list link
//! - **Explicit growth**: The pool never grows on its own; [`expand()`](HandlePool::expand)
//!   appends a new arena without moving existing slots
//! - **Compact keys**: Handles are 32 bits, `Copy`, hashable, and carry a reserved
//!   [`Handle::NONE`] sentinel for "no handle" fields
//! - **Pointer escape hatch**: [`resolve()`](HandlePool::resolve) converts a validated handle
//!   into a raw slot pointer for the duration of the allocation
//! - **Instrumentation hooks**: [`PoolInstrumentation`] exposes slot lifecycle events to
//!   external memory-checking tools
//! - **Flexible drop policies**: Configure whether dropping a non-empty pool is tolerated or
//!   a panic-worthy leak
//! - **Thread mobility**: The pool can move between threads but is not shared without
//!   synchronization
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```rust
//! use handle_pool::HandlePool;
//!
//! // 128 slots of 64 bytes each.
//! let mut pool = HandlePool::new(128, 64)?;
//!
//! let handle = pool.allocate()?;
//!
//! // Resolve to a pointer while the slot is held.
//! let data = pool.resolve(handle)?;
//!
//! // SAFETY: the slot is ours until freed and a usize fits in 64
//! // word-aligned bytes.
//! unsafe {
//!     data.cast::<usize>().write(1234);
//! }
//!
//! pool.free(handle)?;
//! # Ok::<(), handle_pool::PoolError>(())
//! ```
//!
//! ## Detecting Stale Handles
//!
//! ```rust
//! use handle_pool::{HandlePool, PoolError};
//!
//! let mut pool = HandlePool::new(8, 16)?;
//!
//! let handle = pool.allocate()?;
//! pool.free(handle)?;
//!
//! // The slot may be reused...
//! let newer = pool.allocate()?;
//! assert_eq!(newer.index(), handle.index());
//!
//! // ...but the old handle no longer passes validation.
//! assert!(matches!(
//!     pool.resolve(handle),
//!     Err(PoolError::StaleHandle { .. })
//! ));
//! # Ok::<(), handle_pool::PoolError>(())
//! ```
//!
//! ## Growing Under Load
//!
//! ```rust
//! use handle_pool::{HandlePool, PoolError};
//!
//! let mut pool = HandlePool::new(1, 16)?;
//! let first = pool.allocate()?;
//!
//! // Exhaustion is an error, not an implicit growth trigger.
//! assert!(matches!(pool.allocate(), Err(PoolError::PoolExhausted)));
//!
//! // Growth is explicit and never invalidates existing handles.
//! pool.expand(16)?;
//! let second = pool.allocate()?;
//!
//! assert!(pool.resolve(first).is_ok());
//! assert!(pool.resolve(second).is_ok());
//! # Ok::<(), handle_pool::PoolError>(())
//! ```

mod arena;
mod builder;
mod drop_policy;
mod error;
mod handle;
mod instrumentation;
mod pool;

pub(crate) use arena::*;
pub use builder::*;
pub use drop_policy::*;
pub use error::PoolError;
pub use handle::Handle;
pub use instrumentation::*;
pub use pool::HandlePool;
