//! Demonstrates how `HandlePool` turns use-after-free and double-free into
//! ordinary, reportable errors.
//!
//! Every handle snapshots its slot's generation counter. When the slot is
//! freed and reallocated, the counter advances, and the pool rejects any
//! handle carrying the old snapshot.

use handle_pool::{Handle, HandlePool, PoolError};

fn main() -> Result<(), PoolError> {
    let mut pool = HandlePool::new(8, 16)?;

    // Allocate and then free a slot.
    let old = pool.allocate()?;
    println!("Allocated {old:?}");

    pool.free(old)?;
    println!("Freed it; the handle is now stale");

    // The slot gets reused by the next allocation. Same index, new generation.
    let new = pool.allocate()?;
    println!("Reallocated as {new:?}");
    assert_eq!(old.index(), new.index());
    assert_ne!(old.generation(), new.generation());

    // Use-after-free: resolving the old handle fails loudly.
    match pool.resolve(old) {
        Err(PoolError::StaleHandle {
            index,
            handle_generation,
            slot_generation,
        }) => {
            println!(
                "Use-after-free caught: slot {index} is at generation \
                 {slot_generation}, handle carries {handle_generation}"
            );
        }
        other => panic!("expected a stale handle error, got {other:?}"),
    }

    // Double-free: freeing the old handle fails the same way, and the new
    // occupant of the slot is untouched.
    let error = pool.free(old).expect_err("the old handle is stale");
    println!("Double-free caught: {error}");
    assert!(pool.resolve(new).is_ok());

    // A handle forged with an out-of-range index is rejected as invalid
    // rather than stale; it never referenced a slot of this pool.
    let forged = Handle::default();
    assert!(matches!(
        pool.resolve(forged),
        Err(PoolError::InvalidHandle { .. })
    ));

    // The pool stays fully usable after rejecting bad handles.
    pool.free(new)?;
    assert!(pool.is_empty());

    println!("Stale detection example completed successfully!");

    Ok(())
}
