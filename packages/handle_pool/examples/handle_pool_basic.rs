//! Basic usage example for `HandlePool`.
//!
//! This example demonstrates the core allocate/resolve/free cycle, explicit
//! pool growth, and the copyable nature of handles.

use handle_pool::{HandlePool, PoolError};

fn main() -> Result<(), PoolError> {
    // Create a pool of 4 slots, 32 bytes each.
    let mut pool = HandlePool::new(4, 32)?;

    println!("Created HandlePool with capacity: {}", pool.capacity());

    // Allocate some slots.
    let handle1 = pool.allocate()?;
    let handle2 = pool.allocate()?;
    let handle3 = pool.allocate()?;

    println!("Allocated 3 slots");

    // Handles are plain Copy values; duplicating one is free.
    let handle1_copy = handle1;
    println!("Handle 1: {handle1:?}");
    println!("Handle 1 (copy): {handle1_copy:?}");
    assert_eq!(handle1, handle1_copy);

    // Write through resolved pointers.
    for (value, handle) in [(0xdead_beef_usize, handle1), (0xcafe_babe, handle2)] {
        let data = pool.resolve(handle)?;

        // SAFETY: the slot is allocated to us and a usize fits in 32
        // word-aligned bytes.
        unsafe {
            data.cast::<usize>().write(value);
        }
    }

    // Read back through the copied handle; it refers to the same slot.
    let data = pool.resolve(handle1_copy)?;

    // SAFETY: same live slot that was written above.
    let value = unsafe { data.cast::<usize>().read() };
    println!("Slot 1 contains: {value:#x}");
    assert_eq!(value, 0xdead_beef);

    println!(
        "Pool now holds {} slots with capacity {}",
        pool.len(),
        pool.capacity()
    );

    // Return a slot to the pool.
    pool.free(handle2)?;
    println!("Freed one slot");

    // The pool never grows on its own; expansion is an explicit call.
    match pool.allocate() {
        Ok(_) => {}
        Err(PoolError::PoolExhausted) => unreachable!("one slot was just freed"),
        Err(other) => return Err(other),
    }

    pool.expand(100)?;
    println!("Expanded pool to capacity {}", pool.capacity());

    let mut handles = Vec::new();
    for _ in 0..100 {
        handles.push(pool.allocate()?);
    }

    println!(
        "Allocated 100 more slots. Pool now holds {} slots with capacity {}",
        pool.len(),
        pool.capacity()
    );

    // Pre-expansion handles stayed valid throughout.
    assert!(pool.resolve(handle1).is_ok());
    assert!(pool.resolve(handle3).is_ok());

    println!("Remaining slots are released when the pool is dropped");
    println!("HandlePool example completed successfully!");

    Ok(())
}
