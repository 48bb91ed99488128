//! Generational pool invariants: handle freshness, generation hygiene,
//! concurrent access.

use nexus_graphics::pool::{Handle, ResourcePool};

#[test]
fn emplace_then_get_succeeds_until_erase() {
    let pool: ResourcePool<u32, &str> = ResourcePool::new();
    let handle = pool.emplace(11, "eleven");

    assert!(pool.is_live(handle));
    assert_eq!(*pool.get_hot(handle), 11);
    assert_eq!(*pool.get_cold(handle), "eleven");

    assert!(pool.erase(handle));
    assert!(!pool.is_live(handle));
    assert!(pool.try_get(handle).is_none());
}

#[test]
fn no_handle_carries_generation_zero() {
    let pool: ResourcePool<u32, ()> = ResourcePool::new();
    for _ in 0..64 {
        let handle = pool.emplace(0, ());
        assert_ne!(handle.generation, 0);
        pool.erase(handle);
    }
}

#[test]
fn reused_slot_gets_a_distinct_handle() {
    let pool: ResourcePool<u32, ()> = ResourcePool::new();
    let first = pool.emplace(1, ());
    pool.erase(first);

    let second = pool.emplace(2, ());
    assert_eq!(second.index, first.index);
    assert_ne!(second, first);
    assert!(second.generation > first.generation);

    // The stale handle does not alias the new occupant.
    assert!(!pool.is_live(first));
    assert_eq!(*pool.get_hot(second), 2);
}

#[test]
fn null_handle_round_trips_through_u64() {
    assert!(Handle::NULL.is_null());
    assert!(Handle::from_u64(Handle::NULL.to_u64()).is_null());
    // A live-looking handle with the sentinel index is still null.
    assert!(!pool_handle(3, 1).is_null());
}

fn pool_handle(index: u32, generation: u32) -> Handle {
    Handle { index, generation }
}

#[test]
fn clear_frees_every_slot() {
    let pool: ResourcePool<u32, ()> = ResourcePool::new();
    let handles: Vec<Handle> = (0..16).map(|i| pool.emplace(i, ())).collect();
    assert_eq!(pool.live_count(), 16);

    pool.clear();
    assert_eq!(pool.live_count(), 0);
    for handle in handles {
        assert!(!pool.is_live(handle));
    }
}

#[test]
fn concurrent_readers_and_writers() {
    use std::sync::Arc;

    let pool: Arc<ResourcePool<u64, u64>> = Arc::new(ResourcePool::new());
    let stable: Vec<Handle> = (0..32).map(|i| pool.emplace(i, i * 2)).collect();

    let mut threads = Vec::new();
    for _ in 0..4 {
        let pool = Arc::clone(&pool);
        let stable = stable.clone();
        threads.push(std::thread::spawn(move || {
            for _ in 0..1000 {
                for &handle in &stable {
                    let record = pool.get(handle);
                    assert_eq!(*record.cold(), *record.hot() * 2);
                }
            }
        }));
    }
    // A writer churning other slots concurrently.
    for _ in 0..2 {
        let pool = Arc::clone(&pool);
        threads.push(std::thread::spawn(move || {
            for i in 0..1000u64 {
                let handle = pool.emplace(i, i * 2);
                assert!(pool.erase(handle));
            }
        }));
    }
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(pool.live_count(), 32);
}
