//! Pool allocator behaviour across many collect cycles.

mod common;

use std::collections::HashSet;

use rstest::rstest;

use redlilium_rhi::{PoolAllocator, PoolAllocatorDescriptor, VirtualAddress};

fn create_pool(element_size: u64, elements: u64, latency: u64) -> PoolAllocator {
    common::init_logging();
    let mut pool = PoolAllocator::new();
    pool.init(PoolAllocatorDescriptor {
        element_size,
        capacity_in_bytes: element_size * elements,
        address_base: 0x4000_0000,
        garbage_collect_latency: latency,
    })
    .unwrap();
    pool
}

#[test]
fn test_live_allocations_never_overlap() {
    let mut pool = create_pool(256, 64, 1);
    let mut live: Vec<VirtualAddress> = Vec::new();

    for round in 0..20u64 {
        loop {
            let address = pool.allocate(200, 16);
            if address.is_null() {
                break;
            }
            live.push(address);
        }

        let unique: HashSet<_> = live.iter().map(|a| a.ptr()).collect();
        assert_eq!(unique.len(), live.len());
        for address in &live {
            assert_eq!((address.ptr() - 0x4000_0000) % 256, 0);
        }

        // free every other allocation, a different half each round
        let mut index = 0;
        live.retain(|&address| {
            index += 1;
            if (index + round) % 2 == 0 {
                pool.deallocate(address);
                false
            } else {
                true
            }
        });
        pool.garbage_collect();
    }
}

#[rstest]
#[case::latency_0(0)]
#[case::latency_1(1)]
#[case::latency_2(2)]
#[case::latency_3(3)]
fn test_freed_element_waits_for_latency(#[case] latency: u64) {
    let mut pool = create_pool(64, 1, latency);
    let address = pool.allocate(64, 64);
    pool.deallocate(address);

    // latency 0 still needs one collect to move garbage back
    let collects_needed = latency.max(1);
    for _ in 0..collects_needed - 1 {
        pool.garbage_collect();
        assert!(pool.allocate(64, 64).is_null());
    }
    pool.garbage_collect();
    assert_eq!(pool.allocate(64, 64), address);
}

#[test]
fn test_exhaustion_and_recovery() {
    let mut pool = create_pool(1024, 4, 2);
    let addresses: Vec<_> = (0..4).map(|_| pool.allocate(1024, 256)).collect();
    assert!(addresses.iter().all(|a| !a.is_null()));
    assert!(pool.allocate(1, 1).is_null());

    for &address in &addresses {
        pool.deallocate(address);
    }
    assert_eq!(pool.allocation_count(), 0);
    assert!(pool.allocate(1, 1).is_null());

    pool.garbage_collect();
    pool.garbage_collect();
    assert_eq!(pool.free_count(), 4);
}

#[test]
fn test_shutdown_then_reinit() {
    let mut pool = create_pool(128, 8, 4);
    let address = pool.allocate(128, 1);
    pool.deallocate(address);
    pool.shutdown();

    pool.init(PoolAllocatorDescriptor {
        element_size: 64,
        capacity_in_bytes: 128,
        address_base: 0,
        garbage_collect_latency: 0,
    })
    .unwrap();
    assert_eq!(pool.allocate(64, 1).ptr(), 0);
    assert_eq!(pool.allocate(64, 1).ptr(), 64);
    assert!(pool.allocate(64, 1).is_null());
}
