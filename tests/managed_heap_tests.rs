//! Managed heap accounting and soft-reference behaviour under concurrency.

use std::sync::Arc;
use std::thread;

use heapwatch_core::config::PoolSpec;
use heapwatch_core::manager::{MemoryManager, Reclaimable};
use heapwatch_core::usage::{PoolType, MIB};
use heapwatch_exec::ReferencePopulation;
use heapwatch_mem::{Block, ManagedHeap, SoftHandle};

fn heap(cap: u64) -> ManagedHeap {
    ManagedHeap::new(
        &[
            PoolSpec::heap("eden", None).without_thresholds(),
            PoolSpec::heap("old-gen", Some(cap)),
            PoolSpec::non_heap("metaspace", None),
        ],
        "old-gen",
    )
    .expect("heap")
}

#[test]
fn test_pool_enumeration() {
    let h = heap(8 * MIB);
    let pools = h.pools();
    let names: Vec<_> = pools.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["eden", "old-gen", "metaspace"]);

    let old = &pools[1];
    assert_eq!(old.pool_type, PoolType::Heap);
    assert_eq!(old.usage.max, Some(8 * MIB));
    assert!(old.supports_thresholds());
    assert!(!pools[0].supports_thresholds());
    assert!(!pools[2].supports_thresholds());
}

#[test]
fn test_concurrent_allocation_never_exceeds_capacity() {
    let h = Arc::new(heap(MIB));
    let mut handles = vec![];

    for _ in 0..8 {
        let h = Arc::clone(&h);
        handles.push(thread::spawn(move || {
            let mut held = Vec::new();
            while let Ok(block) = h.allocate(16 * 1024) {
                held.push(block);
            }
            held
        }));
    }

    // Blocks stay alive until every thread is joined.
    let held: Vec<Vec<Block>> = handles
        .into_iter()
        .map(|t| t.join().expect("Thread panicked"))
        .collect();
    let total: usize = held.iter().map(Vec::len).sum();
    assert_eq!(total, 64);
    assert_eq!(h.heap_usage().used, MIB);

    drop(held);
    assert_eq!(h.heap_usage().used, 0);
}

#[test]
fn test_population_over_soft_handles() {
    let h = Arc::new(heap(MIB));
    let pop: Arc<ReferencePopulation<Block, SoftHandle>> = Arc::new(ReferencePopulation::new());

    let writer = {
        let h = Arc::clone(&h);
        let pop = Arc::clone(&pop);
        thread::spawn(move || {
            for i in 0..512 {
                let block = match h.allocate(8 * 1024) {
                    Ok(b) => b,
                    Err(_) => break,
                };
                if i % 4 == 0 {
                    pop.add_retained(block);
                } else {
                    pop.add_reclaimable(h.soften(block));
                }
            }
        })
    };

    for _ in 0..200 {
        let live = pop.count_live_reclaimable();
        let added = pop.reclaimable_len();
        assert!(live <= added);
    }
    writer.join().expect("writer panicked");

    let counts = pop.counts();
    assert!(counts.live_reclaimable <= counts.reclaimable);
    // 512 * 8 KiB = 4 MiB was requested from a 1 MiB pool, so the collector ran.
    assert!(counts.live_reclaimable < counts.reclaimable);
    assert!(h.soft_referents() == counts.live_reclaimable);
}

#[test]
fn test_soft_handle_dereference() {
    let h = heap(MIB);
    let mut block = h.allocate(1024).unwrap();
    block[0] = 7;
    let handle = h.soften(block);

    let referent = handle.get().expect("still live");
    assert_eq!(referent[0], 7);
    assert_eq!(referent.pool_name(), "old-gen");
    drop(referent);

    h.collect();
    assert!(handle.get().is_none());
    assert!(!handle.is_live());
}
