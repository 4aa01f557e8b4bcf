//! Evacuation of sparse regions and reference fixup.

use relic::klass::classfile::testing::ClassBytesBuilder;
use relic::memory_manager;
use relic::util::test_util::panic_after;
use relic::{Relic, RelicBuilder};
use std::sync::Arc;

fn heap() -> Arc<Relic> {
    let mut builder = RelicBuilder::new();
    builder.set_option("heap_size", "4m");
    // Deterministic cycles: every requested collection is stop-the-world.
    builder.set_option("collector", "StopTheWorld");
    let relic = memory_manager::relic_init(builder);
    memory_manager::initialize_collection(&relic);
    relic
}

#[test]
fn sparse_regions_are_evacuated_and_references_fixed() {
    panic_after(60_000, || {
        let relic = heap();
        let class = memory_manager::define_class(
            &relic,
            &ClassBytesBuilder::new("test/Pair").ref_fields(1).build(),
        )
        .unwrap();
        let mut mutator = memory_manager::bind_mutator(relic.clone());

        // A handful of cross-linked pairs drowning in garbage, so every
        // region is far below the evacuation threshold.
        let mut pairs = vec![];
        for _ in 0..8 {
            let a = memory_manager::alloc(&mut mutator, class).unwrap();
            let b = memory_manager::alloc(&mut mutator, class).unwrap();
            memory_manager::store_reference(&mut mutator, a, 0, Some(b));
            memory_manager::store_reference(&mut mutator, b, 0, Some(a));
            let root = memory_manager::add_root(&mut mutator, a);
            pairs.push((root, a));
            for _ in 0..3_000 {
                memory_manager::alloc(&mut mutator, class).unwrap();
            }
        }
        let before = memory_manager::heap_statistics(&relic);

        memory_manager::trigger_full_collection(&relic);
        mutator.wait_for_collection();

        let mut moved = 0;
        for (root, old) in &pairs {
            let a = memory_manager::read_root(&mutator, *root).unwrap();
            if a != *old {
                moved += 1;
            }
            // The pair still points at itself through both fields.
            let b = memory_manager::load_reference(&mut mutator, a, 0).unwrap();
            assert_eq!(
                memory_manager::load_reference(&mut mutator, b, 0),
                Some(a)
            );
            assert_ne!(a, b);
        }
        // Every region was sparse, so every survivor was copied out.
        assert_eq!(moved, pairs.len());

        let after = memory_manager::heap_statistics(&relic);
        assert!(after.regions_in_use < before.regions_in_use);
        assert!(after.gc.bytes_copied > 0);

        memory_manager::destroy_mutator(mutator);
        relic.shutdown();
    });
}

#[test]
fn collection_compacts_repeatedly() {
    panic_after(120_000, || {
        let relic = heap();
        let class = memory_manager::define_class(
            &relic,
            &ClassBytesBuilder::new("test/Node").ref_fields(1).build(),
        )
        .unwrap();
        let mut mutator = memory_manager::bind_mutator(relic.clone());

        let survivor = memory_manager::alloc(&mut mutator, class).unwrap();
        let root = memory_manager::add_root(&mut mutator, survivor);

        // Without reclamation this would fill the heap several times over.
        for round in 0..10 {
            for _ in 0..4_000 {
                memory_manager::alloc(&mut mutator, class).unwrap();
            }
            memory_manager::trigger_full_collection(&relic);
            mutator.wait_for_collection();
            assert!(
                memory_manager::read_root(&mutator, root).is_some(),
                "survivor lost in round {}",
                round
            );
        }
        assert!(memory_manager::heap_statistics(&relic).gc.full_gc_count >= 10);

        memory_manager::destroy_mutator(mutator);
        relic.shutdown();
    });
}

#[test]
fn oom_collections_with_mostly_live_data_complete() {
    panic_after(120_000, || {
        let relic = heap();
        let class = memory_manager::define_class(
            &relic,
            &ClassBytesBuilder::new("test/Node").ref_fields(1).build(),
        )
        .unwrap();
        let mut mutator = memory_manager::bind_mutator(relic.clone());

        // A rooted chain filling about half the heap. Collections triggered
        // by exhaustion start with no free region, so evacuation must be
        // held to what the reclaimed garbage regions can absorb.
        const CHAIN: usize = 65_536;
        let mut head = None;
        for _ in 0..CHAIN {
            let node = memory_manager::alloc(&mut mutator, class).unwrap();
            memory_manager::store_reference(&mut mutator, node, 0, head);
            head = Some(node);
        }
        let root = memory_manager::add_root(&mut mutator, head.unwrap());

        // Garbage worth several times the remaining space.
        for _ in 0..200_000 {
            memory_manager::alloc(&mut mutator, class).unwrap();
        }

        let mut node = memory_manager::read_root(&mutator, root).unwrap();
        let mut len = 1;
        while let Some(next) = memory_manager::load_reference(&mut mutator, node, 0) {
            node = next;
            len += 1;
        }
        assert_eq!(len, CHAIN);
        assert!(memory_manager::heap_statistics(&relic).gc.gc_count >= 1);

        memory_manager::destroy_mutator(mutator);
        relic.shutdown();
    });
}

#[test]
fn allocation_failure_blocks_for_a_collection_and_retries() {
    panic_after(120_000, || {
        let relic = heap();
        let class = memory_manager::define_class(
            &relic,
            &ClassBytesBuilder::new("test/Node").ref_fields(1).build(),
        )
        .unwrap();
        let mut mutator = memory_manager::bind_mutator(relic.clone());

        // Unrooted, so each collection frees everything. Filling the heap
        // many times over only works if OOM triggers a cycle and retries.
        for _ in 0..200_000 {
            memory_manager::alloc(&mut mutator, class).unwrap();
        }
        assert!(memory_manager::heap_statistics(&relic).gc.gc_count >= 1);

        memory_manager::destroy_mutator(mutator);
        relic.shutdown();
    });
}
