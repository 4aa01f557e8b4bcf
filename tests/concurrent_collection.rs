//! Collection cycles racing mutator threads.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use relic::klass::classfile::testing::ClassBytesBuilder;
use relic::memory_manager;
use relic::util::test_util::panic_after;
use relic::{ObjectReference, Relic, RelicBuilder};
use std::sync::Arc;

fn heap(extra: &[(&str, &str)]) -> Arc<Relic> {
    let mut builder = RelicBuilder::new();
    builder.set_option("heap_size", "16m");
    for (name, value) in extra {
        assert!(builder.set_option(name, value));
    }
    let relic = memory_manager::relic_init(builder);
    memory_manager::initialize_collection(&relic);
    relic
}

fn define_node(relic: &Relic) -> relic::klass::ClassId {
    memory_manager::define_class(
        relic,
        &ClassBytesBuilder::new("test/Node").ref_fields(2).build(),
    )
    .unwrap()
}

/// Build a singly linked list of `len` nodes, interleaved with garbage, and
/// return the head.
fn build_chain(
    mutator: &mut relic::Mutator,
    class: relic::klass::ClassId,
    len: usize,
) -> ObjectReference {
    let mut head: Option<ObjectReference> = None;
    for _ in 0..len {
        let node = memory_manager::alloc(mutator, class).unwrap();
        memory_manager::store_reference(mutator, node, 0, head);
        head = Some(node);
        let _garbage = memory_manager::alloc(mutator, class).unwrap();
    }
    head.unwrap()
}

fn chain_len(mutator: &mut relic::Mutator, head: ObjectReference) -> usize {
    let mut len = 1;
    let mut node = head;
    while let Some(next) = memory_manager::load_reference(mutator, node, 0) {
        node = next;
        len += 1;
    }
    len
}

#[test]
fn requested_collection_keeps_rooted_chain_and_reclaims_garbage() {
    panic_after(60_000, || {
        let relic = heap(&[]);
        let class = define_node(&relic);
        let mut mutator = memory_manager::bind_mutator(relic.clone());

        let head = build_chain(&mut mutator, class, 10_000);
        let root = memory_manager::add_root(&mut mutator, head);

        memory_manager::trigger_full_collection(&relic);
        mutator.wait_for_collection();

        let stats = memory_manager::heap_statistics(&relic);
        assert!(stats.gc.gc_count >= 1);
        assert!(stats.gc.full_gc_count >= 1);
        assert!(stats.live_bytes_last_gc > 0);

        // Every chain node survived, in order, wherever it lives now.
        let head = memory_manager::read_root(&mutator, root).unwrap();
        assert_eq!(chain_len(&mut mutator, head), 10_000);

        memory_manager::destroy_mutator(mutator);
        relic.shutdown();
    });
}

#[test]
fn stress_collections_during_allocation() {
    panic_after(120_000, || {
        // Request a collection every 256 KiB of allocation, on top of the
        // occupancy trigger.
        let relic = heap(&[("stress_factor", "262144")]);
        let class = define_node(&relic);
        let mut mutator = memory_manager::bind_mutator(relic.clone());

        let head = build_chain(&mut mutator, class, 10_000);
        let root = memory_manager::add_root(&mut mutator, head);
        // Keep allocating garbage so several cycles run against us.
        for _ in 0..20_000 {
            memory_manager::alloc(&mut mutator, class).unwrap();
        }

        let head = memory_manager::read_root(&mutator, root).unwrap();
        assert_eq!(chain_len(&mut mutator, head), 10_000);
        assert!(memory_manager::heap_statistics(&relic).gc.gc_count >= 1);

        memory_manager::destroy_mutator(mutator);
        relic.shutdown();
    });
}

#[test]
fn parallel_mutators_survive_collections() {
    panic_after(120_000, || {
        let relic = heap(&[]);
        let class = define_node(&relic);

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let relic = relic.clone();
                std::thread::spawn(move || {
                    let mut mutator = memory_manager::bind_mutator(relic.clone());
                    let head = build_chain(&mut mutator, class, 2_000);
                    let root = memory_manager::add_root(&mut mutator, head);

                    memory_manager::trigger_full_collection(&relic);
                    mutator.wait_for_collection();

                    let head = memory_manager::read_root(&mutator, root).unwrap();
                    assert_eq!(chain_len(&mut mutator, head), 2_000);
                    memory_manager::destroy_mutator(mutator);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        relic.shutdown();
    });
}

#[test]
fn random_mutation_under_stress_collections() {
    panic_after(120_000, || {
        let relic = heap(&[("stress_factor", "262144")]);
        let class = define_node(&relic);
        let mut mutator = memory_manager::bind_mutator(relic.clone());

        // A fixed population of rooted nodes whose links are rewired at
        // random while collections run against us. `expected` mirrors the
        // links by node index, so verification does not depend on where the
        // collector moved anything.
        const NODES: usize = 256;
        let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
        let roots: Vec<_> = (0..NODES)
            .map(|_| {
                let node = memory_manager::alloc(&mut mutator, class).unwrap();
                memory_manager::add_root(&mut mutator, node)
            })
            .collect();
        let mut expected = vec![[None::<usize>; 2]; NODES];

        for _ in 0..50_000 {
            let i = rng.random_range(0..NODES);
            let slot = rng.random_range(0..2);
            let value = if rng.random_bool(0.2) {
                None
            } else {
                Some(rng.random_range(0..NODES))
            };
            let target = memory_manager::read_root(&mutator, roots[i]).unwrap();
            let value_ref =
                value.map(|j| memory_manager::read_root(&mutator, roots[j]).unwrap());
            memory_manager::store_reference(&mut mutator, target, slot, value_ref);
            expected[i][slot] = value;
            // Garbage keeps the stress trigger firing.
            memory_manager::alloc(&mut mutator, class).unwrap();
        }

        // Settle the heap so nothing moves while comparing.
        memory_manager::trigger_full_collection(&relic);
        mutator.wait_for_collection();

        for (i, links) in expected.iter().enumerate() {
            let node = memory_manager::read_root(&mutator, roots[i]).unwrap();
            for (slot, expected_index) in links.iter().enumerate() {
                let actual = memory_manager::load_reference(&mut mutator, node, slot);
                let expected_ref = expected_index
                    .map(|j| memory_manager::read_root(&mutator, roots[j]).unwrap());
                assert_eq!(actual, expected_ref, "node {} slot {}", i, slot);
            }
        }

        memory_manager::destroy_mutator(mutator);
        relic.shutdown();
    });
}

#[test]
fn unrooted_objects_are_reclaimed() {
    panic_after(60_000, || {
        let relic = heap(&[]);
        let class = define_node(&relic);
        let mut mutator = memory_manager::bind_mutator(relic.clone());

        // Nothing is rooted, so this is all garbage.
        for _ in 0..20_000 {
            memory_manager::alloc(&mut mutator, class).unwrap();
        }
        let before = memory_manager::heap_statistics(&relic);

        memory_manager::trigger_full_collection(&relic);
        mutator.wait_for_collection();

        let after = memory_manager::heap_statistics(&relic);
        assert!(after.regions_in_use < before.regions_in_use);
        assert!(after.used_bytes < before.used_bytes);

        memory_manager::destroy_mutator(mutator);
        relic.shutdown();
    });
}
