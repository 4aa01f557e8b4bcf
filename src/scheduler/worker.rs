//! Parallel GC work: marking, evacuation and reference fixup.
//!
//! Workers are scoped threads spawned per phase rather than a resident pool;
//! a phase's bound on the number of regions or worklist entries makes the
//! spawn cost irrelevant next to the work itself.

use crate::plan::tracing::{self, MarkQueue};
use crate::policy::region::{RegionSpace, RegionState};
use crate::util::statistics::Stats;
use crate::util::{object_forwarding, object_model, ObjectReference};
use crossbeam::deque::{Steal, Stealer, Worker};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// How concurrent marking ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The worklist drained and stayed empty.
    Completed,
    /// The worklist outgrew the escalation limit; the caller must finish
    /// marking stop-the-world.
    Escalated,
}

/// Scan the fields of a live object, pushing newly marked children.
fn scan_object(space: &RegionSpace, local: &Worker<ObjectReference>, object: ObjectReference) {
    for slot in 0..object_model::num_ref_fields(object) {
        if let Some(child) = object_model::read_field(object, slot) {
            if tracing::attempt_mark(space, child) {
                local.push(child);
            }
        }
    }
}

/// Drain the mark worklist with `threads` workers. Terminates when the
/// shared queue and every local deque are empty and no worker is busy.
pub fn run_marking(
    threads: usize,
    space: &RegionSpace,
    queue: &MarkQueue,
    escalation_limit: usize,
) -> MarkOutcome {
    debug_assert!(threads > 0);
    let locals: Vec<Worker<ObjectReference>> =
        (0..threads).map(|_| Worker::new_lifo()).collect();
    let stealers: Vec<Stealer<ObjectReference>> =
        locals.iter().map(|w| w.stealer()).collect();
    let busy = AtomicUsize::new(threads);
    let escalated = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for (index, local) in locals.into_iter().enumerate() {
            let stealers = &stealers;
            let busy = &busy;
            let escalated = &escalated;
            scope.spawn(move || {
                'work: loop {
                    if escalated.load(Ordering::Relaxed) {
                        break;
                    }
                    let object = local.pop().or_else(|| find_work(queue, &local, stealers, index));
                    match object {
                        Some(object) => {
                            scan_object(space, &local, object);
                            if queue.len() > escalation_limit {
                                escalated.store(true, Ordering::SeqCst);
                            }
                        }
                        None => {
                            busy.fetch_sub(1, Ordering::SeqCst);
                            loop {
                                if escalated.load(Ordering::Relaxed) {
                                    break 'work;
                                }
                                if !queue.is_empty()
                                    || stealers.iter().any(|s| !s.is_empty())
                                {
                                    busy.fetch_add(1, Ordering::SeqCst);
                                    continue 'work;
                                }
                                if busy.load(Ordering::SeqCst) == 0 {
                                    break 'work;
                                }
                                std::thread::yield_now();
                            }
                        }
                    }
                }
                // An escalated exit leaves unscanned entries in the local
                // deque; hand them back so the stop-the-world drain sees
                // them.
                while let Some(object) = local.pop() {
                    queue.push(object);
                }
            });
        }
    });

    if escalated.load(Ordering::SeqCst) {
        MarkOutcome::Escalated
    } else {
        MarkOutcome::Completed
    }
}

fn find_work(
    queue: &MarkQueue,
    local: &Worker<ObjectReference>,
    stealers: &[Stealer<ObjectReference>],
    index: usize,
) -> Option<ObjectReference> {
    if let Some(object) = queue.steal_into(local) {
        return Some(object);
    }
    for (i, stealer) in stealers.iter().enumerate() {
        if i == index {
            continue;
        }
        loop {
            match stealer.steal() {
                Steal::Success(object) => return Some(object),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }
    }
    None
}

/// Copy every live object out of the candidate regions. Runs concurrently
/// with mutators, which may help forward through the write barrier; the
/// forwarding-word CAS arbitrates.
pub fn run_evacuation(
    threads: usize,
    space: &RegionSpace,
    candidates: &[usize],
    stats: &Stats,
) {
    let next = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for _ in 0..threads.min(candidates.len().max(1)) {
            let next = &next;
            scope.spawn(move || loop {
                let claim = next.fetch_add(1, Ordering::SeqCst);
                let Some(&index) = candidates.get(claim) else {
                    break;
                };
                evacuate_region(space, index, stats);
            });
        }
    });
}

fn evacuate_region(space: &RegionSpace, index: usize, stats: &Stats) {
    let region = space.region(index);
    debug_assert!(region.is_relocate());
    let mut copied = 0;
    region
        .mark_table()
        .iterate(region.start(), region.cursor(), |object| {
            let state = object_forwarding::attempt_to_forward(object);
            if object_forwarding::state_is_forwarded_or_being_forwarded(state) {
                // A mutator store got here first.
                return;
            }
            let bytes = object_model::size_of(object);
            let to = space
                .alloc_for_copy(bytes)
                .unwrap_or_else(|| panic!("heap exhausted while relocating {}", object));
            let new_object = object_forwarding::forward_object(object, to);
            tracing::attempt_mark(space, new_object);
            copied += bytes;
        });
    stats.add_bytes_copied(copied);
    trace!("evacuated region {} ({} bytes copied here)", index, copied);
}

/// Rewrite every reference into a candidate region to its forwarding
/// pointer. Runs inside the fixup pause, after evacuation finished, so every
/// live candidate object is forwarded.
pub fn run_fixup(threads: usize, space: &RegionSpace) {
    let next = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for _ in 0..threads {
            let next = &next;
            scope.spawn(move || loop {
                let index = next.fetch_add(1, Ordering::SeqCst);
                if index >= space.region_count() {
                    break;
                }
                let region = space.region(index);
                if region.state() != RegionState::Allocating || region.is_relocate() {
                    continue;
                }
                region
                    .mark_table()
                    .iterate(region.start(), region.cursor(), |object| {
                        fixup_object(space, object)
                    });
            });
        }
    });
}

fn fixup_object(space: &RegionSpace, object: ObjectReference) {
    for slot in 0..object_model::num_ref_fields(object) {
        if let Some(value) = object_model::read_field(object, slot) {
            if space.region_of(value).is_relocate() {
                let forwarded = object_forwarding::read_forwarding_pointer(value);
                object_model::write_field(object, slot, Some(forwarded));
            }
        }
    }
}

/// Walk all live objects and check that no field still points into a
/// relocation candidate. Called at the end of the fixup pause, before the
/// candidates are freed.
#[cfg(feature = "extreme_assertions")]
pub fn verify_fixup(space: &RegionSpace) {
    for index in 0..space.region_count() {
        let region = space.region(index);
        if region.state() != RegionState::Allocating || region.is_relocate() {
            continue;
        }
        region
            .mark_table()
            .iterate(region.start(), region.cursor(), |object| {
                for slot in 0..object_model::num_ref_fields(object) {
                    if let Some(value) = object_model::read_field(object, slot) {
                        assert!(
                            !space.region_of(value).is_relocate(),
                            "{} slot {} still points into candidate region: {}",
                            object,
                            slot,
                            value
                        );
                        assert!(
                            !object_forwarding::is_forwarded(value),
                            "{} slot {} points at a forwarded object {}",
                            object,
                            slot,
                            value
                        );
                    }
                }
            });
    }
}
