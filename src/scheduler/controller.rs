//! The GC controller thread.
//!
//! One controller thread responds to collection requests and drives the
//! cycle: it takes the pauses, runs the concurrent phases with a pool of
//! scoped workers and publishes phase transitions. Mutators only ever see a
//! phase change while they are parked.

use crate::global_state::Phase;
use crate::plan::tracing;
use crate::scheduler::worker::{self, MarkOutcome};
use crate::util::object_forwarding;
use crate::util::options::CollectorSelector;
use crate::util::statistics::PauseKind;
use crate::Relic;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

pub struct GcController {
    relic: Arc<Relic>,
}

/// Spawn the controller thread. It exits when the requester shuts down.
pub fn spawn(relic: Arc<Relic>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("relic-gc".to_owned())
        .spawn(move || GcController { relic }.run())
        .unwrap_or_else(|e| panic!("failed to spawn the gc controller thread: {}", e))
}

impl GcController {
    fn run(&self) {
        debug!("gc controller running");
        while self.relic.requester.wait_for_request() {
            self.relic.requester.clear_request();
            self.collect();
        }
        debug!("gc controller exiting");
    }

    fn collect(&self) {
        let relic = &self.relic;
        let full = relic.options.collector == CollectorSelector::StopTheWorld
            || relic.state.full_gc_requested.swap(false, Ordering::SeqCst);
        relic.stats.count_gc(full);
        let epoch = relic.controller.epoch();
        info!(
            "collection {} starting ({}, {}/{} regions in use)",
            epoch,
            if full { "full" } else { "concurrent" },
            relic.space.regions_in_use(),
            relic.space.region_count()
        );
        if full {
            self.collect_full();
        } else {
            self.collect_concurrent();
        }
        relic.trigger.reset();
        info!(
            "collection {} finished ({}/{} regions in use)",
            epoch,
            relic.space.regions_in_use(),
            relic.space.region_count()
        );
    }

    fn collect_concurrent(&self) {
        let relic = &self.relic;

        // Initial mark: reset mark state, snapshot the roots, arm the
        // barrier.
        {
            let _timer = relic.stats.pause_timer(PauseKind::InitialMark);
            let _world = relic.controller.stop_the_world();
            relic.space.prepare_mark();
            relic.state.set_phase(Phase::Marking);
            self.scan_roots();
        }

        // Concurrent mark, racing allocation. The barrier feeds the
        // worklist while the workers drain it.
        let outcome = worker::run_marking(
            relic.options.threads,
            &relic.space,
            &relic.mark_queue,
            relic.options.mark_escalation_limit,
        );
        if outcome == MarkOutcome::Escalated {
            relic.stats.count_escalation();
            warn!(
                "mark worklist exceeded {} entries, escalating to stop-the-world",
                relic.options.mark_escalation_limit
            );
            let _timer = relic.stats.pause_timer(PauseKind::Full);
            let _world = relic.controller.stop_the_world();
            self.finish_marking_stw();
            self.relocate_stw();
            return;
        }

        // Final mark: drain what the barrier queued since the workers
        // stopped, rescan the roots, and pick relocation candidates. The
        // relocate flags and the phase are published before any mutator
        // resumes, which is what lets the barrier help-forward safely.
        let candidates = {
            let _timer = relic.stats.pause_timer(PauseKind::FinalMark);
            let _world = relic.controller.stop_the_world();
            self.finish_marking_stw();
            let candidates = relic.space.select_candidates(relic.options.evac_threshold);
            relic.state.set_phase(Phase::Relocating);
            candidates
        };

        // Concurrent evacuation, racing mutator stores that help forward.
        worker::run_evacuation(
            relic.options.threads,
            &relic.space,
            &candidates,
            &relic.stats,
        );

        // Fixup: rewrite every stale reference eagerly, then free the
        // evacuated regions.
        {
            let _timer = relic.stats.pause_timer(PauseKind::Fixup);
            let _world = relic.controller.stop_the_world();
            self.finish_relocation();
        }
    }

    fn collect_full(&self) {
        let relic = &self.relic;
        let _timer = relic.stats.pause_timer(PauseKind::Full);
        let _world = relic.controller.stop_the_world();
        relic.space.prepare_mark();
        relic.state.set_phase(Phase::Marking);
        self.scan_roots();
        self.finish_marking_stw();
        self.relocate_stw();
    }

    /// Drain the worklist to completion and rescan the roots. Runs inside a
    /// pause; parked mutators have flushed their buffers, so an empty
    /// worklist afterwards means marking has terminated.
    fn finish_marking_stw(&self) {
        let relic = &self.relic;
        let drain = || {
            worker::run_marking(
                relic.options.threads,
                &relic.space,
                &relic.mark_queue,
                usize::MAX,
            )
        };
        drain();
        // Roots may hold references loaded from fields that were since
        // overwritten; the insertion barrier never saw those.
        self.scan_roots();
        drain();
        debug_assert!(relic.mark_queue.is_empty());
        relic.stats.set_live_bytes_last_gc(relic.space.live_bytes());
    }

    /// Candidate selection, evacuation and fixup inside an already stopped
    /// world. Used by full collections and by escalation.
    fn relocate_stw(&self) {
        let relic = &self.relic;
        let candidates = relic.space.select_candidates(relic.options.evac_threshold);
        relic.state.set_phase(Phase::Relocating);
        worker::run_evacuation(
            relic.options.threads,
            &relic.space,
            &candidates,
            &relic.stats,
        );
        self.finish_relocation();
    }

    /// Rewrite all references to evacuated objects, release the candidate
    /// regions and close the cycle. Runs inside a pause.
    fn finish_relocation(&self) {
        let relic = &self.relic;
        worker::run_fixup(relic.options.threads, &relic.space);
        self.fixup_roots();
        #[cfg(feature = "extreme_assertions")]
        worker::verify_fixup(&relic.space);

        let mut freed = 0;
        for index in 0..relic.space.region_count() {
            if relic.space.region(index).is_relocate() {
                relic.space.release_region(index);
                freed += 1;
            }
        }
        debug!("freed {} evacuated regions", freed);
        relic.space.retire_copy_cursor();
        relic.state.set_phase(Phase::Idle);
        relic.controller.finish_cycle();
    }

    /// Mark and queue every mutator root. Runs inside a pause.
    fn scan_roots(&self) {
        let relic = &self.relic;
        let mut roots = 0;
        relic.mutators.for_each(|shared| {
            for root in shared.roots.borrow().iter() {
                roots += 1;
                if tracing::attempt_mark(&relic.space, root) {
                    relic.mark_queue.push(root);
                }
            }
        });
        trace!("scanned {} mutator roots", roots);
    }

    /// Point every root at the current location of its object. Runs inside
    /// the pause that ends relocation.
    fn fixup_roots(&self) {
        let relic = &self.relic;
        relic.mutators.for_each(|shared| {
            let mut roots = shared.roots.borrow_mut();
            for slot in roots.iter_mut() {
                if relic.space.region_of(*slot).is_relocate() {
                    *slot = object_forwarding::read_forwarding_pointer(*slot);
                }
            }
        });
    }
}
