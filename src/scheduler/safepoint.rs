//! The stop-the-world handshake.
//!
//! Mutators poll [`WorldController::stop_requested`] at safepoints and park
//! until the pause ends. The controller stops the world by raising the flag
//! and waiting until every registered mutator is parked; a mutator blocked
//! for GC or in the middle of deregistering counts as parked, so neither can
//! deadlock a pause.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

#[derive(Default)]
struct WorldSync {
    stop_requested: bool,
    /// Registered mutator threads.
    active: usize,
    /// Mutators currently parked or blocked for GC.
    parked: usize,
    /// Completed collection cycles.
    epoch: usize,
}

pub struct WorldController {
    sync: Mutex<WorldSync>,
    condvar: Condvar,
    /// Mirror of `stop_requested` for the mutators' fast-path poll.
    stop_flag: AtomicBool,
}

/// While this guard lives, every mutator is parked. Dropping it resumes the
/// world.
pub struct StopTheWorldGuard<'a> {
    controller: &'a WorldController,
}

impl WorldController {
    pub fn new() -> Self {
        WorldController {
            sync: Mutex::new(WorldSync::default()),
            condvar: Condvar::new(),
            stop_flag: AtomicBool::new(false),
        }
    }

    pub fn register_mutator(&self) {
        self.sync.lock().unwrap().active += 1;
    }

    pub fn deregister_mutator(&self) {
        let mut sync = self.sync.lock().unwrap();
        sync.active -= 1;
        self.condvar.notify_all();
    }

    /// The mutators' fast-path safepoint check.
    pub fn stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Relaxed)
    }

    /// Stop the world. Blocks until every registered mutator has parked.
    /// Only the controller thread calls this.
    pub fn stop_the_world(&self) -> StopTheWorldGuard {
        let mut sync = self.sync.lock().unwrap();
        debug_assert!(!sync.stop_requested, "nested stop-the-world");
        sync.stop_requested = true;
        self.stop_flag.store(true, Ordering::SeqCst);
        while sync.parked < sync.active {
            sync = self.condvar.wait(sync).unwrap();
        }
        trace!("world stopped ({} mutators parked)", sync.parked);
        StopTheWorldGuard { controller: self }
    }

    /// Park the calling mutator until the pause ends.
    pub fn park(&self) {
        let mut sync = self.sync.lock().unwrap();
        sync.parked += 1;
        self.condvar.notify_all();
        while sync.stop_requested {
            sync = self.condvar.wait(sync).unwrap();
        }
        sync.parked -= 1;
    }

    /// Park the calling mutator until the next collection cycle has
    /// completed. Used on allocation failure: the caller retries once this
    /// returns.
    pub fn block_for_gc(&self) {
        let mut sync = self.sync.lock().unwrap();
        let target = sync.epoch + 1;
        sync.parked += 1;
        self.condvar.notify_all();
        while sync.epoch < target || sync.stop_requested {
            sync = self.condvar.wait(sync).unwrap();
        }
        sync.parked -= 1;
    }

    /// Mark the current cycle complete, releasing `block_for_gc` waiters.
    /// Called by the controller inside the final pause of a cycle.
    pub fn finish_cycle(&self) {
        let mut sync = self.sync.lock().unwrap();
        sync.epoch += 1;
        self.condvar.notify_all();
    }

    pub fn epoch(&self) -> usize {
        self.sync.lock().unwrap().epoch
    }
}

impl Default for WorldController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StopTheWorldGuard<'_> {
    fn drop(&mut self) {
        let mut sync = self.controller.sync.lock().unwrap();
        sync.stop_requested = false;
        self.controller.stop_flag.store(false, Ordering::SeqCst);
        trace!("resuming the world");
        self.controller.condvar.notify_all();
    }
}
