use atomic::{Atomic, Ordering};
use std::sync::atomic::AtomicBool;

/// Where the collector currently is in its cycle. Published by the controller
/// inside pauses; read by mutators on every store through the barrier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::NoUninit)]
#[repr(u8)]
pub enum Phase {
    /// No collection in progress.
    Idle,
    /// Concurrent marking; the insertion barrier is active and new objects
    /// are allocated marked.
    Marking,
    /// Concurrent evacuation; stores to candidate-region objects help
    /// forward them first.
    Relocating,
}

/// Global collector state shared across mutators, workers and the
/// controller.
pub struct GlobalState {
    phase: Atomic<Phase>,
    /// Set once `initialize_collection` has spawned the controller.
    pub initialized: AtomicBool,
    /// Makes the next cycle a full stop-the-world collection.
    pub full_gc_requested: AtomicBool,
}

impl GlobalState {
    pub fn new() -> Self {
        GlobalState {
            phase: Atomic::new(Phase::Idle),
            initialized: AtomicBool::new(false),
            full_gc_requested: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase.load(Ordering::SeqCst)
    }

    /// Only the controller moves the phase, and only inside a pause, so
    /// every mutator observes the new phase before it can run again.
    pub fn set_phase(&self, phase: Phase) {
        debug!("phase {:?} -> {:?}", self.phase(), phase);
        self.phase.store(phase, Ordering::SeqCst);
    }

    pub fn is_collecting(&self) -> bool {
        self.phase() != Phase::Idle
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new()
    }
}
