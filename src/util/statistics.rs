//! Collection statistics and pause timing.
//!
//! Counters are always cheap enough to keep; pause timing is gathered between
//! `harness_begin` and `harness_end`, following the usual benchmark-harness
//! discipline.

use enum_map::{Enum, EnumMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use strum_macros::Display;

/// The stop-the-world pauses a cycle can take.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Enum, Display)]
pub enum PauseKind {
    /// Root snapshot and mark-table reset at the start of marking.
    InitialMark,
    /// Mod-buffer drain, termination check and candidate selection.
    FinalMark,
    /// Eager reference fixup after evacuation.
    Fixup,
    /// A full stop-the-world cycle (escalation, OOM retry, or user request).
    Full,
}

#[derive(Default)]
struct PauseCounter {
    count: AtomicU64,
    total_ns: AtomicU64,
    max_ns: AtomicU64,
}

/// Global statistics for one Relic instance.
pub struct Stats {
    gathering: AtomicBool,
    gc_count: AtomicUsize,
    full_gc_count: AtomicUsize,
    escalations: AtomicUsize,
    bytes_copied: AtomicUsize,
    live_bytes_last_gc: AtomicUsize,
    last_pause_ns: AtomicU64,
    pauses: EnumMap<PauseKind, PauseCounter>,
}

impl Stats {
    pub fn new() -> Self {
        Stats {
            gathering: AtomicBool::new(false),
            gc_count: AtomicUsize::new(0),
            full_gc_count: AtomicUsize::new(0),
            escalations: AtomicUsize::new(0),
            bytes_copied: AtomicUsize::new(0),
            live_bytes_last_gc: AtomicUsize::new(0),
            last_pause_ns: AtomicU64::new(0),
            pauses: EnumMap::default(),
        }
    }

    pub fn harness_begin(&self) {
        self.gathering.store(true, Ordering::SeqCst);
    }

    pub fn harness_end(&self) {
        self.gathering.store(false, Ordering::SeqCst);
    }

    pub fn gathering(&self) -> bool {
        self.gathering.load(Ordering::Relaxed)
    }

    pub fn count_gc(&self, full: bool) {
        self.gc_count.fetch_add(1, Ordering::Relaxed);
        if full {
            self.full_gc_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count_escalation(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_copied(&self, bytes: usize) {
        self.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn set_live_bytes_last_gc(&self, bytes: usize) {
        self.live_bytes_last_gc.store(bytes, Ordering::Relaxed);
    }

    /// Time a stop-the-world pause. The guard records on drop.
    pub fn pause_timer(&self, kind: PauseKind) -> PauseTimer {
        PauseTimer {
            stats: self,
            kind,
            start: Instant::now(),
        }
    }

    fn record_pause(&self, kind: PauseKind, ns: u64) {
        self.last_pause_ns.store(ns, Ordering::Relaxed);
        if !self.gathering() {
            return;
        }
        let counter = &self.pauses[kind];
        counter.count.fetch_add(1, Ordering::Relaxed);
        counter.total_ns.fetch_add(ns, Ordering::Relaxed);
        counter.max_ns.fetch_max(ns, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            gc_count: self.gc_count.load(Ordering::Relaxed),
            full_gc_count: self.full_gc_count.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
            live_bytes_last_gc: self.live_bytes_last_gc.load(Ordering::Relaxed),
            last_pause_ns: self.last_pause_ns.load(Ordering::Relaxed),
            pauses: EnumMap::from_fn(|kind| {
                let counter = &self.pauses[kind];
                PauseSummary {
                    count: counter.count.load(Ordering::Relaxed),
                    total_ns: counter.total_ns.load(Ordering::Relaxed),
                    max_ns: counter.max_ns.load(Ordering::Relaxed),
                }
            }),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII timer for a stop-the-world pause.
pub struct PauseTimer<'a> {
    stats: &'a Stats,
    kind: PauseKind,
    start: Instant,
}

impl Drop for PauseTimer<'_> {
    fn drop(&mut self) {
        let ns = self.start.elapsed().as_nanos() as u64;
        debug!("{} pause: {} us", self.kind, ns / 1000);
        self.stats.record_pause(self.kind, ns);
    }
}

/// Aggregate timing for one pause kind.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PauseSummary {
    pub count: u64,
    pub total_ns: u64,
    pub max_ns: u64,
}

/// A point-in-time copy of the counters, embedded in
/// [`crate::HeapStatistics`].
#[derive(Clone, Debug)]
pub struct StatsSnapshot {
    pub gc_count: usize,
    pub full_gc_count: usize,
    pub escalations: usize,
    pub bytes_copied: usize,
    pub live_bytes_last_gc: usize,
    pub last_pause_ns: u64,
    pub pauses: EnumMap<PauseKind, PauseSummary>,
}
