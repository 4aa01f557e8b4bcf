//! The instance type tying everything together.

use crate::global_state::GlobalState;
use crate::klass::{BacktraceRegistry, ClassTable, Reclaimer};
use crate::plan::mutator::MutatorRegistry;
use crate::plan::tracing::MarkQueue;
use crate::policy::region::RegionSpace;
use crate::scheduler::{controller, GcRequester, WorldController};
use crate::util::heap::GcTrigger;
use crate::util::options::Options;
use crate::util::statistics::Stats;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Builder for a [`Relic`] instance. Options start from their defaults and
/// any `RELIC_` environment overrides; callers may adjust them before
/// building.
#[derive(Default)]
pub struct RelicBuilder {
    pub options: Options,
}

impl RelicBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option by name, as if it came from the environment. Returns
    /// false if the name is unknown or the value does not parse.
    pub fn set_option(&mut self, name: &str, value: &str) -> bool {
        self.options.set_from_str(name, value)
    }

    pub fn build(self) -> Arc<Relic> {
        Arc::new(Relic::new(self.options))
    }
}

/// An instance of the Relic heap: the region space, the collector, the class
/// table and the redefinition machinery. Mutator threads attach to it with
/// [`crate::memory_manager::bind_mutator`].
pub struct Relic {
    pub(crate) options: Options,
    pub(crate) state: Arc<GlobalState>,
    pub(crate) space: Arc<RegionSpace>,
    pub(crate) classes: Arc<ClassTable>,
    pub(crate) backtraces: Arc<BacktraceRegistry>,
    pub(crate) mark_queue: Arc<MarkQueue>,
    pub(crate) controller: Arc<WorldController>,
    pub(crate) requester: Arc<GcRequester>,
    pub(crate) trigger: Arc<GcTrigger>,
    pub(crate) stats: Arc<Stats>,
    pub(crate) mutators: MutatorRegistry,
    gc_thread: Mutex<Option<JoinHandle<()>>>,
    reclaimer: Mutex<Option<Reclaimer>>,
}

impl Relic {
    fn new(options: Options) -> Self {
        let space = Arc::new(RegionSpace::new(options.heap_size.0));
        let requester = Arc::new(GcRequester::new());
        let trigger = Arc::new(GcTrigger::new(&options, space.clone(), requester.clone()));
        let classes = Arc::new(ClassTable::new(options.max_classes));
        Relic {
            state: Arc::new(GlobalState::new()),
            space,
            classes,
            backtraces: Arc::new(BacktraceRegistry::new()),
            mark_queue: Arc::new(MarkQueue::new()),
            controller: Arc::new(WorldController::new()),
            requester,
            trigger,
            stats: Arc::new(Stats::new()),
            mutators: MutatorRegistry::new(),
            gc_thread: Mutex::new(None),
            reclaimer: Mutex::new(None),
            options,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Spawn the controller and the method-version reclaimer. Until this is
    /// called, allocation failure is reported instead of triggering a
    /// collection.
    pub(crate) fn start_threads(self: &Arc<Self>) {
        let mut gc_thread = self.gc_thread.lock().unwrap();
        if gc_thread.is_some() {
            return;
        }
        *gc_thread = Some(controller::spawn(self.clone()));
        *self.reclaimer.lock().unwrap() = Some(Reclaimer::spawn(
            self.classes.clone(),
            Duration::from_millis(self.options.reclaim_interval_ms),
        ));
        self.state.initialized.store(true, Ordering::SeqCst);
        info!(
            "collection initialized ({} regions, {} worker threads)",
            self.space.region_count(),
            self.options.threads
        );
    }

    pub fn is_collection_enabled(&self) -> bool {
        self.state.initialized.load(Ordering::SeqCst)
    }

    /// Completed collection cycles.
    pub fn gc_epoch(&self) -> usize {
        self.controller.epoch()
    }

    /// Stop the collector and reclaimer threads and wait for them to exit.
    /// Idempotent.
    pub fn shutdown(&self) {
        self.state.initialized.store(false, Ordering::SeqCst);
        self.requester.shutdown();
        if let Some(handle) = self.gc_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.reclaimer.lock().unwrap().take();
    }
}

impl Drop for Relic {
    fn drop(&mut self) {
        // The controller thread holds a handle to this instance, so if this
        // runs the thread has already exited or was never started. Joining
        // here could self-join on the controller thread, so only wake it.
        self.requester.shutdown();
    }
}
