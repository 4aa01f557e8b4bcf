//! The API of the crate, as free functions over [`Relic`] and [`Mutator`].
//!
//! Interpreter and compiled-code paths go through [`alloc`],
//! [`store_reference`] and [`load_reference`]; operational tooling uses
//! [`trigger_full_collection`] and [`heap_statistics`]; debugging and
//! instrumentation use the class definition, redefinition and backtrace
//! entry points.

use crate::klass::metadata::ClassId;
use crate::klass::{Backtrace, RedefineError};
use crate::plan::mutator::{Mutator, RootId};
use crate::relic::{Relic, RelicBuilder};
use crate::util::alloc::AllocationError;
use crate::util::statistics::StatsSnapshot;
use crate::util::ObjectReference;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Build a Relic instance from a builder. This initializes the heap but not
/// the collector threads; see [`initialize_collection`].
pub fn relic_init(builder: RelicBuilder) -> Arc<Relic> {
    match crate::util::logger::try_init() {
        Ok(_) => debug!("logger initialized"),
        Err(_) => debug!("logger was already initialized, continuing"),
    }
    let relic = builder.build();
    info!(
        "heap initialized: {} in {} regions",
        crate::util::conversions::bytes_to_formatted_string(relic.space.heap_bytes()),
        relic.space.region_count()
    );
    relic
}

/// Spawn the collector and reclaimer threads. Allocation works before this
/// is called, but failures return `HeapOutOfMemory` instead of triggering a
/// collection.
pub fn initialize_collection(relic: &Arc<Relic>) {
    relic.start_threads();
}

/// Attach the calling thread to the heap. The returned mutator must stay on
/// this thread and be handed to [`destroy_mutator`] when the thread detaches.
pub fn bind_mutator(relic: Arc<Relic>) -> Box<Mutator> {
    Box::new(Mutator::new(relic))
}

/// Detach a mutator from the heap. Its roots disappear with it; objects they
/// kept alive become collectable.
pub fn destroy_mutator(mutator: Box<Mutator>) {
    drop(mutator);
}

/// Allocate an instance of `class`, blocking for a collection and retrying
/// if the heap is momentarily full.
pub fn alloc(mutator: &mut Mutator, class: ClassId) -> Result<ObjectReference, AllocationError> {
    mutator.alloc(class)
}

/// Store `value` into reference field `slot` of `target`. Returns the
/// current location of `target`, which may have moved if the store helped
/// relocation along.
pub fn store_reference(
    mutator: &mut Mutator,
    target: ObjectReference,
    slot: usize,
    value: Option<ObjectReference>,
) -> ObjectReference {
    mutator.store_reference(target, slot, value)
}

/// Load reference field `slot` of `target`.
pub fn load_reference(
    mutator: &mut Mutator,
    target: ObjectReference,
    slot: usize,
) -> Option<ObjectReference> {
    mutator.load_reference(target, slot)
}

/// Register `object` as a root of the calling thread.
pub fn add_root(mutator: &mut Mutator, object: ObjectReference) -> RootId {
    mutator.add_root(object)
}

pub fn remove_root(mutator: &mut Mutator, id: RootId) -> Option<ObjectReference> {
    mutator.remove_root(id)
}

/// The current location of a rooted object.
pub fn read_root(mutator: &Mutator, id: RootId) -> Option<ObjectReference> {
    mutator.read_root(id)
}

/// Ask for a full stop-the-world collection. Returns immediately; pair with
/// [`Mutator::wait_for_collection`] to wait for the cycle.
pub fn trigger_full_collection(relic: &Relic) {
    relic.state.full_gc_requested.store(true, Ordering::SeqCst);
    relic.requester.request();
}

/// Point-in-time heap and collector counters.
#[derive(Clone, Debug)]
pub struct HeapStatistics {
    pub heap_bytes: usize,
    pub total_regions: usize,
    pub regions_in_use: usize,
    pub used_bytes: usize,
    /// Bytes marked live in the most recent collection.
    pub live_bytes_last_gc: usize,
    pub occupancy: f32,
    pub classes_defined: usize,
    pub gc: StatsSnapshot,
}

pub fn heap_statistics(relic: &Relic) -> HeapStatistics {
    let gc = relic.stats.snapshot();
    HeapStatistics {
        heap_bytes: relic.space.heap_bytes(),
        total_regions: relic.space.region_count(),
        regions_in_use: relic.space.regions_in_use(),
        used_bytes: relic.space.used_bytes(),
        live_bytes_last_gc: gc.live_bytes_last_gc,
        occupancy: relic.space.regions_in_use() as f32 / relic.space.region_count() as f32,
        classes_defined: relic.classes.class_count(),
        gc,
    }
}

/// Define a new class from class bytes.
pub fn define_class(relic: &Relic, bytes: &[u8]) -> Result<ClassId, RedefineError> {
    relic.classes.define(bytes)
}

/// Resolve a class name to its id.
pub fn resolve_class(relic: &Relic, name: &str) -> Option<ClassId> {
    relic.classes.resolve(name)
}

/// Atomically replace the metadata of `class` with a new generation built
/// from `bytes`. Existing instances keep their layout; frames and captured
/// backtraces keep resolving through the method versions they hold.
pub fn redefine(relic: &Relic, class: ClassId, bytes: &[u8]) -> Result<(), RedefineError> {
    relic.classes.redefine(class, bytes)
}

/// How many live captured backtraces still reference a method version of
/// `class`, across all generations.
pub fn query_backtrace_references(relic: &Relic, class: ClassId) -> usize {
    relic.backtraces.references_to(class)
}

/// Capture the calling thread's interpreter stack.
pub fn capture_backtrace(mutator: &Mutator) -> Arc<Backtrace> {
    mutator.capture_backtrace()
}

/// Start gathering pause statistics. Called right before the workload under
/// measurement.
pub fn harness_begin(relic: &Relic) {
    relic.stats.harness_begin();
}

/// Stop gathering pause statistics.
pub fn harness_end(relic: &Relic) {
    relic.stats.harness_end();
}
