//! Per-thread mutator context.
//!
//! A [`Mutator`] is owned by exactly one thread and bundles everything that
//! thread needs to use the heap: a bump allocator, the barrier, an explicit
//! root table and its interpreter frames. The small [`MutatorShared`] part is
//! also reachable from the collector, which scans and fixes roots during
//! pauses while the owning thread is parked.

use crate::global_state::Phase;
use crate::klass::backtrace::{Backtrace, BacktraceFrame};
use crate::klass::metadata::ClassId;
use crate::plan::barriers::{Barrier, FieldBarrier};
use crate::util::alloc::{AllocationError, BumpAllocator};
use crate::util::object_model;
use crate::util::{object_forwarding, ObjectReference};
use crate::Relic;
use atomic_refcell::AtomicRefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Handle to an entry in a mutator's root table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RootId(usize);

/// Explicitly registered roots of one thread. Slots are reused after
/// removal, so handles stay small.
#[derive(Default)]
pub struct RootSet {
    slots: Vec<Option<ObjectReference>>,
    free: Vec<usize>,
}

impl RootSet {
    pub fn add(&mut self, object: ObjectReference) -> RootId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(object);
                RootId(index)
            }
            None => {
                self.slots.push(Some(object));
                RootId(self.slots.len() - 1)
            }
        }
    }

    pub fn remove(&mut self, id: RootId) -> Option<ObjectReference> {
        let object = self.slots.get_mut(id.0)?.take();
        if object.is_some() {
            self.free.push(id.0);
        }
        object
    }

    pub fn get(&self, id: RootId) -> Option<ObjectReference> {
        self.slots.get(id.0).copied().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjectReference> + '_ {
        self.slots.iter().filter_map(|s| *s)
    }

    /// Mutable slot access for the collector's fixup pass.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ObjectReference> {
        self.slots.iter_mut().filter_map(|s| s.as_mut())
    }
}

/// The collector-visible part of a mutator.
pub struct MutatorShared {
    pub id: usize,
    /// Borrowed by the owning thread while running and by the collector
    /// during pauses; the safepoint protocol keeps those apart.
    pub roots: AtomicRefCell<RootSet>,
}

/// All registered mutators, for root scanning and fixup.
pub struct MutatorRegistry {
    mutators: Mutex<Vec<Arc<MutatorShared>>>,
    next_id: AtomicUsize,
}

impl MutatorRegistry {
    pub fn new() -> Self {
        MutatorRegistry {
            mutators: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    fn register(&self) -> Arc<MutatorShared> {
        let shared = Arc::new(MutatorShared {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            roots: AtomicRefCell::new(RootSet::default()),
        });
        self.mutators.lock().unwrap().push(shared.clone());
        shared
    }

    fn deregister(&self, id: usize) {
        self.mutators.lock().unwrap().retain(|m| m.id != id);
    }

    pub fn for_each(&self, mut f: impl FnMut(&MutatorShared)) {
        for shared in self.mutators.lock().unwrap().iter() {
            f(shared);
        }
    }

    pub fn count(&self) -> usize {
        self.mutators.lock().unwrap().len()
    }
}

impl Default for MutatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A thread-local heap context. Not `Sync`; each thread binds its own with
/// [`crate::memory_manager::bind_mutator`].
pub struct Mutator {
    relic: Arc<Relic>,
    shared: Arc<MutatorShared>,
    allocator: BumpAllocator,
    barrier: FieldBarrier,
    frames: Vec<BacktraceFrame>,
}

impl Mutator {
    pub(crate) fn new(relic: Arc<Relic>) -> Self {
        let shared = relic.mutators.register();
        relic.controller.register_mutator();
        let allocator = BumpAllocator::new(relic.space.clone());
        let barrier = FieldBarrier::new(
            relic.state.clone(),
            relic.space.clone(),
            relic.mark_queue.clone(),
        );
        Mutator {
            relic,
            shared,
            allocator,
            barrier,
            frames: Vec::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.shared.id
    }

    /// Safepoint check. Every allocation is a poll point; long-running loops
    /// without allocation must call this themselves.
    pub fn poll(&mut self) {
        if self.relic.controller.stop_requested() {
            // Fresh buffers after the pause keep new allocation out of
            // regions the collector picked for evacuation.
            self.allocator.retire();
            self.barrier.flush();
            self.relic.controller.park();
        }
    }

    /// Allocate an instance of `class`. Blocks for a collection and retries
    /// once if the heap is full.
    pub fn alloc(&mut self, class: ClassId) -> Result<ObjectReference, AllocationError> {
        self.poll();
        let (fields, generation) = self
            .relic
            .classes
            .with_current(class, |g| (g.num_ref_fields, g.generation))
            .ok_or(AllocationError::UnknownClass(class))?;
        let bytes = object_model::size_for_fields(fields as usize);

        let mut attempted_gc = false;
        let start = loop {
            match self.allocator.alloc(bytes) {
                Ok(start) => break start,
                Err(AllocationError::HeapOutOfMemory)
                    if !attempted_gc && self.relic.is_collection_enabled() =>
                {
                    attempted_gc = true;
                    debug!("mutator {} out of memory, blocking for gc", self.shared.id);
                    self.allocator.retire();
                    self.barrier.flush();
                    self.relic.requester.request();
                    self.relic.controller.block_for_gc();
                }
                Err(e) => return Err(e),
            }
        };

        let object = object_model::initialize_header(start, class, generation, fields);
        if self.relic.state.phase() == Phase::Marking {
            // Allocate black: objects born during marking survive the cycle.
            crate::plan::tracing::attempt_mark(&self.relic.space, object);
        }
        self.relic.trigger.on_allocation(bytes);
        self.relic.trigger.poll();
        Ok(object)
    }

    /// Park until the next collection cycle completes. Callers pair this
    /// with [`crate::memory_manager::trigger_full_collection`] when they
    /// need a collection to have happened before continuing.
    pub fn wait_for_collection(&mut self) {
        if !self.relic.is_collection_enabled() {
            return;
        }
        self.allocator.retire();
        self.barrier.flush();
        self.relic.controller.block_for_gc();
    }

    /// Store `value` into reference field `slot` of `target`, through the
    /// barrier.
    pub fn store_reference(
        &mut self,
        target: ObjectReference,
        slot: usize,
        value: Option<ObjectReference>,
    ) -> ObjectReference {
        self.barrier.object_reference_write(target, slot, value)
    }

    /// Load reference field `slot` of `target`, through the barrier.
    pub fn load_reference(
        &mut self,
        target: ObjectReference,
        slot: usize,
    ) -> Option<ObjectReference> {
        self.barrier.object_reference_read(target, slot)
    }

    /// Register `object` as a root of this thread. The collector treats it
    /// as live and keeps the handle pointing at the object's current
    /// location across relocation.
    pub fn add_root(&mut self, object: ObjectReference) -> RootId {
        let object = self.current_location(object);
        self.shared.roots.borrow_mut().add(object)
    }

    pub fn remove_root(&mut self, id: RootId) -> Option<ObjectReference> {
        self.shared.roots.borrow_mut().remove(id)
    }

    pub fn read_root(&self, id: RootId) -> Option<ObjectReference> {
        self.shared
            .roots
            .borrow()
            .get(id)
            .map(|o| self.current_location(o))
    }

    fn current_location(&self, object: ObjectReference) -> ObjectReference {
        if self.relic.state.phase() == Phase::Relocating {
            object_forwarding::resolve(object)
        } else {
            object
        }
    }

    /// Push an interpreter frame for `method` of `class`. Returns false if
    /// the class or method does not exist.
    pub fn push_frame(&mut self, class: ClassId, method: &str) -> bool {
        let version = self
            .relic
            .classes
            .with_current(class, |g| g.method(method).cloned())
            .flatten();
        match version {
            Some(method) => {
                self.frames.push(BacktraceFrame { method, bci: 0 });
                true
            }
            None => false,
        }
    }

    /// Advance the bytecode index of the innermost frame.
    pub fn set_bci(&mut self, bci: u16) {
        if let Some(frame) = self.frames.last_mut() {
            frame.bci = bci;
        }
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Capture the current call stack, innermost frame first. The capture
    /// pins every frame's method version across redefinition.
    pub fn capture_backtrace(&self) -> Arc<Backtrace> {
        let frames = self.frames.iter().rev().cloned().collect();
        self.relic.backtraces.register(frames)
    }
}

impl Drop for Mutator {
    fn drop(&mut self) {
        self.barrier.flush();
        self.allocator.retire();
        self.relic.mutators.deregister(self.shared.id);
        // Deregistration counts as parking: a stop request must not wait for
        // a thread that is going away.
        self.relic.controller.deregister_mutator();
    }
}
