//! The mark worklist and the thread-local buffers feeding it.

use crate::policy::region::RegionSpace;
use crate::util::object_model;
use crate::util::ObjectReference;
use crossbeam::deque::{Injector, Steal};

/// Capacity of a thread-local buffer of gray objects. Chosen so flushes to
/// the shared worklist stay rare without letting termination wait on large
/// private buffers.
pub const MODBUF_SIZE: usize = 8192;

/// An expanding buffer that flushes in batches. Allocation is lazy so idle
/// mutators pay nothing.
pub struct VectorQueue<T> {
    buffer: Vec<T>,
}

impl<T> VectorQueue<T> {
    pub fn new() -> Self {
        VectorQueue { buffer: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= MODBUF_SIZE
    }

    pub fn push(&mut self, value: T) {
        if self.buffer.is_empty() {
            self.buffer.reserve(MODBUF_SIZE);
        }
        self.buffer.push(value);
    }

    pub fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.buffer)
    }
}

impl<T> Default for VectorQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The shared worklist of gray objects, fed by the barrier's buffers and the
/// root scans, drained by the mark workers.
pub struct MarkQueue {
    injector: Injector<ObjectReference>,
}

impl MarkQueue {
    pub fn new() -> Self {
        MarkQueue {
            injector: Injector::new(),
        }
    }

    pub fn push(&self, object: ObjectReference) {
        self.injector.push(object);
    }

    pub fn push_batch(&self, objects: Vec<ObjectReference>) {
        for object in objects {
            self.injector.push(object);
        }
    }

    pub fn pop(&self) -> Option<ObjectReference> {
        loop {
            match self.injector.steal() {
                Steal::Success(object) => return Some(object),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    pub fn steal_into(
        &self,
        dest: &crossbeam::deque::Worker<ObjectReference>,
    ) -> Option<ObjectReference> {
        loop {
            match self.injector.steal_batch_and_pop(dest) {
                Steal::Success(object) => return Some(object),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.injector.is_empty()
    }

    /// Approximate size, used for the escalation check.
    pub fn len(&self) -> usize {
        self.injector.len()
    }
}

impl Default for MarkQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Mark `object`, accounting its size to its region. Returns true if this
/// call newly marked it and its fields still need scanning.
pub fn attempt_mark(space: &RegionSpace, object: ObjectReference) -> bool {
    let region = space.region_of(object);
    if region.mark_table().mark(object) {
        region.add_live_bytes(object_model::size_of(object));
        true
    } else {
        false
    }
}
