//! Read and write barriers.

use crate::global_state::{GlobalState, Phase};
use crate::plan::tracing::{self, MarkQueue, VectorQueue};
use crate::policy::region::RegionSpace;
use crate::util::{object_forwarding, object_model, ObjectReference};
use std::sync::Arc;

/// A barrier is a piece of code executed for every heap access of a mutator.
/// Both the insertion marking during concurrent mark and the forwarding help
/// during concurrent relocation live behind this trait.
pub trait Barrier: Send {
    /// Store `value` into reference field `slot` of `target`. Returns the
    /// current location of `target`, which may differ from the argument if
    /// the store helped relocate it.
    fn object_reference_write(
        &mut self,
        target: ObjectReference,
        slot: usize,
        value: Option<ObjectReference>,
    ) -> ObjectReference;

    /// Load reference field `slot` of `target`. The result is resolved to
    /// the object's current location.
    fn object_reference_read(
        &mut self,
        target: ObjectReference,
        slot: usize,
    ) -> Option<ObjectReference>;

    /// Hand any privately buffered gray objects to the shared worklist.
    /// Called when the mutator parks for a pause.
    fn flush(&mut self);
}

/// The field barrier of the concurrent collector.
///
/// During marking it is a Dijkstra-style insertion barrier: the stored value
/// is marked before the store returns, so a reference can never be hidden in
/// a black object. During relocation it helps forward: a store to an object
/// in a relocation candidate first ensures the object has been copied and
/// then writes to the copy, closing the race between copying and mutation.
pub struct FieldBarrier {
    state: Arc<GlobalState>,
    space: Arc<RegionSpace>,
    queue: Arc<MarkQueue>,
    modbuf: VectorQueue<ObjectReference>,
}

impl FieldBarrier {
    pub fn new(state: Arc<GlobalState>, space: Arc<RegionSpace>, queue: Arc<MarkQueue>) -> Self {
        FieldBarrier {
            state,
            space,
            queue,
            modbuf: VectorQueue::new(),
        }
    }

    /// Dijkstra insertion: mark the stored value and queue it for scanning.
    /// The mark bit is set before the store returns to the mutator.
    fn enqueue_value(&mut self, value: ObjectReference) {
        if tracing::attempt_mark(&self.space, value) {
            self.modbuf.push(value);
            if self.modbuf.is_full() {
                self.queue.push_batch(self.modbuf.take());
            }
        }
    }

    /// The current location of `object`, copying it out of a candidate
    /// region first if nobody has yet.
    fn ensure_forwarded(&self, object: ObjectReference) -> ObjectReference {
        if !self.space.region_of(object).is_relocate() {
            return object;
        }
        let state = object_forwarding::attempt_to_forward(object);
        if object_forwarding::state_is_forwarded_or_being_forwarded(state) {
            return object_forwarding::spin_and_get_forwarded_object(object, state);
        }
        // This thread won the right to copy.
        let bytes = object_model::size_of(object);
        let to = self
            .space
            .alloc_for_copy(bytes)
            .unwrap_or_else(|| panic!("heap exhausted while relocating {}", object));
        let new_object = object_forwarding::forward_object(object, to);
        tracing::attempt_mark(&self.space, new_object);
        new_object
    }
}

impl Barrier for FieldBarrier {
    fn object_reference_write(
        &mut self,
        target: ObjectReference,
        slot: usize,
        value: Option<ObjectReference>,
    ) -> ObjectReference {
        match self.state.phase() {
            Phase::Idle => {
                object_model::write_field(target, slot, value);
                target
            }
            Phase::Marking => {
                object_model::write_field(target, slot, value);
                if let Some(value) = value {
                    self.enqueue_value(value);
                }
                target
            }
            Phase::Relocating => {
                let target = self.ensure_forwarded(target);
                let value = value.map(|v| self.ensure_forwarded(v));
                object_model::write_field(target, slot, value);
                target
            }
        }
    }

    fn object_reference_read(
        &mut self,
        target: ObjectReference,
        slot: usize,
    ) -> Option<ObjectReference> {
        if self.state.phase() == Phase::Relocating {
            let target = self.ensure_forwarded(target);
            return object_model::read_field(target, slot).map(|v| self.ensure_forwarded(v));
        }
        object_model::read_field(target, slot)
    }

    fn flush(&mut self) {
        if !self.modbuf.is_empty() {
            self.queue.push_batch(self.modbuf.take());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::klass::metadata::ClassId;
    use crate::util::constants::*;
    use crate::util::object_model::initialize_header;

    fn setup() -> (Arc<GlobalState>, Arc<RegionSpace>, Arc<MarkQueue>, FieldBarrier) {
        let state = Arc::new(GlobalState::new());
        let space = Arc::new(RegionSpace::new(8 * BYTES_IN_REGION));
        let queue = Arc::new(MarkQueue::new());
        let barrier = FieldBarrier::new(state.clone(), space.clone(), queue.clone());
        (state, space, queue, barrier)
    }

    fn alloc(space: &RegionSpace, fields: usize) -> ObjectReference {
        let bytes = object_model::size_for_fields(fields);
        let (start, _) = space.acquire_buffer(bytes).unwrap();
        initialize_header(start, ClassId(1), 0, fields as u16)
    }

    #[test]
    fn idle_stores_pass_through() {
        let (_, space, queue, mut barrier) = setup();
        let a = alloc(&space, 2);
        let b = alloc(&space, 0);
        let target = barrier.object_reference_write(a, 0, Some(b));
        assert_eq!(target, a);
        assert_eq!(barrier.object_reference_read(a, 0), Some(b));
        assert!(queue.is_empty());
        assert!(!space.region_of(b).mark_table().is_marked(b));
    }

    #[test]
    fn marking_stores_mark_the_value() {
        let (state, space, _, mut barrier) = setup();
        state.set_phase(Phase::Marking);
        let a = alloc(&space, 2);
        let b = alloc(&space, 0);
        barrier.object_reference_write(a, 0, Some(b));
        assert!(space.region_of(b).mark_table().is_marked(b));
        // The modbuf holds it until a flush.
        barrier.flush();
    }

    #[test]
    fn flush_publishes_buffered_values() {
        let (state, space, queue, mut barrier) = setup();
        state.set_phase(Phase::Marking);
        let a = alloc(&space, 2);
        let b = alloc(&space, 0);
        barrier.object_reference_write(a, 0, Some(b));
        assert!(queue.is_empty());
        barrier.flush();
        assert_eq!(queue.pop(), Some(b));
    }

    #[test]
    fn relocating_stores_forward_the_target() {
        let (state, space, _, mut barrier) = setup();
        let a = alloc(&space, 1);
        let b = alloc(&space, 0);
        state.set_phase(Phase::Relocating);
        let source = space.region_index(a.to_raw_address());
        space.region(source).set_relocate(true);

        let new_a = barrier.object_reference_write(a, 0, Some(b));
        assert_ne!(new_a, a);
        assert!(object_forwarding::is_forwarded(a));
        assert_eq!(object_forwarding::resolve(a), new_a);
        // The store landed in the copy. Read b's location through the
        // barrier since b sits in the same candidate region.
        assert_eq!(
            barrier.object_reference_read(new_a, 0),
            Some(object_forwarding::resolve(b))
        );
    }

    #[test]
    fn relocating_stores_forward_the_value_too() {
        let (state, space, _, mut barrier) = setup();
        let a = alloc(&space, 1);
        // Put the value in its own region so only it is a candidate.
        let value_region = space.acquire_region().unwrap();
        let (start, _) = space.region(value_region).allocate(64).unwrap();
        let b = initialize_header(start, ClassId(2), 0, 0);

        state.set_phase(Phase::Relocating);
        space.region(value_region).set_relocate(true);

        barrier.object_reference_write(a, 0, Some(b));
        assert!(object_forwarding::is_forwarded(b));
        assert_eq!(
            object_model::read_field(a, 0),
            Some(object_forwarding::resolve(b))
        );
    }
}
