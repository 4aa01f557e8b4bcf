//! The forwarding-word state machine used during relocation.
//!
//! Objects are word aligned, so the forwarding address and the two forwarding
//! state bits share the object's first header word: the state lives in the low
//! bits and the address in the rest. A zero word means forwarding has not been
//! triggered.

use crate::util::object_model;
use crate::util::{Address, ObjectReference};
use std::sync::atomic::Ordering;

pub const FORWARDING_NOT_TRIGGERED_YET: u8 = 0b00;
pub const BEING_FORWARDED: u8 = 0b10;
pub const FORWARDED: u8 = 0b11;
const FORWARDING_MASK: usize = 0b11;
const FORWARDING_POINTER_MASK: usize = !0b111;

fn forwarding_word(object: ObjectReference) -> &'static std::sync::atomic::AtomicUsize {
    // The forwarding word is always accessed atomically; the region backing
    // the object stays mapped for the life of the heap.
    unsafe { object_model::forwarding_word_address(object).as_atomic() }
}

/// Attempt to become the thread that forwards the object. The winner moves the
/// forwarding bits to `BEING_FORWARDED`, preventing anyone else from forwarding
/// the same object. Returns the state observed before the attempt.
pub fn attempt_to_forward(object: ObjectReference) -> u8 {
    loop {
        let old_word = forwarding_word(object).load(Ordering::SeqCst);
        let old_state = (old_word & FORWARDING_MASK) as u8;
        if old_state != FORWARDING_NOT_TRIGGERED_YET {
            return old_state;
        }
        if forwarding_word(object)
            .compare_exchange(
                old_word,
                old_word | (BEING_FORWARDED as usize),
                Ordering::SeqCst,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            return old_state;
        }
    }
}

/// Spin-wait for the object's forwarding to become complete, then read the
/// forwarding pointer.
///
/// Arguments:
/// * `object`: the forwarded/being_forwarded object.
/// * `forwarding_bits`: the last state observed before calling this function.
pub fn spin_and_get_forwarded_object(
    object: ObjectReference,
    forwarding_bits: u8,
) -> ObjectReference {
    let mut forwarding_bits = forwarding_bits;
    while forwarding_bits == BEING_FORWARDED {
        std::hint::spin_loop();
        forwarding_bits = get_forwarding_status(object);
    }

    if forwarding_bits == FORWARDED {
        read_forwarding_pointer(object)
    } else {
        debug_assert!(
            forwarding_bits == FORWARDING_NOT_TRIGGERED_YET,
            "invalid forwarding state {:#x} for object {}",
            forwarding_bits,
            object,
        );
        object
    }
}

/// Copy the object to `to` and publish the forwarding pointer. The caller must
/// have won `attempt_to_forward` for this object.
pub fn forward_object(object: ObjectReference, to: Address) -> ObjectReference {
    debug_assert!(is_being_forwarded(object));
    let new_object = object_model::copy_object(object, to);
    trace!("forward {} -> {}", object, new_object);
    // A single store publishes both the pointer and the FORWARDED state.
    forwarding_word(object).store(
        new_object.to_raw_address().as_usize() | (FORWARDED as usize),
        Ordering::SeqCst,
    );
    new_object
}

/// Return the forwarding bits of an object.
pub fn get_forwarding_status(object: ObjectReference) -> u8 {
    (forwarding_word(object).load(Ordering::SeqCst) & FORWARDING_MASK) as u8
}

pub fn is_forwarded(object: ObjectReference) -> bool {
    get_forwarding_status(object) == FORWARDED
}

fn is_being_forwarded(object: ObjectReference) -> bool {
    get_forwarding_status(object) == BEING_FORWARDED
}

pub fn state_is_forwarded_or_being_forwarded(forwarding_bits: u8) -> bool {
    forwarding_bits != FORWARDING_NOT_TRIGGERED_YET
}

/// Read the forwarding pointer of a forwarded object.
pub fn read_forwarding_pointer(object: ObjectReference) -> ObjectReference {
    debug_assert!(
        is_forwarded(object),
        "read_forwarding_pointer called for object {} that is not forwarded (state {:#x})",
        object,
        get_forwarding_status(object),
    );

    // We wrote the forwarding pointer ourselves; it is a valid object address.
    unsafe {
        ObjectReference::from_raw_address_unchecked(Address::from_usize(
            forwarding_word(object).load(Ordering::SeqCst) & FORWARDING_POINTER_MASK,
        ))
    }
}

/// Resolve an object reference through its forwarding word. Returns the
/// current location of the object, spinning while a copy is in flight.
pub fn resolve(object: ObjectReference) -> ObjectReference {
    let bits = get_forwarding_status(object);
    if state_is_forwarded_or_being_forwarded(bits) {
        spin_and_get_forwarded_object(object, bits)
    } else {
        object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::klass::metadata::ClassId;
    use crate::util::object_model::initialize_header;

    #[test]
    fn forward_and_resolve() {
        let from = vec![0usize; 8];
        let to = vec![0usize; 8];
        let obj = initialize_header(Address::from_ptr(from.as_ptr()), ClassId(1), 0, 2);
        object_model::write_field(obj, 0, Some(obj));

        assert_eq!(attempt_to_forward(obj), FORWARDING_NOT_TRIGGERED_YET);
        // Losers observe the in-flight state.
        assert_eq!(attempt_to_forward(obj), BEING_FORWARDED);

        let new_obj = forward_object(obj, Address::from_ptr(to.as_ptr()));
        assert!(is_forwarded(obj));
        assert_eq!(read_forwarding_pointer(obj), new_obj);
        assert_eq!(resolve(obj), new_obj);
        assert_eq!(resolve(new_obj), new_obj);
        // The copy carries the payload but not the forwarding state.
        assert_eq!(object_model::read_field(new_obj, 0), Some(obj));
        assert_eq!(get_forwarding_status(new_obj), FORWARDING_NOT_TRIGGERED_YET);
    }
}
