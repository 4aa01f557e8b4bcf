//! Object header layout.
//!
//! Every heap object starts with a three word header:
//!
//! ```text
//! word 0: forwarding word   (2 state bits in the low bits, forwarding address in the rest)
//! word 1: type word         (class id | class generation | reference field count)
//! word 2: lock word         (reserved for the embedding runtime, zeroed at allocation)
//! ```
//!
//! The reference fields follow the header as word slots. A zero slot is a null
//! reference. The type word carries everything the collector needs to size and
//! scan an object, so tracing never consults the class table.

use crate::klass::metadata::ClassId;
use crate::util::constants::*;
use crate::util::conversions::words_to_bytes;
use crate::util::{Address, ObjectReference};
use std::sync::atomic::Ordering;

/// The number of header words.
pub const HEADER_WORDS: usize = 3;
/// The header size in bytes.
pub const HEADER_BYTES: usize = words_to_bytes(HEADER_WORDS);

const FORWARDING_OFFSET: usize = 0;
const TYPE_OFFSET: usize = BYTES_IN_WORD;
const LOCK_OFFSET: usize = 2 * BYTES_IN_WORD;

const NUM_FIELDS_SHIFT: usize = 0;
const GENERATION_SHIFT: usize = 16;
const CLASS_ID_SHIFT: usize = 32;

// The type word packs class id (32 bits), generation (16 bits) and field count
// (16 bits) into one word.
static_assertions::const_assert!(BYTES_IN_WORD == 8);

/// The address of the forwarding word of an object.
pub fn forwarding_word_address(object: ObjectReference) -> Address {
    object.to_raw_address() + FORWARDING_OFFSET
}

/// Write the header of a freshly allocated object. The forwarding and lock
/// words are zeroed; the type word is encoded from the class identity.
pub fn initialize_header(
    start: Address,
    class: ClassId,
    generation: u16,
    num_ref_fields: u16,
) -> ObjectReference {
    let type_word = ((class.0 as usize) << CLASS_ID_SHIFT)
        | ((generation as usize) << GENERATION_SHIFT)
        | ((num_ref_fields as usize) << NUM_FIELDS_SHIFT);
    unsafe {
        (start + FORWARDING_OFFSET).atomic_store(0, Ordering::Relaxed);
        (start + TYPE_OFFSET).atomic_store(type_word, Ordering::Relaxed);
        (start + LOCK_OFFSET).atomic_store(0, Ordering::Relaxed);
        // Publish the header before the reference escapes to other threads.
        std::sync::atomic::fence(Ordering::Release);
        ObjectReference::from_raw_address_unchecked(start)
    }
}

fn type_word(object: ObjectReference) -> usize {
    unsafe { (object.to_raw_address() + TYPE_OFFSET).atomic_load(Ordering::Relaxed) }
}

/// The class this object is an instance of.
pub fn class_of(object: ObjectReference) -> ClassId {
    ClassId((type_word(object) >> CLASS_ID_SHIFT) as u32)
}

/// The class generation the object was allocated against.
pub fn generation_of(object: ObjectReference) -> u16 {
    (type_word(object) >> GENERATION_SHIFT) as u16
}

/// The number of reference fields of the object.
pub fn num_ref_fields(object: ObjectReference) -> usize {
    (type_word(object) as u16) as usize
}

/// The total size of the object in bytes, header included.
pub fn size_of(object: ObjectReference) -> usize {
    words_to_bytes(HEADER_WORDS + num_ref_fields(object))
}

/// The size in bytes of an object with the given field count.
pub const fn size_for_fields(num_ref_fields: usize) -> usize {
    words_to_bytes(HEADER_WORDS + num_ref_fields)
}

/// The address of a reference field slot.
pub fn field_slot(object: ObjectReference, index: usize) -> Address {
    debug_assert!(
        index < num_ref_fields(object),
        "field index {} out of bounds for object {} with {} fields",
        index,
        object,
        num_ref_fields(object)
    );
    object.to_raw_address() + HEADER_BYTES + words_to_bytes(index)
}

/// Atomically read a reference field. This is the raw slot access; forwarding
/// resolution and barrier work happen in `plan::barriers`.
pub fn read_field(object: ObjectReference, index: usize) -> Option<ObjectReference> {
    let raw = unsafe { field_slot(object, index).atomic_load(Ordering::SeqCst) };
    ObjectReference::from_raw_address(unsafe { Address::from_usize(raw) })
}

/// Atomically write a reference field. See [`read_field`].
pub fn write_field(object: ObjectReference, index: usize, value: Option<ObjectReference>) {
    let raw = value.map_or(0, |v| v.to_raw_address().as_usize());
    unsafe { field_slot(object, index).atomic_store(raw, Ordering::SeqCst) }
}

/// Copy the full object (header and fields) to `to`. Only called by the
/// forwarding machinery while the source object is in the `BeingForwarded`
/// state, which keeps mutator stores off the old copy.
pub fn copy_object(object: ObjectReference, to: Address) -> ObjectReference {
    let bytes = size_of(object);
    let from = object.to_raw_address();
    let mut offset = 0;
    while offset < bytes {
        unsafe {
            let word = (from + offset).atomic_load(Ordering::Relaxed);
            (to + offset).atomic_store(word, Ordering::Relaxed);
        }
        offset += BYTES_IN_WORD;
    }
    // The new copy must never carry a stale forwarding state.
    unsafe {
        (to + FORWARDING_OFFSET).atomic_store(0, Ordering::Relaxed);
        std::sync::atomic::fence(Ordering::Release);
        ObjectReference::from_raw_address_unchecked(to)
    }
}
