//! Per-region liveness bitmap.
//!
//! One bit per heap word, indexed by the in-region offset of an object's start
//! address. The collector marks object starts; iteration walks set bits and
//! reconstructs object references from them.

use crate::util::constants::*;
use crate::util::{Address, ObjectReference};
use std::sync::atomic::{AtomicUsize, Ordering};

const MARK_TABLE_ENTRIES: usize = WORDS_IN_REGION / BITS_IN_WORD;

pub struct MarkTable {
    data: Box<[AtomicUsize]>,
}

impl MarkTable {
    pub fn new() -> Self {
        MarkTable {
            data: (0..MARK_TABLE_ENTRIES).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    pub fn clear(&self) {
        for entry in self.data.iter() {
            entry.store(0, Ordering::Relaxed);
        }
    }

    fn entry_for_address(&self, addr: Address) -> (usize, usize) {
        debug_assert!(!addr.is_zero());
        let bit_index = (addr & REGION_MASK) >> LOG_BYTES_IN_WORD as usize;
        let index = bit_index >> LOG_BITS_IN_WORD;
        let offset = bit_index & (BITS_IN_WORD - 1);
        (index, offset)
    }

    /// Set the mark bit for an object start. Returns true if this call
    /// transitioned the bit from unmarked to marked.
    pub fn mark(&self, object: ObjectReference) -> bool {
        let (index, offset) = self.entry_for_address(object.to_raw_address());
        let mask = 1usize << offset;
        let old_value = self.data[index].fetch_or(mask, Ordering::SeqCst);
        (old_value & mask) == 0
    }

    pub fn is_marked(&self, object: ObjectReference) -> bool {
        let (index, offset) = self.entry_for_address(object.to_raw_address());
        let mask = 1usize << offset;
        (self.data[index].load(Ordering::SeqCst) & mask) != 0
    }

    /// Visit every marked object start between `region_start` and `limit`.
    pub fn iterate<F: FnMut(ObjectReference)>(&self, region_start: Address, limit: Address, mut f: F) {
        debug_assert!(region_start.is_aligned_to(BYTES_IN_REGION));
        for (index, entry) in self.data.iter().enumerate() {
            let mut bits = entry.load(Ordering::Relaxed);
            if bits == 0 {
                continue;
            }
            while bits != 0 {
                let offset = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                let addr = region_start
                    + (((index << LOG_BITS_IN_WORD) + offset) << LOG_BYTES_IN_WORD as usize);
                if addr >= limit {
                    return;
                }
                // We only ever mark valid object starts.
                f(unsafe { ObjectReference::from_raw_address_unchecked(addr) });
            }
        }
    }
}

impl Default for MarkTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MarkTable {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(formatter, "<marktable>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Mark bits are indexed by in-region offset, so any region-aligned base works.
    const BASE: usize = 0x4000_0000;

    fn obj(offset: usize) -> ObjectReference {
        unsafe { ObjectReference::from_raw_address_unchecked(Address::from_usize(BASE + offset)) }
    }

    #[test]
    fn mark_is_first_time_only_once() {
        let table = MarkTable::new();
        assert!(table.mark(obj(64)));
        assert!(!table.mark(obj(64)));
        assert!(table.is_marked(obj(64)));
        assert!(!table.is_marked(obj(72)));
    }

    #[test]
    fn clear_resets_all_bits() {
        let table = MarkTable::new();
        table.mark(obj(0));
        table.mark(obj(BYTES_IN_REGION - BYTES_IN_WORD));
        table.clear();
        assert!(!table.is_marked(obj(0)));
        assert!(!table.is_marked(obj(BYTES_IN_REGION - BYTES_IN_WORD)));
    }

    #[test]
    fn iterate_visits_marks_in_order() {
        let table = MarkTable::new();
        let base = unsafe { Address::from_usize(BASE) };
        table.mark(obj(8));
        table.mark(obj(1024));
        table.mark(obj(1032));
        let mut seen = vec![];
        table.iterate(base, base + BYTES_IN_REGION, |o| {
            seen.push(o.to_raw_address().as_usize() - BASE)
        });
        assert_eq!(seen, vec![8, 1024, 1032]);
    }

    #[test]
    fn iterate_respects_limit() {
        let table = MarkTable::new();
        let base = unsafe { Address::from_usize(BASE) };
        table.mark(obj(8));
        table.mark(obj(2048));
        let mut seen = vec![];
        table.iterate(base, base + 1024, |o| {
            seen.push(o.to_raw_address().as_usize() - BASE)
        });
        assert_eq!(seen, vec![8]);
    }
}
