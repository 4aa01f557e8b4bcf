//! Side metadata for one heap region.

use super::marktable::MarkTable;
use crate::util::constants::*;
use crate::util::Address;
use atomic::{Atomic, Ordering};
use std::sync::atomic::{AtomicBool, AtomicUsize};

/// Coarse lifecycle state of a region. Transitions happen either under the
/// free-list pop (Free -> Allocating) or inside a pause (back to Free).
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::NoUninit)]
#[repr(u8)]
pub enum RegionState {
    /// On the free list, contents are dead.
    Free,
    /// Handed out for mutator or copy allocation.
    Allocating,
}

/// Per-region metadata, held in a side table owned by
/// [`crate::policy::region::RegionSpace`]. The region payload itself is
/// raw heap memory; everything the collector needs to know about it lives
/// here.
pub struct Region {
    start: Address,
    state: Atomic<RegionState>,
    /// Bump cursor for carving allocation buffers out of this region.
    cursor: AtomicUsize,
    /// Bytes of objects marked live in the current cycle.
    live_bytes: AtomicUsize,
    /// Set during the final-mark pause for relocation candidates.
    relocate: AtomicBool,
    /// Set while the region receives evacuated copies; such a region never
    /// serves mutator allocation buffers.
    copy: AtomicBool,
    mark_table: MarkTable,
}

impl Region {
    pub fn new(start: Address) -> Self {
        debug_assert!(start.is_aligned_to(BYTES_IN_REGION));
        Region {
            start,
            state: Atomic::new(RegionState::Free),
            cursor: AtomicUsize::new(start.as_usize()),
            live_bytes: AtomicUsize::new(0),
            relocate: AtomicBool::new(false),
            copy: AtomicBool::new(false),
            mark_table: MarkTable::new(),
        }
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.start + BYTES_IN_REGION
    }

    pub fn state(&self) -> RegionState {
        self.state.load(Ordering::SeqCst)
    }

    pub fn set_state(&self, state: RegionState) {
        self.state.store(state, Ordering::SeqCst);
    }

    pub fn mark_table(&self) -> &MarkTable {
        &self.mark_table
    }

    /// The high-water mark of allocation in this region. Objects only ever
    /// exist below the cursor.
    pub fn cursor(&self) -> Address {
        unsafe { Address::from_usize(self.cursor.load(Ordering::SeqCst)) }
    }

    pub fn used_bytes(&self) -> usize {
        self.cursor() - self.start
    }

    /// Carve `bytes` out of this region with a CAS loop. Returns the start and
    /// end of the carved buffer; the final buffer of a region may be shorter
    /// than requested. Returns `None` once the region is exhausted.
    pub fn allocate(&self, bytes: usize) -> Option<(Address, Address)> {
        debug_assert!(bytes > 0);
        let end = self.end().as_usize();
        let mut old = self.cursor.load(Ordering::SeqCst);
        loop {
            if old >= end {
                return None;
            }
            let new = usize::min(old + bytes, end);
            match self
                .cursor
                .compare_exchange(old, new, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    return Some(unsafe { (Address::from_usize(old), Address::from_usize(new)) })
                }
                Err(current) => old = current,
            }
        }
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::SeqCst)
    }

    pub fn add_live_bytes(&self, bytes: usize) {
        self.live_bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn clear_live_bytes(&self) {
        self.live_bytes.store(0, Ordering::SeqCst);
    }

    pub fn is_relocate(&self) -> bool {
        self.relocate.load(Ordering::SeqCst)
    }

    pub fn set_relocate(&self, relocate: bool) {
        self.relocate.store(relocate, Ordering::SeqCst);
    }

    pub fn is_copy(&self) -> bool {
        self.copy.load(Ordering::SeqCst)
    }

    pub fn set_copy(&self, copy: bool) {
        self.copy.store(copy, Ordering::SeqCst);
    }

    /// Return the region to its pristine state before it goes back on the
    /// free list. Only called inside a pause or with the region unreachable.
    pub fn reset(&self) {
        self.cursor.store(self.start.as_usize(), Ordering::SeqCst);
        self.live_bytes.store(0, Ordering::SeqCst);
        self.relocate.store(false, Ordering::SeqCst);
        self.copy.store(false, Ordering::SeqCst);
        self.mark_table.clear();
        self.state.store(RegionState::Free, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Region({:?}, {:?}, used={}, live={}{})",
            self.start,
            self.state(),
            self.used_bytes(),
            self.live_bytes(),
            if self.is_relocate() { ", relocate" } else { "" }
        )
    }
}
