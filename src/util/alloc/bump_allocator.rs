//! Bump-pointer allocation out of thread-local buffers.

use super::AllocationError;
use crate::policy::region::RegionSpace;
use crate::util::constants::*;
use crate::util::Address;
use std::sync::Arc;

/// A bump pointer over a thread-local allocation buffer. An empty pair of
/// zero addresses means no buffer; the first allocation takes the slow path.
#[derive(Copy, Clone, Debug)]
pub struct BumpPointer {
    pub cursor: Address,
    pub limit: Address,
}

impl BumpPointer {
    pub const EMPTY: BumpPointer = BumpPointer {
        cursor: Address::ZERO,
        limit: Address::ZERO,
    };

    /// Fast path: bump the cursor if the buffer has room.
    pub fn alloc(&mut self, bytes: usize) -> Option<Address> {
        let new_cursor = self.cursor + bytes;
        if new_cursor > self.limit {
            return None;
        }
        let result = self.cursor;
        self.cursor = new_cursor;
        Some(result)
    }

    pub fn reset(&mut self, cursor: Address, limit: Address) {
        self.cursor = cursor;
        self.limit = limit;
    }

    /// Drop the buffer. Unused space between cursor and limit stays dead
    /// until the owning region is collected.
    pub fn retire(&mut self) {
        *self = BumpPointer::EMPTY;
    }
}

impl Default for BumpPointer {
    fn default() -> Self {
        BumpPointer::EMPTY
    }
}

/// The mutator-side allocator: a [`BumpPointer`] refilled from the region
/// space in buffer-sized chunks. Out-of-memory handling (blocking for a
/// collection and retrying) is the caller's job; a `HeapOutOfMemory` here
/// only means the free list is empty right now.
pub struct BumpAllocator {
    pub bump: BumpPointer,
    space: Arc<RegionSpace>,
}

impl BumpAllocator {
    pub fn new(space: Arc<RegionSpace>) -> Self {
        BumpAllocator {
            bump: BumpPointer::EMPTY,
            space,
        }
    }

    pub fn alloc(&mut self, bytes: usize) -> Result<Address, AllocationError> {
        debug_assert!(bytes % BYTES_IN_WORD == 0);
        if bytes > MAX_OBJECT_BYTES {
            return Err(AllocationError::OversizedObject);
        }
        if let Some(addr) = self.bump.alloc(bytes) {
            return Ok(addr);
        }
        self.alloc_slow(bytes)
    }

    fn alloc_slow(&mut self, bytes: usize) -> Result<Address, AllocationError> {
        trace!("thread-local buffer exhausted, refilling");
        loop {
            let (cursor, limit) = self
                .space
                .acquire_buffer(usize::max(BYTES_IN_TLAB, bytes))
                .ok_or(AllocationError::HeapOutOfMemory)?;
            self.bump.reset(cursor, limit);
            if let Some(addr) = self.bump.alloc(bytes) {
                return Ok(addr);
            }
            // The buffer was a shrunken region tail too small for the
            // request; retire it and try again.
            self.bump.retire();
        }
    }

    pub fn retire(&mut self) {
        self.bump.retire();
    }
}
