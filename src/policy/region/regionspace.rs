//! The heap itself: one contiguous region-aligned mapping carved into
//! fixed-size regions, plus the side table of [`Region`] metadata and the
//! lock-free free list.

use super::region::{Region, RegionState};
use crate::util::constants::*;
use crate::util::conversions;
use crate::util::{Address, ObjectReference};
use crossbeam::queue::SegQueue;
use std::alloc::{self, Layout};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Owns the raw heap mapping. Kept separate from the region table so that
/// dropping the space releases the memory exactly once.
struct HeapMap {
    base: Address,
    layout: Layout,
}

// The mapping is plain memory; all access goes through atomics.
unsafe impl Send for HeapMap {}
unsafe impl Sync for HeapMap {}

impl HeapMap {
    fn new(bytes: usize) -> Self {
        debug_assert!(conversions::raw_is_aligned(bytes, BYTES_IN_REGION));
        let layout = Layout::from_size_align(bytes, BYTES_IN_REGION)
            .expect("heap size overflows the address space");
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            alloc::handle_alloc_error(layout);
        }
        HeapMap {
            base: Address::from_mut_ptr(ptr),
            layout,
        }
    }
}

impl Drop for HeapMap {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.base.to_mut_ptr(), self.layout) };
    }
}

/// Where evacuated copies go. The reserve is stocked during candidate
/// selection with enough regions for every candidate's live bytes, so a
/// cycle's copy allocation can never fail. Shared by GC workers and by
/// mutators helping to forward on the write path.
#[derive(Default)]
struct CopyState {
    /// The region copies currently bump into.
    current: Option<usize>,
    /// Regions set aside for this cycle's copies, not yet touched.
    reserve: Vec<usize>,
    /// Every region that served as a copy target this cycle.
    used: Vec<usize>,
}

pub struct RegionSpace {
    map: HeapMap,
    regions: Box<[Region]>,
    free: SegQueue<usize>,
    regions_in_use: AtomicUsize,
    copy: Mutex<CopyState>,
}

/// The copy bytes one reserved region is guaranteed to hold: a region is
/// only abandoned when its tail cannot fit the next copy, and no object
/// exceeds `MAX_OBJECT_BYTES`.
const COPY_BYTES_PER_REGION: usize = BYTES_IN_REGION - MAX_OBJECT_BYTES;

impl RegionSpace {
    pub fn new(heap_bytes: usize) -> Self {
        let heap_bytes = conversions::raw_align_up(heap_bytes, BYTES_IN_REGION);
        let map = HeapMap::new(heap_bytes);
        let count = heap_bytes >> LOG_BYTES_IN_REGION;
        let regions: Box<[Region]> = (0..count)
            .map(|i| Region::new(map.base + (i << LOG_BYTES_IN_REGION)))
            .collect();
        let free = SegQueue::new();
        for i in 0..count {
            free.push(i);
        }
        debug!(
            "heap mapped at {} ({} regions of {})",
            map.base,
            count,
            conversions::bytes_to_formatted_string(BYTES_IN_REGION)
        );
        RegionSpace {
            map,
            regions,
            free,
            regions_in_use: AtomicUsize::new(0),
            copy: Mutex::default(),
        }
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn regions_in_use(&self) -> usize {
        self.regions_in_use.load(Ordering::SeqCst)
    }

    pub fn heap_bytes(&self) -> usize {
        self.regions.len() << LOG_BYTES_IN_REGION
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.map.base && addr < self.map.base + self.heap_bytes()
    }

    pub fn region_index(&self, addr: Address) -> usize {
        debug_assert!(self.contains(addr));
        (addr - self.map.base) >> LOG_BYTES_IN_REGION
    }

    pub fn region(&self, index: usize) -> &Region {
        &self.regions[index]
    }

    pub fn region_of(&self, object: ObjectReference) -> &Region {
        &self.regions[self.region_index(object.to_raw_address())]
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// Take a region off the free list for allocation. Returns its index, or
    /// `None` if the heap is exhausted.
    pub fn acquire_region(&self) -> Option<usize> {
        let index = self.free.pop()?;
        let region = &self.regions[index];
        debug_assert_eq!(region.state(), RegionState::Free);
        region.set_state(RegionState::Allocating);
        self.regions_in_use.fetch_add(1, Ordering::SeqCst);
        trace!("acquired region {} ({})", index, region.start());
        Some(index)
    }

    /// Reset a region and put it back on the free list. The caller guarantees
    /// no live object remains in it.
    pub fn release_region(&self, index: usize) {
        let region = &self.regions[index];
        debug_assert_eq!(region.state(), RegionState::Allocating);
        region.reset();
        self.regions_in_use.fetch_sub(1, Ordering::SeqCst);
        self.free.push(index);
        trace!("released region {}", index);
    }

    /// Carve an allocation buffer of up to `bytes` out of the current
    /// allocation regions, acquiring a fresh region when the current ones are
    /// exhausted. Candidate regions never receive new allocation.
    pub fn acquire_buffer(&self, bytes: usize) -> Option<(Address, Address)> {
        debug_assert!(bytes <= BYTES_IN_REGION);
        // Try to top up from a region already in use before taking a new one.
        for region in self.regions.iter() {
            if region.state() == RegionState::Allocating
                && !region.is_relocate()
                && !region.is_copy()
            {
                if let Some(buffer) = region.allocate(bytes) {
                    return Some(buffer);
                }
            }
        }
        let index = self.acquire_region()?;
        self.regions[index].allocate(bytes)
    }

    /// Reset all mark state at the start of a cycle.
    pub fn prepare_mark(&self) {
        for region in self.regions.iter() {
            if region.state() == RegionState::Allocating {
                region.clear_live_bytes();
                region.mark_table().clear();
            }
        }
    }

    /// Pick relocation candidates: in-use regions whose live ratio fell below
    /// `threshold`, sparsest first, capped by the free headroom available to
    /// receive their copies. The copy regions the selection needs are taken
    /// off the free list here, so neither mutator allocation nor a racing
    /// cycle can leave evacuation short. Must run inside a pause; sets the
    /// relocate flag so the barrier observes it before any mutator resumes.
    pub fn select_candidates(&self, threshold: f32) -> Vec<usize> {
        use itertools::Itertools;
        let headroom = self.free.len() * COPY_BYTES_PER_REGION;
        let sorted = self
            .regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.state() == RegionState::Allocating && r.used_bytes() > 0)
            .filter(|(_, r)| (r.live_bytes() as f32) < threshold * BYTES_IN_REGION as f32)
            .sorted_by_key(|(_, r)| r.live_bytes());
        let mut candidates = Vec::new();
        let mut copy_bytes = 0;
        for (index, region) in sorted {
            if copy_bytes + region.live_bytes() > headroom {
                break;
            }
            copy_bytes += region.live_bytes();
            candidates.push(index);
        }
        for &index in &candidates {
            self.regions[index].set_relocate(true);
        }
        self.reserve_copy_regions(copy_bytes);
        debug!(
            "selected {} of {} in-use regions for relocation ({} live bytes to copy)",
            candidates.len(),
            self.regions_in_use(),
            copy_bytes
        );
        candidates
    }

    /// Stock the copy reserve with enough regions for `copy_bytes` of
    /// evacuated copies. The headroom cap in [`Self::select_candidates`]
    /// guarantees the free list can cover this.
    fn reserve_copy_regions(&self, copy_bytes: usize) {
        let needed = copy_bytes.div_ceil(COPY_BYTES_PER_REGION);
        let mut copy = self.copy.lock().unwrap();
        debug_assert!(copy.current.is_none() && copy.reserve.is_empty());
        for _ in 0..needed {
            let index = self
                .acquire_region()
                .unwrap_or_else(|| panic!("free list shrank during candidate selection"));
            self.regions[index].set_copy(true);
            copy.reserve.push(index);
        }
    }

    /// Allocate space for an evacuated copy, drawing fresh regions from the
    /// cycle's reserve. Copy allocation is rare enough that a mutex around
    /// the copy state does not matter.
    pub fn alloc_for_copy(&self, bytes: usize) -> Option<Address> {
        debug_assert!(bytes <= MAX_OBJECT_BYTES);
        let mut copy = self.copy.lock().unwrap();
        if let Some(index) = copy.current {
            if let Some((start, end)) = self.regions[index].allocate(bytes) {
                if end - start == bytes {
                    return Some(start);
                }
                // A shrunken tail cannot hold the copy; leave it dead and
                // move to a fresh region.
            }
        }
        let index = match copy.reserve.pop() {
            Some(index) => index,
            None => {
                // Forwarding outside a reserved cycle falls back to the
                // free list directly.
                let index = self.acquire_region()?;
                self.regions[index].set_copy(true);
                index
            }
        };
        copy.used.push(index);
        copy.current = Some(index);
        let (start, end) = self.regions[index].allocate(bytes)?;
        debug_assert_eq!(end - start, bytes);
        Some(start)
    }

    /// Close out the cycle's copy state: open filled copy regions up to
    /// mutator allocation and return untouched reserve regions to the free
    /// list.
    pub fn retire_copy_cursor(&self) {
        let mut copy = self.copy.lock().unwrap();
        for index in copy.used.drain(..) {
            self.regions[index].set_copy(false);
        }
        for index in copy.reserve.drain(..) {
            self.release_region(index);
        }
        copy.current = None;
    }

    pub fn live_bytes(&self) -> usize {
        self.regions.iter().map(|r| r.live_bytes()).sum()
    }

    pub fn used_bytes(&self) -> usize {
        self.regions.iter().map(|r| r.used_bytes()).sum()
    }
}

impl std::fmt::Debug for RegionSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "RegionSpace({} regions, {} in use)",
            self.region_count(),
            self.regions_in_use()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> RegionSpace {
        RegionSpace::new(8 * BYTES_IN_REGION)
    }

    #[test]
    fn new_space_is_all_free() {
        let space = space();
        assert_eq!(space.region_count(), 8);
        assert_eq!(space.regions_in_use(), 0);
        assert!(space.contains(space.region(0).start()));
    }

    #[test]
    fn acquire_and_release_round_trip() {
        let space = space();
        let index = space.acquire_region().unwrap();
        assert_eq!(space.regions_in_use(), 1);
        assert_eq!(space.region(index).state(), RegionState::Allocating);
        space.release_region(index);
        assert_eq!(space.regions_in_use(), 0);
    }

    #[test]
    fn exhausting_the_heap_returns_none() {
        let space = space();
        let acquired: Vec<_> = std::iter::from_fn(|| space.acquire_region()).collect();
        assert_eq!(acquired.len(), 8);
        assert!(space.acquire_region().is_none());
        for index in acquired {
            space.release_region(index);
        }
        assert!(space.acquire_region().is_some());
    }

    #[test]
    fn region_of_maps_addresses_back() {
        let space = space();
        let index = space.acquire_region().unwrap();
        let region = space.region(index);
        let (start, _) = region.allocate(256).unwrap();
        assert_eq!(space.region_index(start), index);
        assert_eq!(space.region_index(start + 255), index);
    }

    #[test]
    fn candidates_exclude_dense_regions() {
        let space = space();
        let sparse = space.acquire_region().unwrap();
        let dense = space.acquire_region().unwrap();
        for index in [sparse, dense] {
            space.region(index).allocate(BYTES_IN_REGION / 2).unwrap();
        }
        space.region(dense).add_live_bytes(BYTES_IN_REGION / 2);
        let candidates = space.select_candidates(0.5);
        assert_eq!(candidates, vec![sparse]);
        assert!(space.region(sparse).is_relocate());
        assert!(!space.region(dense).is_relocate());
    }

    #[test]
    fn alloc_for_copy_carves_fresh_regions() {
        let space = space();
        let a = space.alloc_for_copy(64).unwrap();
        let b = space.alloc_for_copy(64).unwrap();
        assert_eq!(b - a, 64);
        assert_eq!(space.regions_in_use(), 1);
    }

    #[test]
    fn candidates_are_capped_by_free_headroom() {
        let space = space();
        let acquired: Vec<_> = std::iter::from_fn(|| space.acquire_region()).collect();
        assert_eq!(acquired.len(), 8);

        // One sparse region with live data, one with only garbage.
        let live = acquired[0];
        space.region(live).allocate(BYTES_IN_REGION / 2).unwrap();
        space.region(live).add_live_bytes(1024);
        let dead = acquired[1];
        space.region(dead).allocate(BYTES_IN_REGION / 2).unwrap();

        // With no free region to copy into, only the fully dead region may
        // be evacuated.
        let candidates = space.select_candidates(0.5);
        assert_eq!(candidates, vec![dead]);
        assert!(!space.region(live).is_relocate());
    }

    #[test]
    fn selection_reserves_regions_for_the_copies() {
        let space = space();
        let sparse = space.acquire_region().unwrap();
        space.region(sparse).allocate(BYTES_IN_REGION / 2).unwrap();
        space.region(sparse).add_live_bytes(4096);

        let candidates = space.select_candidates(0.5);
        assert_eq!(candidates, vec![sparse]);
        assert_eq!(space.regions_in_use(), 2);

        let copy = space.alloc_for_copy(64).unwrap();
        let copy_region = space.region_index(copy);
        assert_ne!(copy_region, sparse);
        assert!(space.region(copy_region).is_copy());

        space.retire_copy_cursor();
        // The used copy region stays in use but reopens for buffers.
        assert_eq!(space.regions_in_use(), 2);
        assert!(!space.region(copy_region).is_copy());
    }

    #[test]
    fn untouched_reserve_regions_return_to_the_free_list() {
        let space = space();
        let sparse = space.acquire_region().unwrap();
        space.region(sparse).allocate(1024).unwrap();
        space.region(sparse).add_live_bytes(512);
        space.select_candidates(0.5);
        assert_eq!(space.regions_in_use(), 2);
        space.retire_copy_cursor();
        assert_eq!(space.regions_in_use(), 1);
    }

    #[test]
    fn buffers_never_come_from_copy_regions() {
        let space = RegionSpace::new(2 * BYTES_IN_REGION);
        let sparse = space.acquire_region().unwrap();
        space.region(sparse).allocate(1024).unwrap();
        space.region(sparse).add_live_bytes(512);
        space.select_candidates(0.5);
        // The only other region is reserved for copies.
        assert!(space.acquire_buffer(64).is_none());
    }
}
