//! Decides when a collection should start.

use crate::policy::region::RegionSpace;
use crate::scheduler::GcRequester;
use crate::util::constants::DEFAULT_STRESS_FACTOR;
use crate::util::options::Options;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// GcTrigger watches heap occupancy and allocation volume and asks the
/// requester for a collection when either crosses its threshold. All the
/// decisions about when to collect are resolved here; the controller only
/// decides how.
pub struct GcTrigger {
    space: Arc<RegionSpace>,
    requester: Arc<GcRequester>,
    /// used regions / total regions above which a concurrent cycle starts.
    trigger_occupancy: f32,
    stress_factor: usize,
    allocation_bytes: AtomicUsize,
}

impl GcTrigger {
    pub fn new(options: &Options, space: Arc<RegionSpace>, requester: Arc<GcRequester>) -> Self {
        GcTrigger {
            space,
            requester,
            trigger_occupancy: options.trigger_occupancy,
            stress_factor: options.stress_factor,
            allocation_bytes: AtomicUsize::new(0),
        }
    }

    fn occupancy(&self) -> f32 {
        self.space.regions_in_use() as f32 / self.space.region_count() as f32
    }

    /// Check the occupancy threshold. Called from the allocation slow path.
    pub fn poll(&self) {
        let occupancy = self.occupancy();
        if occupancy >= self.trigger_occupancy {
            trace!(
                "occupancy {:.2} over threshold {:.2}, requesting collection",
                occupancy,
                self.trigger_occupancy
            );
            self.requester.request();
        }
    }

    /// Account `bytes` of fresh allocation, firing a stress-test collection
    /// request every `stress_factor` bytes.
    pub fn on_allocation(&self, bytes: usize) {
        if self.stress_factor == DEFAULT_STRESS_FACTOR {
            return;
        }
        let total = self.allocation_bytes.fetch_add(bytes, Ordering::SeqCst) + bytes;
        if total >= self.stress_factor {
            self.allocation_bytes.store(0, Ordering::SeqCst);
            debug!("stress factor reached after {} bytes, requesting collection", total);
            self.requester.request();
        }
    }

    /// Forget accumulated allocation volume. Called when a cycle finishes.
    pub fn reset(&self) {
        self.allocation_bytes.store(0, Ordering::SeqCst);
    }
}
