//! Lets mutators and API callers ask the controller for a collection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

#[derive(Default)]
struct RequestSync {
    request_pending: bool,
    shutdown: bool,
}

/// This data structure lets mutators trigger GC. The controller thread sleeps
/// in [`GcRequester::wait_for_request`] between cycles.
pub struct GcRequester {
    request_sync: Mutex<RequestSync>,
    request_condvar: Condvar,
    request_flag: AtomicBool,
}

impl GcRequester {
    pub fn new() -> Self {
        GcRequester {
            request_sync: Mutex::new(RequestSync::default()),
            request_condvar: Condvar::new(),
            request_flag: AtomicBool::new(false),
        }
    }

    /// Request a collection. Called by mutators when polling during
    /// allocation and when handling user collection requests. Successive
    /// requests coalesce until the controller picks the request up.
    pub fn request(&self) {
        // Double-checked locking: the relaxed load only filters successive
        // requests, it does not synchronize other fields.
        if self.request_flag.load(Ordering::Relaxed) {
            return;
        }
        let mut guard = self.request_sync.lock().unwrap();
        if !self.request_flag.load(Ordering::Relaxed) {
            self.request_flag.store(true, Ordering::Relaxed);
            guard.request_pending = true;
            self.request_condvar.notify_all();
        }
    }

    /// Clear the request flag so mutators can trigger the next collection.
    /// Called by the controller once the cycle is underway.
    pub fn clear_request(&self) {
        let mut guard = self.request_sync.lock().unwrap();
        guard.request_pending = false;
        self.request_flag.store(false, Ordering::Relaxed);
    }

    /// Block until a collection is requested. Returns false if the instance
    /// is shutting down and the controller should exit.
    pub fn wait_for_request(&self) -> bool {
        let mut guard = self.request_sync.lock().unwrap();
        loop {
            if guard.shutdown {
                return false;
            }
            if guard.request_pending {
                return true;
            }
            guard = self.request_condvar.wait(guard).unwrap();
        }
    }

    /// Wake the controller and make it exit its loop.
    pub fn shutdown(&self) {
        let mut guard = self.request_sync.lock().unwrap();
        guard.shutdown = true;
        self.request_condvar.notify_all();
    }
}

impl Default for GcRequester {
    fn default() -> Self {
        Self::new()
    }
}
