//! Collector-side scheduling: the controller thread, the safepoint
//! handshake and the parallel work routines.

pub mod controller;
pub mod gc_requester;
pub mod safepoint;
pub mod worker;

pub use self::gc_requester::GcRequester;
pub use self::safepoint::WorldController;
pub use self::worker::MarkOutcome;
