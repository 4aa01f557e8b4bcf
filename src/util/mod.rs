//! Utilities used across the crate.

/// Raw addresses and object references.
pub mod address;
/// Thread-local allocation.
pub mod alloc;
/// Constants for the word size, region geometry and object limits.
pub mod constants;
/// Conversions between units and alignment helpers.
pub mod conversions;
/// The collection trigger.
pub mod heap;
/// An optional env_logger backend.
pub mod logger;
/// The forwarding-word state machine used during relocation.
pub mod object_forwarding;
/// The object header layout and field access.
pub mod object_model;
/// Runtime options.
pub mod options;
/// Collection statistics and pause timing.
pub mod statistics;
/// Helpers shared by tests.
pub mod test_util;

pub use self::address::{Address, ObjectReference};
