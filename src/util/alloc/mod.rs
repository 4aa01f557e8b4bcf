//! Thread-local allocation.

pub mod bump_allocator;

pub use self::bump_allocator::{BumpAllocator, BumpPointer};

use crate::klass::metadata::ClassId;
use std::fmt;

/// The result of an allocation request that could not be satisfied.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocationError {
    /// The heap has no free region left, even after collection.
    HeapOutOfMemory,
    /// The request exceeds the maximum object size and can never succeed.
    OversizedObject,
    /// The requested class has never been defined.
    UnknownClass(ClassId),
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AllocationError::HeapOutOfMemory => write!(f, "heap out of memory"),
            AllocationError::OversizedObject => write!(f, "object exceeds the maximum object size"),
            AllocationError::UnknownClass(class) => write!(f, "{} is not defined", class),
        }
    }
}

impl std::error::Error for AllocationError {}
