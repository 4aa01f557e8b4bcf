//! Class metadata and safe redefinition.
//!
//! Class metadata is versioned: each class points at its current
//! [`ClassGeneration`] through an epoch-protected pointer, so method lookup
//! never takes a lock. Redefinition builds a complete replacement generation,
//! validates it against the current one and swaps the pointer atomically.
//! Superseded method versions stay alive for as long as an executing frame or
//! a captured backtrace still refers to them.

pub mod backtrace;
pub mod classfile;
pub mod metadata;
pub mod reclaim;
pub mod redefine;
pub mod table;

pub use self::backtrace::{Backtrace, BacktraceFrame, BacktraceRegistry};
pub use self::classfile::ParsedClass;
pub use self::metadata::{ClassGeneration, ClassId, MethodModifiers, MethodVersion};
pub use self::reclaim::Reclaimer;
pub use self::table::ClassTable;

use std::fmt;

/// Why a class definition or redefinition was rejected. Rejection leaves the
/// previous generation fully in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedefineError {
    /// The named class has never been defined.
    UnknownClass(String),
    /// The class bytes are structurally invalid.
    ClassFormat(String),
    /// The new generation changes something redefinition must preserve
    /// (method set, modifiers, superclass or field layout).
    Incompatible(String),
    /// An unknown attribute in a classfile recent enough that unknown
    /// attributes are an error.
    MalformedAttribute(String),
    /// A class of this name is already defined.
    DuplicateClass(String),
    /// The class table has no free slot left.
    TableFull,
}

impl fmt::Display for RedefineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RedefineError::UnknownClass(name) => write!(f, "unknown class '{}'", name),
            RedefineError::ClassFormat(what) => write!(f, "malformed class bytes: {}", what),
            RedefineError::Incompatible(what) => write!(f, "incompatible redefinition: {}", what),
            RedefineError::MalformedAttribute(what) => {
                write!(f, "malformed attribute: {}", what)
            }
            RedefineError::DuplicateClass(name) => {
                write!(f, "class '{}' is already defined", name)
            }
            RedefineError::TableFull => write!(f, "class table is full"),
        }
    }
}

impl std::error::Error for RedefineError {}
