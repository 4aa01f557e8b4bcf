//! The mutator-facing side of the collector: barriers, thread contexts and
//! the mark worklist.

pub mod barriers;
pub mod mutator;
pub mod tracing;

pub use self::barriers::{Barrier, FieldBarrier};
pub use self::mutator::{Mutator, MutatorRegistry, RootId};
