//! Relic is a concurrent, region-based managed heap with safe class
//! redefinition.
//!
//! The heap is carved into fixed-size regions. A concurrent mark-relocate
//! collector runs alongside mutator threads: marking is kept sound by a
//! Dijkstra-style insertion write barrier, relocation by a forwarding-word
//! protocol that lets mutator stores help copy objects out of evacuated
//! regions. Mutators only pause for three short handshakes per cycle; if
//! marking cannot keep up with allocation the cycle degrades to a full
//! stop-the-world collection, trading latency for completion.
//!
//! Class metadata sits beside the heap in a versioned table. Redefinition
//! swaps a class's entire method set with one atomic pointer swap, and
//! superseded method versions stay alive for as long as an executing frame
//! or a captured backtrace still names them.
//!
//! The crate is used through [`memory_manager`]: build an instance with
//! [`RelicBuilder`], attach threads with
//! [`bind_mutator`](memory_manager::bind_mutator), and allocate and store
//! through the returned [`Mutator`](plan::Mutator).

#![deny(unsafe_op_in_unsafe_fn)]

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

mod global_state;
pub mod memory_manager;
mod relic;

/// Build-time information about this crate.
pub mod build_info;
/// Class metadata and redefinition.
pub mod klass;
/// The mutator-facing side of the collector.
pub mod plan;
/// How heap memory is organized.
pub mod policy;
/// The collector threads and the safepoint protocol.
pub mod scheduler;
/// Utilities.
pub mod util;

pub use crate::global_state::Phase;
pub use crate::memory_manager::HeapStatistics;
pub use crate::plan::{Mutator, RootId};
pub use crate::relic::{Relic, RelicBuilder};
pub use crate::util::alloc::AllocationError;
pub use crate::util::{Address, ObjectReference};
