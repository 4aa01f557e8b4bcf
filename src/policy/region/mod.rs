//! The region space and its side metadata.

pub mod marktable;
pub mod region;
pub mod regionspace;

pub use self::marktable::MarkTable;
pub use self::region::{Region, RegionState};
pub use self::regionspace::RegionSpace;
