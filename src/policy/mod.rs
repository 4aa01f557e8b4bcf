//! Memory policy: how heap memory is organized and reclaimed. The only policy
//! here is the region space, a fixed-size-region heap supporting concurrent
//! mark and relocate.

pub mod region;
