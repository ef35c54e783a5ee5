//! Project ID pool
//!
//! Allocates, releases and pre-marks XFS project IDs from a fixed range.
//! Allocation is deterministic: the lowest free ID always wins.

mod allocator;
mod errors;

pub use allocator::{ProjectIdPool, ProjectIdRange};
pub use errors::{PoolError, PoolResult};
