//! Persistent quota state
//!
//! Maps each container to its XFS project ID and writable layer path, and
//! survives process restarts.
//!
//! # Invariants
//!
//! - Project IDs are pairwise distinct across entries.
//! - A mutation is visible in memory only once it is durable on disk.
//! - A malformed document is fatal; it is never reset.

mod entry;
mod errors;
mod store;

pub use entry::{Entry, StateDocument};
pub use errors::{Severity, StateError, StateErrorCode, StateResult};
pub use store::StateStore;
