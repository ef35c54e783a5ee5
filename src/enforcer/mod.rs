//! Quota enforcement collaborator
//!
//! The enforcer tags a directory with a project ID, sets or clears the block
//! limits of a project, and reads back the project ID tagging a directory.
//! The engine only depends on the [`QuotaEnforcer`] trait:
//!
//! - [`XfsQuotaEnforcer`] drives `xfs_quota` / `xfs_io`.
//! - [`MemoryEnforcer`] records calls and simulates read-back for tests.

mod errors;
mod memory;
mod size;
mod xfs;

use std::path::Path;

pub use errors::{EnforcerError, EnforcerResult};
pub use memory::{EnforcerCall, EnforcerOp, MemoryEnforcer};
pub use size::{QuotaLimits, QuotaSize};
pub use xfs::{parse_projid, XfsQuotaEnforcer, XfsToolPaths};

/// Applies and inspects per-project storage limits.
///
/// Calls are awaited one at a time by the engine; implementations need not
/// be reentrant.
#[allow(async_fn_in_trait)]
pub trait QuotaEnforcer {
    /// Tag `path` (recursively) with `project_id`.
    async fn tag(&self, path: &Path, project_id: u32) -> EnforcerResult<()>;

    /// Set the block limits of `project_id`. [`QuotaLimits::cleared`] removes them.
    async fn set_limit(&self, project_id: u32, limits: &QuotaLimits) -> EnforcerResult<()>;

    /// Read the project ID currently tagging `path`.
    async fn read_tag(&self, path: &Path) -> EnforcerResult<u32>;
}
