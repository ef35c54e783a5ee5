//! In-memory enforcer for tests
//!
//! Keeps tags and limits in maps, records every call in order, and can be
//! told to fail a given operation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::errors::{EnforcerError, EnforcerResult};
use super::size::QuotaLimits;
use super::QuotaEnforcer;

/// Enforcer operation kinds, used for fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnforcerOp {
    Tag,
    SetLimit,
    ClearLimit,
    ReadTag,
}

/// A recorded enforcer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnforcerCall {
    Tag { path: PathBuf, project_id: u32 },
    SetLimit { project_id: u32, limits: QuotaLimits },
    ReadTag { path: PathBuf },
}

#[derive(Debug, Default)]
struct Inner {
    tags: HashMap<PathBuf, u32>,
    limits: HashMap<u32, QuotaLimits>,
    calls: Vec<EnforcerCall>,
    failing: HashSet<EnforcerOp>,
}

#[derive(Debug, Default)]
pub struct MemoryEnforcer {
    inner: Mutex<Inner>,
}

impl MemoryEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent `op` fail until [`clear_failures`](Self::clear_failures).
    pub fn fail_on(&self, op: EnforcerOp) {
        self.lock().failing.insert(op);
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Pre-tag a path, as if done by a previous process
    pub fn set_tag(&self, path: impl Into<PathBuf>, project_id: u32) {
        self.lock().tags.insert(path.into(), project_id);
    }

    pub fn tag_of(&self, path: &Path) -> Option<u32> {
        self.lock().tags.get(path).copied()
    }

    /// Limits currently applied to a project (cleared limits included)
    pub fn limits_of(&self, project_id: u32) -> Option<QuotaLimits> {
        self.lock().limits.get(&project_id).cloned()
    }

    /// Whether `project_id` currently has non-zero limits
    pub fn is_enforced(&self, project_id: u32) -> bool {
        self.limits_of(project_id)
            .map(|l| !l.is_cleared())
            .unwrap_or(false)
    }

    pub fn calls(&self) -> Vec<EnforcerCall> {
        self.lock().calls.clone()
    }

    /// Project IDs passed to `tag`, in call order
    pub fn tagged_ids(&self) -> Vec<u32> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EnforcerCall::Tag { project_id, .. } => Some(*project_id),
                _ => None,
            })
            .collect()
    }

    fn check(inner: &Inner, op: EnforcerOp) -> EnforcerResult<()> {
        if inner.failing.contains(&op) {
            return Err(EnforcerError::Injected(format!("{:?}", op)));
        }
        Ok(())
    }
}

impl QuotaEnforcer for MemoryEnforcer {
    async fn tag(&self, path: &Path, project_id: u32) -> EnforcerResult<()> {
        let mut inner = self.lock();
        inner.calls.push(EnforcerCall::Tag {
            path: path.to_path_buf(),
            project_id,
        });
        Self::check(&inner, EnforcerOp::Tag)?;
        inner.tags.insert(path.to_path_buf(), project_id);
        Ok(())
    }

    async fn set_limit(&self, project_id: u32, limits: &QuotaLimits) -> EnforcerResult<()> {
        let mut inner = self.lock();
        inner.calls.push(EnforcerCall::SetLimit {
            project_id,
            limits: limits.clone(),
        });
        let op = if limits.is_cleared() {
            EnforcerOp::ClearLimit
        } else {
            EnforcerOp::SetLimit
        };
        Self::check(&inner, op)?;
        inner.limits.insert(project_id, limits.clone());
        Ok(())
    }

    async fn read_tag(&self, path: &Path) -> EnforcerResult<u32> {
        let mut inner = self.lock();
        inner.calls.push(EnforcerCall::ReadTag {
            path: path.to_path_buf(),
        });
        Self::check(&inner, EnforcerOp::ReadTag)?;
        inner
            .tags
            .get(path)
            .copied()
            .ok_or_else(|| EnforcerError::ProjectIdNotFound {
                path: path.to_path_buf(),
            })
    }
}
