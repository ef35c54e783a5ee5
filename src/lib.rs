//! rootfs-quota: per-container XFS project quotas for containerd
//!
//! Watches containerd task events, assigns each container a project ID from
//! a fixed range, tags the container's writable layer with it and applies
//! block limits. Assignments are persisted so a restart, or a lost
//! connection to containerd, is healed by a reconciliation pass.

pub mod cli;
pub mod crash_point;
pub mod enforcer;
pub mod engine;
pub mod observability;
pub mod pool;
pub mod runtime;
pub mod state;
