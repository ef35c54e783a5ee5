//! Container lifecycle events and rootfs mounts

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const UPPERDIR_PREFIX: &str = "upperdir=";

/// A rootfs mount as described by the runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    #[serde(rename = "type", default)]
    pub mount_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl Mount {
    /// The `upperdir=` option of this mount, if any
    pub fn upperdir(&self) -> Option<PathBuf> {
        self.options
            .iter()
            .find_map(|opt| opt.strip_prefix(UPPERDIR_PREFIX))
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
    }
}

/// Writable layer path of a rootfs: the first mount carrying `upperdir=`.
pub fn extract_upperdir(mounts: &[Mount]) -> Option<PathBuf> {
    mounts.iter().find_map(Mount::upperdir)
}

/// Lifecycle events the engine reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// A task was created; its rootfs describes the writable layer
    TaskCreate {
        container_id: String,
        rootfs: Vec<Mount>,
    },
    /// A task was deleted; the path must be resolved separately
    TaskDelete { container_id: String },
    /// Any other topic, ignored
    Other { topic: String },
}

impl RuntimeEvent {
    pub fn container_id(&self) -> Option<&str> {
        match self {
            RuntimeEvent::TaskCreate { container_id, .. }
            | RuntimeEvent::TaskDelete { container_id } => Some(container_id),
            RuntimeEvent::Other { .. } => None,
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            RuntimeEvent::TaskCreate { .. } => "/tasks/create",
            RuntimeEvent::TaskDelete { .. } => "/tasks/delete",
            RuntimeEvent::Other { topic } => topic,
        }
    }
}
