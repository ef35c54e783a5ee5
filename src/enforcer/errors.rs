//! Quota enforcer errors

use std::path::PathBuf;

use thiserror::Error;

/// Result type for enforcer operations
pub type EnforcerResult<T> = Result<T, EnforcerError>;

/// Quota enforcer errors
#[derive(Debug, Error)]
pub enum EnforcerError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    #[error("no project ID found for {}", path.display())]
    ProjectIdNotFound { path: PathBuf },

    #[error("failed to parse project ID from '{0}'")]
    ParseProjectId(String),

    #[error("invalid quota size '{0}': expected digits with an optional k/m/g/t/p/e unit")]
    InvalidSize(String),

    #[error("soft limit {soft} exceeds hard limit {hard}")]
    SoftAboveHard { soft: String, hard: String },

    #[error("injected failure: {0}")]
    Injected(String),
}
