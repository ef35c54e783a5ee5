//! Reconciliation engine error types
//!
//! Error codes:
//! - RFSQ_ENGINE_POOL_EXHAUSTED (ERROR severity)
//! - RFSQ_ENGINE_ENFORCEMENT_FAILED (ERROR severity)
//! - RFSQ_ENGINE_PERSISTENCE_FAILED (ERROR severity)
//! - RFSQ_ENGINE_STATE_INCONSISTENT (ERROR severity)
//! - RFSQ_ENGINE_CORRUPT_STATE (FATAL severity)
//! - RFSQ_ENGINE_STREAM_ERROR (ERROR severity)
//! - RFSQ_ENGINE_PATH_UNRESOLVED (ERROR severity)
//! - RFSQ_ENGINE_CANCELLED (ERROR severity)
//!
//! Every error carries whatever of container ID, path and project ID was
//! known when it was raised, so a log line is enough to reconcile by hand.

use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::enforcer::EnforcerError;
use crate::pool::PoolError;
use crate::runtime::GatewayError;
use crate::state::{Severity, StateError};

type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorCode {
    /// No free project ID in the configured range
    PoolExhausted,
    /// Tagging, limiting or clearing through the enforcer failed
    EnforcementFailure,
    /// The state document could not be written
    PersistenceFailure,
    /// Recorded and on-disk project IDs disagree for a path
    StateInconsistent,
    /// State document unreadable at startup
    CorruptState,
    /// Runtime connection failed or was lost
    StreamError,
    /// Runtime could not produce the writable layer path
    PathUnresolved,
    /// Cancellation observed before a step started
    Cancelled,
}

impl EngineErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            EngineErrorCode::PoolExhausted => "RFSQ_ENGINE_POOL_EXHAUSTED",
            EngineErrorCode::EnforcementFailure => "RFSQ_ENGINE_ENFORCEMENT_FAILED",
            EngineErrorCode::PersistenceFailure => "RFSQ_ENGINE_PERSISTENCE_FAILED",
            EngineErrorCode::StateInconsistent => "RFSQ_ENGINE_STATE_INCONSISTENT",
            EngineErrorCode::CorruptState => "RFSQ_ENGINE_CORRUPT_STATE",
            EngineErrorCode::StreamError => "RFSQ_ENGINE_STREAM_ERROR",
            EngineErrorCode::PathUnresolved => "RFSQ_ENGINE_PATH_UNRESOLVED",
            EngineErrorCode::Cancelled => "RFSQ_ENGINE_CANCELLED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            EngineErrorCode::CorruptState => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug)]
pub struct EngineError {
    code: EngineErrorCode,
    message: String,
    container_id: Option<String>,
    path: Option<PathBuf>,
    project_id: Option<u32>,
    source: Option<BoxedSource>,
}

impl EngineError {
    fn new(code: EngineErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            container_id: None,
            path: None,
            project_id: None,
            source: None,
        }
    }

    fn caused_by(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn pool_exhausted(container_id: &str, source: PoolError) -> Self {
        Self::new(EngineErrorCode::PoolExhausted, "no free project ID")
            .with_container(container_id)
            .caused_by(source)
    }

    pub fn enforcement(container_id: &str, step: &str, source: EnforcerError) -> Self {
        Self::new(EngineErrorCode::EnforcementFailure, format!("{} failed", step))
            .with_container(container_id)
            .caused_by(source)
    }

    pub fn persistence(container_id: &str, source: StateError) -> Self {
        Self::new(
            EngineErrorCode::PersistenceFailure,
            "state document write failed",
        )
        .with_container(container_id)
        .caused_by(source)
    }

    pub fn inconsistent(container_id: &str, path: &Path, recorded: u32, on_disk: u32) -> Self {
        Self::new(
            EngineErrorCode::StateInconsistent,
            format!(
                "recorded project ID {} but path is tagged with {}",
                recorded, on_disk
            ),
        )
        .with_container(container_id)
        .with_path(path)
        .with_project_id(recorded)
    }

    pub fn corrupt_state(source: StateError) -> Self {
        Self::new(EngineErrorCode::CorruptState, "state document unreadable").caused_by(source)
    }

    pub fn stream(message: impl Into<String>, source: GatewayError) -> Self {
        Self::new(EngineErrorCode::StreamError, message).caused_by(source)
    }

    /// The event stream ended without an error
    pub fn stream_closed() -> Self {
        Self::new(EngineErrorCode::StreamError, "event stream closed")
    }

    pub fn path_unresolved(container_id: &str, source: GatewayError) -> Self {
        Self::new(
            EngineErrorCode::PathUnresolved,
            "could not resolve writable layer",
        )
        .with_container(container_id)
        .caused_by(source)
    }

    pub fn cancelled() -> Self {
        Self::new(EngineErrorCode::Cancelled, "cancelled")
    }

    pub fn with_container(mut self, container_id: &str) -> Self {
        self.container_id = Some(container_id.to_string());
        self
    }

    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    pub fn with_project_id(mut self, project_id: u32) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn code(&self) -> EngineErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn project_id(&self) -> Option<u32> {
        self.project_id
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == EngineErrorCode::Cancelled
    }

    /// Key/value context for a structured log line
    pub fn log_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("code", self.code.code().to_string()),
            ("error", self.to_string()),
        ];
        if let Some(ref id) = self.container_id {
            fields.push(("container_id", id.clone()));
        }
        if let Some(ref path) = self.path {
            fields.push(("path", path.display().to_string()));
        }
        if let Some(project_id) = self.project_id {
            fields.push(("project_id", project_id.to_string()));
        }
        fields
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl StdError for EngineError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}
