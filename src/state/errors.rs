//! State store error types
//!
//! Error codes:
//! - RFSQ_STATE_IO_ERROR (ERROR severity)
//! - RFSQ_STATE_PERSIST_FAILED (ERROR severity)
//! - RFSQ_STATE_CORRUPT (FATAL severity)

use std::fmt;
use std::io;
use std::path::Path;

/// Severity levels for state errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, service continues
    Error,
    /// Process must terminate
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// State-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateErrorCode {
    /// Reading or creating the state document failed
    RfsqStateIoError,
    /// Durable write of the state document failed
    RfsqStatePersistFailed,
    /// State document exists but cannot be parsed
    RfsqStateCorrupt,
}

impl StateErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            StateErrorCode::RfsqStateIoError => "RFSQ_STATE_IO_ERROR",
            StateErrorCode::RfsqStatePersistFailed => "RFSQ_STATE_PERSIST_FAILED",
            StateErrorCode::RfsqStateCorrupt => "RFSQ_STATE_CORRUPT",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            StateErrorCode::RfsqStateIoError => Severity::Error,
            StateErrorCode::RfsqStatePersistFailed => Severity::Error,
            StateErrorCode::RfsqStateCorrupt => Severity::Fatal,
        }
    }
}

impl fmt::Display for StateErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// State store error with context
#[derive(Debug)]
pub struct StateError {
    code: StateErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StateError {
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StateErrorCode::RfsqStateIoError,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    pub fn persist_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StateErrorCode::RfsqStatePersistFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a persist failure without an IO source (e.g. serialization)
    pub fn persist_failed_no_source(message: impl Into<String>) -> Self {
        Self {
            code: StateErrorCode::RfsqStatePersistFailed,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a corruption error (FATAL) for the document at `path`
    pub fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            code: StateErrorCode::RfsqStateCorrupt,
            message: reason.into(),
            details: Some(format!("path: {}", path.display())),
            source: None,
        }
    }

    pub fn code(&self) -> StateErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error requires process termination
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for state operations
pub type StateResult<T> = Result<T, StateError>;
