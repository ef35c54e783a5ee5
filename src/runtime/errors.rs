//! Runtime gateway errors

use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Runtime gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to connect to runtime: {0}")]
    Connect(String),

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

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("upperdir not found for container {0}")]
    UpperdirNotFound(String),

    #[error("failed to parse runtime output: {0}")]
    Parse(String),

    #[error("event stream error: {0}")]
    Stream(String),
}
