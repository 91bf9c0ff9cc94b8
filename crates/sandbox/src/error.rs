//! Error types for sandboxed execution

use std::time::Duration;
use thiserror::Error;

/// Result type for sandbox operations
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Errors that can occur while running a unit of work in a sandbox
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The sandbox host cannot be reached or is not warmed up
    #[error("Sandbox host unavailable: {0}")]
    Unavailable(String),

    /// Creating the compute unit failed
    #[error("Sandbox unit creation failed: {0}")]
    CreateFailed(String),

    /// Spawning or talking to the unit failed after creation
    #[error("Sandbox execution failed: {0}")]
    ExecutionFailed(String),

    /// The unit did not reach a terminal state in time and was force-terminated
    #[error("timed out after {}s", after.as_secs_f64())]
    Timeout { after: Duration },

    /// The request itself was unusable (empty command, missing workdir)
    #[error("Invalid sandbox request: {0}")]
    InvalidRequest(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        SandboxError::Unavailable(msg.into())
    }

    /// Create a unit creation error
    pub fn create_failed(msg: impl Into<String>) -> Self {
        SandboxError::CreateFailed(msg.into())
    }

    /// Create an execution error
    pub fn execution_failed(msg: impl Into<String>) -> Self {
        SandboxError::ExecutionFailed(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        SandboxError::InvalidRequest(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(after: Duration) -> Self {
        SandboxError::Timeout { after }
    }

    /// Whether this error means the unit ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout { .. })
    }
}
