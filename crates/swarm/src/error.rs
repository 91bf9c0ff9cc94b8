//! Error types for swarm runs

use sandbox::SandboxError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for swarm operations
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Errors that can occur while configuring or running a swarm
#[derive(Error, Debug)]
pub enum SwarmError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Config file could not be parsed
    #[error("Failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Requested sandbox host is unreachable or could not be warmed up
    #[error("Sandbox unavailable: {0}")]
    SandboxUnavailable(String),

    /// Sandbox execution failed
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Workspace acquire/release failed
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// Agent runner invocation failed
    #[error("Agent runner error: {0}")]
    Runner(String),

    /// Persistence sink rejected a document
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwarmError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        SwarmError::InvalidConfig(msg.into())
    }

    /// Create a sandbox unavailable error
    pub fn sandbox_unavailable(msg: impl Into<String>) -> Self {
        SwarmError::SandboxUnavailable(msg.into())
    }

    /// Create a workspace error
    pub fn workspace(msg: impl Into<String>) -> Self {
        SwarmError::Workspace(msg.into())
    }

    /// Create a runner error
    pub fn runner(msg: impl Into<String>) -> Self {
        SwarmError::Runner(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        SwarmError::Persistence(msg.into())
    }

    /// Errors that stop a run before any task starts
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SwarmError::InvalidConfig(_)
                | SwarmError::ConfigParse { .. }
                | SwarmError::SandboxUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_classified() {
        assert!(SwarmError::invalid_config("maxConcurrency must be >= 1").is_configuration());
        assert!(SwarmError::sandbox_unavailable("docker down").is_configuration());
        assert!(!SwarmError::workspace("git failed").is_configuration());
        assert!(!SwarmError::from(SandboxError::timeout(std::time::Duration::from_secs(1)))
            .is_configuration());
    }

    #[test]
    fn sandbox_errors_keep_their_message() {
        let err = SwarmError::from(SandboxError::timeout(std::time::Duration::from_secs(2)));
        assert_eq!(err.to_string(), "timed out after 2s");
    }
}
