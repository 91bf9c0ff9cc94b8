//! Sandbox provider trait

use crate::SandboxResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Default timeout for a single execution
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// A command to run inside a sandbox, rooted at a workspace
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Name of the unit that will run the command, unique per request
    pub unit_name: String,
    /// Program and arguments
    pub command: Vec<String>,
    /// Host path of the workspace the command runs in
    pub workdir: PathBuf,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
    /// Hard limit on how long the unit may run
    pub timeout: Duration,
}

impl ExecRequest {
    /// Create a request with the default timeout and no extra environment
    pub fn new(command: Vec<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            unit_name: unit_name(),
            command,
            workdir: workdir.into(),
            env: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Override the generated unit name
    pub fn unit_name(mut self, name: impl Into<String>) -> Self {
        self.unit_name = name.into();
        self
    }

    /// Set the timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The workspace directory
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Program name, if the command is non-empty
    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }
}

/// Fresh, collision-free unit name
pub fn unit_name() -> String {
    format!("swarm-{}", Uuid::new_v4().simple())
}

/// Captured result of a unit of work that reached a terminal state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit status of the process or container
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error (empty when the backend interleaves streams)
    pub stderr: String,
}

impl ExecOutput {
    /// Whether the unit exited with status zero
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr, trimmed
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }

    /// Last `max_chars` characters of the combined output, for error messages
    pub fn tail(&self, max_chars: usize) -> String {
        let combined = self.combined();
        let count = combined.chars().count();
        if count <= max_chars {
            return combined;
        }
        combined.chars().skip(count - max_chars).collect()
    }
}

/// Strategy for running an agent command in isolation
///
/// Implementations block the calling worker until the unit finishes or the
/// request's timeout elapses. On timeout the unit must be force-terminated
/// and [`crate::SandboxError::Timeout`] returned.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Human-readable name for this provider
    fn name(&self) -> &'static str;

    /// Make sure the provider can run work at all
    ///
    /// Called once before any task is dispatched. A failure here is a
    /// configuration problem, not a per-task error.
    async fn prepare(&self) -> SandboxResult<()> {
        Ok(())
    }

    /// Run a command to completion
    async fn execute(&self, request: &ExecRequest) -> SandboxResult<ExecOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder() {
        let req = ExecRequest::new(vec!["claude".into(), "--print".into()], "/tmp/ws")
            .env("TASK_ID", "abc")
            .envs([("A", "1"), ("B", "2")])
            .timeout(Duration::from_secs(5));

        assert_eq!(req.program(), Some("claude"));
        assert_eq!(req.workdir(), Path::new("/tmp/ws"));
        assert_eq!(req.env.get("TASK_ID").map(String::as_str), Some("abc"));
        assert_eq!(req.env.len(), 3);
        assert_eq!(req.timeout, Duration::from_secs(5));
    }

    #[test]
    fn every_request_gets_its_own_unit_name() {
        let a = ExecRequest::new(vec!["true".into()], "/tmp");
        let b = ExecRequest::new(vec!["true".into()], "/tmp");
        assert_ne!(a.unit_name, b.unit_name);
        assert!(a.unit_name.starts_with("swarm-"));

        let named = a.unit_name("swarm-fixed");
        assert_eq!(named.unit_name, "swarm-fixed");
    }

    #[test]
    fn combined_output_skips_empty_streams() {
        let out = ExecOutput {
            exit_code: 0,
            stdout: "hello\n".into(),
            stderr: String::new(),
        };
        assert_eq!(out.combined(), "hello");

        let out = ExecOutput {
            exit_code: 1,
            stdout: "partial".into(),
            stderr: "boom\n".into(),
        };
        assert!(!out.success());
        assert_eq!(out.combined(), "partial\nboom");
    }

    #[test]
    fn tail_keeps_the_end() {
        let out = ExecOutput {
            exit_code: 2,
            stdout: "abcdefghij".into(),
            stderr: String::new(),
        };
        assert_eq!(out.tail(4), "ghij");
        assert_eq!(out.tail(100), "abcdefghij");
    }
}
