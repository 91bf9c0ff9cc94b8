//! Swarm run configuration
//!
//! Stored as camelCase JSON (e.g. `.swarm/config.json`). Every field has a
//! default, so a partial file or no file at all is valid.

use crate::error::{Result, SwarmError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

/// Which sandbox strategy runs the agent command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SandboxKind {
    /// Plain child process in the workspace
    #[default]
    Local,
    /// Disposable container per task
    Container,
}

/// Immutable configuration for one swarm run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmConfig {
    /// Maximum number of tasks running at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-task timeout in ms
    #[serde(default = "default_per_task_timeout_ms")]
    pub per_task_timeout_ms: u64,

    /// Extra time granted to a sandbox to honour its own timeout, in ms
    #[serde(default = "default_timeout_grace_ms")]
    pub timeout_grace_ms: u64,

    /// Sandbox strategy
    #[serde(default)]
    pub sandbox: SandboxKind,

    /// Image used for container units
    #[serde(default = "default_sandbox_image")]
    pub sandbox_image: String,

    /// Memory hint for container units
    #[serde(default = "default_sandbox_memory")]
    pub sandbox_memory: Option<String>,

    /// CPU hint for container units
    #[serde(default = "default_sandbox_cpu")]
    pub sandbox_cpu: Option<String>,

    /// Combine successful outputs into one summary document
    #[serde(default)]
    pub synthesize: bool,

    /// Tags attached to every persisted document
    #[serde(default)]
    pub output_tags: BTreeSet<String>,

    /// Agent CLI invocation; the prompt is appended as the last argument
    #[serde(default = "default_agent_command")]
    pub agent_command: Vec<String>,

    /// Extra environment for every agent process
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Container status poll interval in ms
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            per_task_timeout_ms: default_per_task_timeout_ms(),
            timeout_grace_ms: default_timeout_grace_ms(),
            sandbox: SandboxKind::Local,
            sandbox_image: default_sandbox_image(),
            sandbox_memory: default_sandbox_memory(),
            sandbox_cpu: default_sandbox_cpu(),
            synthesize: false,
            output_tags: BTreeSet::new(),
            agent_command: default_agent_command(),
            env: BTreeMap::new(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl SwarmConfig {
    /// Load from a JSON file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&content).map_err(|source| SwarmError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no run could start with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(SwarmError::invalid_config("maxConcurrency must be at least 1"));
        }
        if self.per_task_timeout_ms == 0 {
            return Err(SwarmError::invalid_config("perTaskTimeoutMs must be positive"));
        }
        if self.agent_command.is_empty() {
            return Err(SwarmError::invalid_config("agentCommand must not be empty"));
        }
        if self.sandbox == SandboxKind::Container && self.sandbox_image.trim().is_empty() {
            return Err(SwarmError::invalid_config(
                "sandboxImage is required for container sandboxes",
            ));
        }
        Ok(())
    }

    /// Per-task timeout
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.per_task_timeout_ms)
    }

    /// Hard limit the orchestrator enforces around a sandbox call
    pub fn backstop_timeout(&self) -> Duration {
        Duration::from_millis(self.per_task_timeout_ms.saturating_add(self.timeout_grace_ms))
    }

    /// Container poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Full command line for one prompt
    pub fn command_for(&self, prompt: &str) -> Vec<String> {
        let mut command = self.agent_command.clone();
        command.push(prompt.to_string());
        command
    }

    /// Set max concurrency
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    /// Set per-task timeout
    pub fn per_task_timeout(mut self, timeout: Duration) -> Self {
        self.per_task_timeout_ms = saturating_millis(timeout);
        self
    }

    /// Set the timeout grace period
    pub fn timeout_grace(mut self, grace: Duration) -> Self {
        self.timeout_grace_ms = saturating_millis(grace);
        self
    }

    /// Run tasks in containers built from `image`
    pub fn container(mut self, image: impl Into<String>) -> Self {
        self.sandbox = SandboxKind::Container;
        self.sandbox_image = image.into();
        self
    }

    /// Set memory hint
    pub fn sandbox_memory(mut self, memory: impl Into<String>) -> Self {
        self.sandbox_memory = Some(memory.into());
        self
    }

    /// Set CPU hint
    pub fn sandbox_cpu(mut self, cpus: impl Into<String>) -> Self {
        self.sandbox_cpu = Some(cpus.into());
        self
    }

    /// Enable or disable synthesis
    pub fn synthesize(mut self, enabled: bool) -> Self {
        self.synthesize = enabled;
        self
    }

    /// Add an output tag
    pub fn output_tag(mut self, tag: impl Into<String>) -> Self {
        self.output_tags.insert(tag.into());
        self
    }

    /// Replace the agent command
    pub fn agent_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.agent_command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable for agent processes
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_max_concurrency() -> usize {
    4
}

fn default_per_task_timeout_ms() -> u64 {
    30 * 60 * 1000
}

fn default_timeout_grace_ms() -> u64 {
    30 * 1000
}

fn default_sandbox_image() -> String {
    "swarm/agent:latest".into()
}

fn default_sandbox_memory() -> Option<String> {
    Some("4G".into())
}

fn default_sandbox_cpu() -> Option<String> {
    Some("2".into())
}

fn default_agent_command() -> Vec<String> {
    vec![
        "claude".into(),
        "--print".into(),
        "--dangerously-skip-permissions".into(),
    ]
}

fn default_poll_interval_ms() -> u64 {
    1000
}
