//! Port for hosts that run disposable compute units

use crate::SandboxResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Where the workspace is mounted inside a unit
pub const DEFAULT_MOUNT_POINT: &str = "/workspace";

/// Opaque reference to a unit created by a [`SandboxHost`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitHandle(String);

impl UnitHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a host needs to start one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpec {
    /// Unique unit name
    pub name: String,
    /// Image / template to start from
    pub image: String,
    /// Host workspace path to mount
    pub workspace: PathBuf,
    /// Mount point and working directory inside the unit
    pub mount_point: String,
    /// Command and arguments
    pub command: Vec<String>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Memory limit hint (e.g. "4G")
    pub memory_limit: Option<String>,
    /// CPU limit hint (e.g. "2")
    pub cpu_limit: Option<String>,
}

impl UnitSpec {
    /// Create a spec with the default mount point and no limits
    pub fn new(name: impl Into<String>, image: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            workspace: workspace.into(),
            mount_point: DEFAULT_MOUNT_POINT.to_string(),
            command: Vec::new(),
            env: BTreeMap::new(),
            memory_limit: None,
            cpu_limit: None,
        }
    }

    pub fn command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn memory_limit(mut self, limit: impl Into<String>) -> Self {
        self.memory_limit = Some(limit.into());
        self
    }

    pub fn cpu_limit(mut self, cpus: impl Into<String>) -> Self {
        self.cpu_limit = Some(cpus.into());
        self
    }

    pub fn mount_point(mut self, path: impl Into<String>) -> Self {
        self.mount_point = path.into();
        self
    }
}

/// Lifecycle state of a unit as reported by its host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// Created but not started
    Pending,
    /// Executing
    Running,
    /// Finished with exit status zero
    Succeeded,
    /// Finished with a non-zero status or crashed
    Failed,
}

impl UnitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Succeeded | UnitState::Failed)
    }
}

/// Result of polling a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitStatus {
    pub state: UnitState,
    /// Exit code, once known
    pub exit_code: Option<i32>,
}

impl UnitStatus {
    pub fn running() -> Self {
        Self {
            state: UnitState::Running,
            exit_code: None,
        }
    }

    pub fn exited(exit_code: i32) -> Self {
        let state = if exit_code == 0 {
            UnitState::Succeeded
        } else {
            UnitState::Failed
        };
        Self {
            state,
            exit_code: Some(exit_code),
        }
    }
}

/// A cluster or container runtime that creates and destroys units
#[async_trait]
pub trait SandboxHost: Send + Sync {
    /// Human-readable name for this host
    fn name(&self) -> &'static str;

    /// Whether the host answers at all
    async fn is_reachable(&self) -> bool;

    /// Pre-fetch whatever the image needs before the first unit starts
    async fn warm_up(&self, _image: &str) -> SandboxResult<()> {
        Ok(())
    }

    /// Start a unit
    async fn create_unit(&self, spec: &UnitSpec) -> SandboxResult<UnitHandle>;

    /// Report the unit's current state
    async fn poll_status(&self, handle: &UnitHandle) -> SandboxResult<UnitStatus>;

    /// Captured stdout/stderr of the unit
    async fn fetch_logs(&self, handle: &UnitHandle) -> SandboxResult<String>;

    /// Destroy the unit, terminating it if still running
    async fn delete_unit(&self, handle: &UnitHandle) -> SandboxResult<()>;
}
