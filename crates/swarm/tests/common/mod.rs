//! Scripted collaborators for orchestrator tests
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sandbox::{ExecOutput, ExecRequest, SandboxError, SandboxProvider, SandboxResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swarm::{
    AgentRunner, PersistenceSink, RunnerOutput, ScratchWorkspaceProvider, SwarmError, TaskId,
    TaskRegistry, WorkspaceProvider,
};

/// Prompt markers the scripted sandbox reacts to
pub const FAIL: &str = "FAIL";
pub const PANIC: &str = "PANIC";
pub const HANG: &str = "HANG";
pub const SLOW: &str = "SLOW";
pub const AGENT_ERROR: &str = "AGENT_ERROR";
pub const USAGE: &str = "USAGE";

/// Scratch directories plus counters of what is alive
pub struct CountingWorkspaces {
    inner: ScratchWorkspaceProvider,
    live: AtomicUsize,
    fail_acquire: bool,
    panic_on_release: bool,
    acquired: Mutex<Vec<PathBuf>>,
    released: Mutex<Vec<PathBuf>>,
}

impl CountingWorkspaces {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: ScratchWorkspaceProvider::new(root),
            live: AtomicUsize::new(0),
            fail_acquire: false,
            panic_on_release: false,
            acquired: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(root: &Path) -> Self {
        Self {
            fail_acquire: true,
            ..Self::new(root)
        }
    }

    /// Removes the workspace, then panics
    pub fn panicking_on_release(root: &Path) -> Self {
        Self {
            panic_on_release: true,
            ..Self::new(root)
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> Vec<PathBuf> {
        self.acquired.lock().clone()
    }

    pub fn released(&self) -> Vec<PathBuf> {
        self.released.lock().clone()
    }
}

#[async_trait]
impl WorkspaceProvider for CountingWorkspaces {
    async fn acquire(&self, task_id: &TaskId) -> swarm::Result<PathBuf> {
        if self.fail_acquire {
            return Err(SwarmError::workspace("disk full"));
        }
        let path = self.inner.acquire(task_id).await?;
        self.live.fetch_add(1, Ordering::SeqCst);
        self.acquired.lock().push(path.clone());
        Ok(path)
    }

    async fn release(&self, path: &Path) -> swarm::Result<()> {
        self.inner.release(path).await?;
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.released.lock().push(path.to_path_buf());
        if self.panic_on_release {
            panic!("release exploded for {}", path.display());
        }
        Ok(())
    }
}

/// Sandbox whose behaviour is chosen by markers in the prompt
pub struct ScriptedSandbox {
    delay: Duration,
    unavailable: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    executions: AtomicUsize,
    requests: Mutex<Vec<ExecRequest>>,
    registry: Option<Arc<TaskRegistry>>,
    registry_observations: Mutex<Vec<RegistryObservation>>,
}

/// What the shared registry showed while a request was executing
#[derive(Debug, Clone)]
pub struct RegistryObservation {
    pub running: usize,
    pub entry_has_workspace: bool,
}

impl ScriptedSandbox {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            unavailable: false,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            executions: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            registry: None,
            registry_observations: Mutex::new(Vec::new()),
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn observe(mut self, registry: Arc<TaskRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.lock().clone()
    }

    pub fn registry_observations(&self) -> Vec<RegistryObservation> {
        self.registry_observations.lock().clone()
    }

    fn observe_registry(&self, request: &ExecRequest) {
        let Some(registry) = &self.registry else {
            return;
        };
        let entries = registry.list();
        let entry_has_workspace = entries.iter().any(|e| {
            e.sandbox_handle.as_deref() == Some(request.unit_name.as_str())
                && e.workspace_path.as_deref() == Some(request.workdir.as_path())
        });
        self.registry_observations.lock().push(RegistryObservation {
            running: registry.running_count(),
            entry_has_workspace,
        });
    }

    async fn respond(&self, request: &ExecRequest) -> SandboxResult<ExecOutput> {
        let prompt = request.command.last().cloned().unwrap_or_default();

        if prompt.contains(PANIC) {
            panic!("scripted panic for {prompt}");
        }
        if prompt.contains(HANG) {
            // Ignores its timeout; only the orchestrator can stop it
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if prompt.contains(SLOW) {
            if request.timeout < Duration::from_secs(10) {
                tokio::time::sleep(request.timeout).await;
                return Err(SandboxError::timeout(request.timeout));
            }
            tokio::time::sleep(Duration::from_secs(10)).await;
        }

        tokio::time::sleep(self.delay).await;

        if prompt.contains(FAIL) {
            return Ok(ExecOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("boom: {prompt}"),
            });
        }
        if prompt.contains(AGENT_ERROR) {
            return Ok(ExecOutput {
                exit_code: 0,
                stdout: r#"{"type":"result","result":"rate limited","is_error":true}"#.to_string(),
                stderr: String::new(),
            });
        }
        if prompt.contains(USAGE) {
            return Ok(ExecOutput {
                exit_code: 0,
                stdout: concat!(
                    r#"{"type":"system","subtype":"init"}"#,
                    "\n",
                    r#"{"type":"result","result":"counted","is_error":false,"total_cost_usd":0.25,"usage":{"input_tokens":100,"output_tokens":40}}"#
                )
                .to_string(),
                stderr: String::new(),
            });
        }
        Ok(ExecOutput {
            exit_code: 0,
            stdout: format!("done: {prompt}\n"),
            stderr: "progress noise\n".to_string(),
        })
    }
}

#[async_trait]
impl SandboxProvider for ScriptedSandbox {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn prepare(&self) -> SandboxResult<()> {
        if self.unavailable {
            return Err(SandboxError::unavailable("daemon not running"));
        }
        Ok(())
    }

    async fn execute(&self, request: &ExecRequest) -> SandboxResult<ExecOutput> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.observe_registry(request);

        let guard = InFlight(&self.in_flight);
        let output = self.respond(request).await;
        drop(guard);
        output
    }
}

/// Decrements the in-flight counter even when the execution unwinds
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Agent runner that records prompts and returns a fixed reply
pub struct RecordingRunner {
    reply: String,
    exit_code: i32,
    panics: bool,
    prompts: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            exit_code: 0,
            panics: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: "crashed".to_string(),
            exit_code: 2,
            panics: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::failing()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl AgentRunner for RecordingRunner {
    async fn invoke(
        &self,
        prompt: &str,
        _cwd: &Path,
        _timeout: Duration,
    ) -> swarm::Result<RunnerOutput> {
        self.prompts.lock().push(prompt.to_string());
        if self.panics {
            panic!("synthesis runner exploded");
        }
        Ok(RunnerOutput {
            output: self.reply.clone(),
            exit_code: self.exit_code,
        })
    }
}

/// Sink that always fails
pub struct FailingSink;

#[async_trait]
impl PersistenceSink for FailingSink {
    async fn save(&self, _title: &str, _content: &str, _tags: &[String]) -> swarm::Result<String> {
        Err(SwarmError::persistence("store offline"))
    }
}

/// Sink that panics on every save
pub struct PanickingSink;

#[async_trait]
impl PersistenceSink for PanickingSink {
    async fn save(&self, _title: &str, _content: &str, _tags: &[String]) -> swarm::Result<String> {
        panic!("sink exploded");
    }
}
