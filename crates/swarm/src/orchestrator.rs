//! Swarm orchestrator - bounded parallel execution of agent prompts
//!
//! Each prompt becomes one [`AgentTask`]. Workers hold one of
//! `max_concurrency` semaphore permits for the whole time a task is
//! `running`: acquire a workspace, execute in the sandbox, release the
//! workspace, persist the output. Failures stay inside their own task;
//! `run` returns only after every task is terminal.

use crate::config::{SandboxKind, SwarmConfig};
use crate::error::{Result, SwarmError};
use crate::output::AgentOutput;
use crate::registry::{TaskRegistry, TaskUpdate};
use crate::result::SwarmResult;
use crate::runner::AgentRunner;
use crate::sink::PersistenceSink;
use crate::synthesizer::Synthesizer;
use crate::task::AgentTask;
use crate::workspace::WorkspaceProvider;
use futures::FutureExt;
use sandbox::{
    ContainerSandbox, ContainerSettings, DockerHost, ExecRequest, LocalProcessSandbox,
    SandboxHost, SandboxProvider,
};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

/// Tag added to every document a swarm run persists
pub const SWARM_TAG: &str = "swarm";

/// Tag added to the synthesis document
pub const SYNTHESIS_TAG: &str = "synthesis";

/// How much failing output is quoted in a task's error
const ERROR_TAIL_CHARS: usize = 500;

/// Prompt characters used in document titles
const TITLE_PROMPT_CHARS: usize = 60;

/// Pick the sandbox strategy for a configuration
///
/// Container runs use `host`, or the docker CLI when none is given.
pub fn select_sandbox(
    config: &SwarmConfig,
    host: Option<Arc<dyn SandboxHost>>,
) -> Arc<dyn SandboxProvider> {
    match config.sandbox {
        SandboxKind::Local => Arc::new(LocalProcessSandbox::new()),
        SandboxKind::Container => {
            let host = host.unwrap_or_else(|| Arc::new(DockerHost::new()));
            let mut settings =
                ContainerSettings::new(&config.sandbox_image).poll_interval(config.poll_interval());
            if let Some(mem) = &config.sandbox_memory {
                settings = settings.memory_limit(mem);
            }
            if let Some(cpus) = &config.sandbox_cpu {
                settings = settings.cpu_limit(cpus);
            }
            Arc::new(ContainerSandbox::new(host, settings))
        }
    }
}

/// Runs batches of prompts through a bounded worker pool
pub struct Orchestrator {
    workspaces: Arc<dyn WorkspaceProvider>,
    sandbox: Arc<dyn SandboxProvider>,
    sink: Arc<dyn PersistenceSink>,
    registry: Arc<TaskRegistry>,
    synthesizer: Option<Arc<Synthesizer>>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// The registry workers publish to
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Name of the sandbox strategy in use
    pub fn sandbox_name(&self) -> &'static str {
        self.sandbox.name()
    }

    /// Run every prompt to a terminal state
    ///
    /// `on_progress` is called exactly once per task, in completion order.
    /// Only configuration problems return `Err`; task failures are reported
    /// inside the [`SwarmResult`].
    pub async fn run<I, S, F>(
        &self,
        prompts: I,
        config: &SwarmConfig,
        mut on_progress: F,
    ) -> Result<SwarmResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnMut(&AgentTask),
    {
        config.validate()?;
        if config.synthesize && self.synthesizer.is_none() {
            return Err(SwarmError::invalid_config(
                "synthesize is enabled but no agent runner is configured",
            ));
        }
        self.sandbox.prepare().await.map_err(|e| {
            SwarmError::sandbox_unavailable(format!("{} sandbox: {}", self.sandbox.name(), e))
        })?;

        let started = Instant::now();
        let tasks: Vec<AgentTask> = prompts.into_iter().map(AgentTask::new).collect();
        let total = tasks.len();
        info!(
            tasks = total,
            max_concurrency = config.max_concurrency,
            sandbox = self.sandbox.name(),
            "Starting swarm run"
        );

        let worker = Arc::new(Worker {
            workspaces: self.workspaces.clone(),
            sandbox: self.sandbox.clone(),
            sink: self.sink.clone(),
            registry: self.registry.clone(),
            config: config.clone(),
        });
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        let (tx, mut rx) = mpsc::channel::<AgentTask>(total.max(1));

        let mut handles = Vec::with_capacity(total);
        for mut task in tasks {
            let id = task.id();
            let prompt = task.prompt().to_string();
            let worker = worker.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();

            let handle = tokio::spawn(async move {
                match semaphore.acquire_owned().await {
                    Ok(_permit) => worker.run(&mut task).await,
                    Err(_) => task.fail("worker pool closed before the task started"),
                }
                let _ = tx.send(task).await;
            });
            handles.push((id, prompt, handle));
        }
        drop(tx);

        let mut finished: Vec<AgentTask> = Vec::with_capacity(total);
        while let Some(task) = rx.recv().await {
            on_progress(&task);
            finished.push(task);
        }

        // Workers that died before reporting still owe the caller a task
        for (id, prompt, handle) in handles {
            let Err(join_error) = handle.await else {
                continue;
            };
            if finished.iter().any(|t| t.id() == id) {
                continue;
            }
            let reason = if join_error.is_panic() {
                format!("worker panicked: {}", panic_message(&*join_error.into_panic()))
            } else {
                "worker was cancelled".to_string()
            };
            error!(task_id = %id, error = %reason, "Worker died without reporting");
            self.registry.unregister(&id);

            let mut task = AgentTask::with_id(id, prompt);
            task.fail(reason);
            on_progress(&task);
            finished.push(task);
        }

        let synthesis_doc_id = if config.synthesize {
            self.synthesize(&finished, config).await
        } else {
            None
        };

        let result = SwarmResult::new(finished, started.elapsed(), synthesis_doc_id);
        info!(
            successful = result.successful_count,
            failed = result.failed_count,
            duration_secs = result.total_duration.as_secs_f64(),
            synthesis = result.synthesis_doc_id.is_some(),
            "Swarm run finished"
        );
        Ok(result)
    }

    async fn synthesize(&self, tasks: &[AgentTask], config: &SwarmConfig) -> Option<String> {
        let completed: Vec<&AgentTask> = tasks.iter().filter(|t| t.is_completed()).collect();
        if completed.is_empty() {
            info!("No task completed, skipping synthesis");
            return None;
        }
        let synthesizer = self.synthesizer.as_ref()?;

        let summary = match AssertUnwindSafe(
            synthesizer.synthesize(&completed, config.task_timeout()),
        )
        .catch_unwind()
        .await
        {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                warn!(error = %e, "Synthesis failed, no summary document produced");
                return None;
            }
            Err(panic) => {
                error!(error = %panic_message(&*panic), "Synthesis panicked, no summary document produced");
                return None;
            }
        };

        let title = format!("Swarm synthesis ({} tasks)", completed.len());
        let tags = document_tags(config, &[SWARM_TAG, SYNTHESIS_TAG]);
        match AssertUnwindSafe(self.sink.save(&title, &summary, &tags))
            .catch_unwind()
            .await
        {
            Ok(Ok(doc_id)) => {
                info!(doc_id = %doc_id, "Synthesis saved");
                Some(doc_id)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to save synthesis");
                None
            }
            Err(panic) => {
                error!(error = %panic_message(&*panic), "Saving synthesis panicked");
                None
            }
        }
    }
}

/// Shared state every worker runs with
struct Worker {
    workspaces: Arc<dyn WorkspaceProvider>,
    sandbox: Arc<dyn SandboxProvider>,
    sink: Arc<dyn PersistenceSink>,
    registry: Arc<TaskRegistry>,
    config: SwarmConfig,
}

impl Worker {
    /// Drive one task from pending to a terminal state
    async fn run(&self, task: &mut AgentTask) {
        let started = Instant::now();
        task.start();
        self.registry.register(task);
        info!(task_id = %task.id(), prompt = %task.prompt_preview(TITLE_PROMPT_CHARS), "Task started");

        match self.attempt(task).await {
            Ok(output) => self.complete(task, output).await,
            Err(reason) => task.fail(reason),
        }
        task.set_duration(started.elapsed());
        self.registry.unregister(&task.id());

        match task.error() {
            None => info!(
                task_id = %task.id(),
                duration_secs = started.elapsed().as_secs_f64(),
                doc_id = task.output_doc_id().unwrap_or("-"),
                "Task completed"
            ),
            Some(error) => warn!(
                task_id = %task.id(),
                duration_secs = started.elapsed().as_secs_f64(),
                error = %error,
                "Task failed"
            ),
        }
    }

    /// Acquire a workspace, execute, and release the workspace on every path
    async fn attempt(&self, task: &mut AgentTask) -> std::result::Result<AgentOutput, String> {
        let id = task.id();
        let path = AssertUnwindSafe(self.workspaces.acquire(&id))
            .catch_unwind()
            .await
            .map_err(|panic| format!("worker panicked: {}", panic_message(&*panic)))?
            .map_err(|e| format!("workspace acquire failed: {e}"))?;

        task.set_workspace(Some(path.clone()));
        self.registry
            .update(&id, TaskUpdate::default().workspace_path(Some(path.clone())));
        debug!(task_id = %id, workspace = %path.display(), "Workspace acquired");

        let outcome = self.execute_in(task, &path).await;

        match AssertUnwindSafe(self.workspaces.release(&path))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => debug!(task_id = %id, workspace = %path.display(), "Workspace released"),
            Ok(Err(e)) => warn!(
                task_id = %id,
                workspace = %path.display(),
                error = %e,
                "Failed to release workspace"
            ),
            Err(panic) => error!(
                task_id = %id,
                workspace = %path.display(),
                error = %panic_message(&*panic),
                "Workspace release panicked"
            ),
        }
        task.set_workspace(None);
        self.registry
            .update(&id, TaskUpdate::default().workspace_path(None));

        outcome
    }

    async fn execute_in(
        &self,
        task: &mut AgentTask,
        workspace: &Path,
    ) -> std::result::Result<AgentOutput, String> {
        let id = task.id();
        let request = ExecRequest::new(self.config.command_for(task.prompt()), workspace)
            .envs(self.config.env.clone())
            .env("SWARM_TASK_ID", id.to_string())
            .timeout(self.config.task_timeout());

        task.set_sandbox_handle(Some(request.unit_name.clone()));
        self.registry.update(
            &id,
            TaskUpdate::default().sandbox_handle(Some(request.unit_name.clone())),
        );
        debug!(task_id = %id, unit = %request.unit_name, sandbox = self.sandbox.name(), "Executing");

        let backstop = self.config.backstop_timeout();
        let result = AssertUnwindSafe(tokio::time::timeout(backstop, self.sandbox.execute(&request)))
            .catch_unwind()
            .await;

        task.set_sandbox_handle(None);
        self.registry
            .update(&id, TaskUpdate::default().sandbox_handle(None));

        let output = match result {
            Err(panic) => return Err(format!("worker panicked: {}", panic_message(&*panic))),
            Ok(Err(_elapsed)) => {
                return Err(format!(
                    "timed out after {}s (sandbox did not return)",
                    backstop.as_secs_f64()
                ));
            }
            Ok(Ok(Err(e))) => return Err(e.to_string()),
            Ok(Ok(Ok(output))) => output,
        };

        if !output.success() {
            return Err(format!(
                "agent exited with status {}: {}",
                output.exit_code,
                output.tail(ERROR_TAIL_CHARS)
            ));
        }

        let raw = if output.stdout.trim().is_empty() {
            output.combined()
        } else {
            output.stdout
        };
        let parsed = AgentOutput::parse(&raw);
        if parsed.is_error {
            return Err(format!("agent reported an error: {}", parsed.text));
        }
        if let Some(usage) = parsed.usage {
            task.set_usage(Some(usage));
            self.registry.update(&id, TaskUpdate::default().usage(usage));
        }
        Ok(parsed)
    }

    /// Persist the output (best effort) and mark the task completed
    async fn complete(&self, task: &mut AgentTask, output: AgentOutput) {
        let title = format!("Swarm: {}", task.prompt_preview(TITLE_PROMPT_CHARS));
        let content = format!(
            "## Prompt\n\n{}\n\n## Output\n\n{}\n",
            task.prompt().trim(),
            output.text
        );
        let tags = document_tags(&self.config, &[SWARM_TAG]);

        let doc_id = match self.sink.save(&title, &content, &tags).await {
            Ok(doc_id) => Some(doc_id),
            Err(e) => {
                warn!(task_id = %task.id(), error = %e, "Failed to persist task output");
                None
            }
        };
        task.complete(output.text, doc_id);
    }
}

fn document_tags(config: &SwarmConfig, extra: &[&str]) -> Vec<String> {
    let mut tags = config.output_tags.clone();
    tags.extend(extra.iter().map(|t| t.to_string()));
    tags.into_iter().collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for creating an orchestrator
pub struct OrchestratorBuilder {
    workspaces: Option<Arc<dyn WorkspaceProvider>>,
    sandbox: Option<Arc<dyn SandboxProvider>>,
    sink: Option<Arc<dyn PersistenceSink>>,
    registry: Option<Arc<TaskRegistry>>,
    runner: Option<Arc<dyn AgentRunner>>,
    synthesis_dir: Option<PathBuf>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            workspaces: None,
            sandbox: None,
            sink: None,
            registry: None,
            runner: None,
            synthesis_dir: None,
        }
    }

    /// Set the workspace provider
    pub fn workspaces(mut self, provider: Arc<dyn WorkspaceProvider>) -> Self {
        self.workspaces = Some(provider);
        self
    }

    /// Set the sandbox provider
    pub fn sandbox(mut self, provider: Arc<dyn SandboxProvider>) -> Self {
        self.sandbox = Some(provider);
        self
    }

    /// Set the persistence sink
    pub fn sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Share an existing registry; a fresh one is created otherwise
    pub fn registry(mut self, registry: Arc<TaskRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the agent runner used for synthesis
    pub fn runner(mut self, runner: Arc<dyn AgentRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Directory the synthesis agent runs in (defaults to the current directory)
    pub fn synthesis_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.synthesis_dir = Some(dir.into());
        self
    }

    /// Build the orchestrator
    pub fn build(self) -> Result<Orchestrator> {
        let workspaces = self
            .workspaces
            .ok_or_else(|| SwarmError::invalid_config("workspace provider required"))?;
        let sandbox = self
            .sandbox
            .ok_or_else(|| SwarmError::invalid_config("sandbox provider required"))?;
        let sink = self
            .sink
            .ok_or_else(|| SwarmError::invalid_config("persistence sink required"))?;

        let synthesis_dir = match self.synthesis_dir {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        let synthesizer = self
            .runner
            .map(|runner| Arc::new(Synthesizer::new(runner, synthesis_dir)));

        Ok(Orchestrator {
            workspaces,
            sandbox,
            sink,
            registry: self.registry.unwrap_or_default(),
            synthesizer,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
