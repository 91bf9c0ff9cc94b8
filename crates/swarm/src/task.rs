//! Agent task types
//!
//! One [`AgentTask`] exists per submitted prompt. Its status only moves
//! forward: `pending -> running -> {completed, failed}`, and a terminal
//! status is never left.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Unique, never-reused task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Hyphen-free form, safe for branch and directory names
    pub fn simple(&self) -> String {
        self.0.simple().to_string()
    }

    /// First 8 hex digits, for log lines
    pub fn short(&self) -> String {
        self.simple()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting for a worker
    #[default]
    Pending,
    /// Holding a worker slot
    Running,
    /// Agent finished successfully
    Completed,
    /// Agent failed, timed out, or could not start
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Check if transition to target status is valid
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        matches!(
            (self, target),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token and cost counters reported by the agent, when available
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: Option<f64>,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One unit of work: a prompt and everything learned while running it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    id: TaskId,
    prompt: String,
    status: TaskStatus,
    workspace_path: Option<PathBuf>,
    sandbox_handle: Option<String>,
    result: Option<String>,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    duration: Option<Duration>,
    output_doc_id: Option<String>,
    usage: Option<TokenUsage>,
}

impl AgentTask {
    /// Create a pending task with a fresh id
    pub fn new(prompt: impl Into<String>) -> Self {
        Self::with_id(TaskId::new(), prompt)
    }

    pub(crate) fn with_id(id: TaskId, prompt: impl Into<String>) -> Self {
        Self {
            id,
            prompt: prompt.into(),
            status: TaskStatus::Pending,
            workspace_path: None,
            sandbox_handle: None,
            result: None,
            error: None,
            started_at: None,
            duration: None,
            output_doc_id: None,
            usage: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn workspace_path(&self) -> Option<&Path> {
        self.workspace_path.as_deref()
    }

    pub fn sandbox_handle(&self) -> Option<&str> {
        self.sandbox_handle.as_deref()
    }

    /// Captured output, present only when completed
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Failure reason, present only when failed
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn output_doc_id(&self) -> Option<&str> {
        self.output_doc_id.as_deref()
    }

    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }

    /// First `max_chars` characters of the prompt on one line
    pub fn prompt_preview(&self, max_chars: usize) -> String {
        let flat = self.prompt.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= max_chars {
            return flat;
        }
        let mut preview: String = flat.chars().take(max_chars).collect();
        preview.push('…');
        preview
    }

    fn transition(&mut self, target: TaskStatus) -> bool {
        if !self.status.can_transition_to(target) {
            tracing::warn!(
                task_id = %self.id,
                from = %self.status,
                to = %target,
                "Ignoring invalid task transition"
            );
            return false;
        }
        self.status = target;
        true
    }

    pub(crate) fn start(&mut self) {
        if self.transition(TaskStatus::Running) {
            self.started_at = Some(Utc::now());
        }
    }

    pub(crate) fn set_workspace(&mut self, path: Option<PathBuf>) {
        self.workspace_path = path;
    }

    pub(crate) fn set_sandbox_handle(&mut self, handle: Option<String>) {
        self.sandbox_handle = handle;
    }

    pub(crate) fn set_usage(&mut self, usage: Option<TokenUsage>) {
        self.usage = usage;
    }

    pub(crate) fn complete(&mut self, output: String, doc_id: Option<String>) {
        if self.transition(TaskStatus::Completed) {
            self.result = Some(output);
            self.output_doc_id = doc_id;
        }
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>) {
        if self.transition(TaskStatus::Failed) {
            let error = error.into();
            self.error = Some(if error.trim().is_empty() {
                "unknown error".to_string()
            } else {
                error
            });
        }
    }

    pub(crate) fn set_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }
}
