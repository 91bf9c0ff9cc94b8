//! Live registry of in-flight tasks
//!
//! A side-channel projection for dashboards. Workers publish updates; the
//! registry never owns a task's lifetime. One instance is built by the
//! caller and shared by reference, and every operation holds the lock only
//! for a map lookup or insert.

use crate::task::{AgentTask, TaskId, TaskStatus, TokenUsage};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

/// Length of the prompt preview kept per entry
const PROMPT_PREVIEW_CHARS: usize = 80;

/// Snapshot of one in-flight task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryEntry {
    pub id: TaskId,
    pub prompt: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub workspace_path: Option<PathBuf>,
    pub sandbox_handle: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
}

/// Partial update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub workspace_path: Option<Option<PathBuf>>,
    pub sandbox_handle: Option<Option<String>>,
    pub usage: Option<TokenUsage>,
}

impl TaskUpdate {
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn workspace_path(mut self, path: Option<PathBuf>) -> Self {
        self.workspace_path = Some(path);
        self
    }

    pub fn sandbox_handle(mut self, handle: Option<String>) -> Self {
        self.sandbox_handle = Some(handle);
        self
    }

    pub fn usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

#[derive(Debug)]
struct Slot {
    entry: RegistryEntry,
    started: Instant,
}

/// Thread-safe table of running tasks keyed by id
#[derive(Debug, Default)]
pub struct TaskRegistry {
    slots: Mutex<HashMap<TaskId, Slot>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a task; re-registering replaces the old entry
    pub fn register(&self, task: &AgentTask) {
        let entry = RegistryEntry {
            id: task.id(),
            prompt: task.prompt_preview(PROMPT_PREVIEW_CHARS),
            status: task.status(),
            started_at: task.started_at().unwrap_or_else(Utc::now),
            elapsed_secs: 0.0,
            workspace_path: task.workspace_path().map(PathBuf::from),
            sandbox_handle: task.sandbox_handle().map(str::to_string),
            input_tokens: None,
            output_tokens: None,
            cost_usd: None,
        };
        self.slots.lock().insert(
            task.id(),
            Slot {
                entry,
                started: Instant::now(),
            },
        );
    }

    /// Apply a partial update; returns false if the task is not registered
    pub fn update(&self, id: &TaskId, update: TaskUpdate) -> bool {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(id) else {
            return false;
        };
        let entry = &mut slot.entry;
        if let Some(status) = update.status {
            entry.status = status;
        }
        if let Some(path) = update.workspace_path {
            entry.workspace_path = path;
        }
        if let Some(handle) = update.sandbox_handle {
            entry.sandbox_handle = handle;
        }
        if let Some(usage) = update.usage {
            entry.input_tokens = Some(usage.input_tokens);
            entry.output_tokens = Some(usage.output_tokens);
            entry.cost_usd = usage.cost_usd;
        }
        true
    }

    /// Stop tracking a task; returns the final snapshot if it was registered
    pub fn unregister(&self, id: &TaskId) -> Option<RegistryEntry> {
        self.slots
            .lock()
            .remove(id)
            .map(|slot| snapshot(&slot))
    }

    /// Snapshot of one entry
    pub fn get(&self, id: &TaskId) -> Option<RegistryEntry> {
        self.slots.lock().get(id).map(snapshot)
    }

    /// Snapshot of every entry, oldest first
    pub fn list(&self) -> Vec<RegistryEntry> {
        let mut entries: Vec<RegistryEntry> = self.slots.lock().values().map(snapshot).collect();
        entries.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        entries
    }

    pub fn count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of entries currently in `running`
    pub fn running_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.entry.status == TaskStatus::Running)
            .count()
    }
}

fn snapshot(slot: &Slot) -> RegistryEntry {
    let mut entry = slot.entry.clone();
    entry.elapsed_secs = slot.started.elapsed().as_secs_f64();
    entry
}
