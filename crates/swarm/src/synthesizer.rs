//! Combines successful task outputs into one summary
//!
//! Best effort: when the agent call fails the run still succeeds, it just
//! produces no synthesis document.

use crate::error::{Result, SwarmError};
use crate::output::AgentOutput;
use crate::runner::AgentRunner;
use crate::task::AgentTask;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const SYNTHESIS_INSTRUCTIONS: &str = "You are given the results of several independent agent tasks. \
Write one combined summary: merge overlapping findings, call out disagreements, \
and keep concrete details (file names, commands, numbers).";

/// Runs the agent once over all completed outputs
pub struct Synthesizer {
    runner: Arc<dyn AgentRunner>,
    workdir: PathBuf,
}

impl Synthesizer {
    pub fn new(runner: Arc<dyn AgentRunner>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            workdir: workdir.into(),
        }
    }

    /// Build the combined prompt from prompt/output pairs
    pub fn build_prompt(tasks: &[&AgentTask]) -> String {
        let mut prompt = format!("{SYNTHESIS_INSTRUCTIONS}\n\n");
        for (i, task) in tasks.iter().enumerate() {
            prompt.push_str(&format!("## Task {}\n\n### Prompt\n{}\n\n", i + 1, task.prompt().trim()));
            prompt.push_str(&format!(
                "### Output\n{}\n\n",
                task.result().unwrap_or_default().trim()
            ));
        }
        prompt.push_str("## Combined summary\n");
        prompt
    }

    /// Summarize the completed tasks; errors if none completed or the agent fails
    pub async fn synthesize(&self, tasks: &[&AgentTask], timeout: Duration) -> Result<String> {
        let completed: Vec<&AgentTask> = tasks.iter().copied().filter(|t| t.is_completed()).collect();
        if completed.is_empty() {
            return Err(SwarmError::runner("no completed tasks to synthesize"));
        }

        info!(tasks = completed.len(), "Synthesizing outputs");
        let prompt = Self::build_prompt(&completed);
        debug!(prompt_chars = prompt.len(), "Synthesis prompt built");

        let output = self.runner.invoke(&prompt, &self.workdir, timeout).await?;
        if !output.success() {
            return Err(SwarmError::runner(format!(
                "synthesis agent exited with status {}",
                output.exit_code
            )));
        }

        let parsed = AgentOutput::parse(&output.output);
        if parsed.is_error {
            return Err(SwarmError::runner(format!(
                "synthesis agent reported an error: {}",
                parsed.text
            )));
        }
        if parsed.text.is_empty() {
            return Err(SwarmError::runner("synthesis agent returned no text"));
        }
        Ok(parsed.text)
    }
}
