//! Agent runner port
//!
//! Invokes the language-model CLI once with a prompt and returns its raw
//! output. Used directly by the synthesizer; task execution goes through a
//! sandbox provider instead.

use crate::error::{Result, SwarmError};
use async_trait::async_trait;
use sandbox::{ExecRequest, LocalProcessSandbox, SandboxProvider};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Raw result of one agent invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOutput {
    pub output: String,
    pub exit_code: i32,
}

impl RunnerOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the agent with a prompt in a working directory
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn invoke(&self, prompt: &str, cwd: &Path, timeout: Duration) -> Result<RunnerOutput>;
}

/// Runs `command + [prompt]` as a local process
#[derive(Debug, Clone)]
pub struct CliAgentRunner {
    command: Vec<String>,
    env: BTreeMap<String, String>,
    sandbox: LocalProcessSandbox,
}

impl CliAgentRunner {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            sandbox: LocalProcessSandbox::new(),
        }
    }

    /// Set environment for the agent process
    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

#[async_trait]
impl AgentRunner for CliAgentRunner {
    async fn invoke(&self, prompt: &str, cwd: &Path, timeout: Duration) -> Result<RunnerOutput> {
        if self.command.is_empty() {
            return Err(SwarmError::runner("agent command is empty"));
        }
        let mut command = self.command.clone();
        command.push(prompt.to_string());

        debug!(program = %command[0], cwd = %cwd.display(), "Invoking agent");
        let request = ExecRequest::new(command, cwd)
            .envs(self.env.clone())
            .timeout(timeout);
        let output = self.sandbox.execute(&request).await?;

        Ok(RunnerOutput {
            output: output.combined(),
            exit_code: output.exit_code,
        })
    }
}
