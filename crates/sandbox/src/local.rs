//! Local child-process sandbox
//!
//! Used when no sandbox host is configured. Same contract as the container
//! variant, weaker isolation: the command runs as a plain child process
//! rooted at the workspace directory.

use crate::{ExecOutput, ExecRequest, SandboxError, SandboxProvider, SandboxResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs commands as local subprocesses
#[derive(Debug, Clone, Default)]
pub struct LocalProcessSandbox {
    /// Start from an empty environment instead of inheriting the parent's
    clear_env: bool,
}

impl LocalProcessSandbox {
    /// Create a sandbox that inherits the parent environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not inherit the parent environment; only request variables are set
    pub fn clear_env(mut self, clear: bool) -> Self {
        self.clear_env = clear;
        self
    }
}

#[async_trait]
impl SandboxProvider for LocalProcessSandbox {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn execute(&self, request: &ExecRequest) -> SandboxResult<ExecOutput> {
        let (program, args) = request
            .command
            .split_first()
            .ok_or_else(|| SandboxError::invalid_request("empty command"))?;

        if !request.workdir.is_dir() {
            return Err(SandboxError::invalid_request(format!(
                "workdir {} does not exist",
                request.workdir.display()
            )));
        }

        debug!(
            program = %program,
            workdir = %request.workdir.display(),
            timeout_secs = request.timeout.as_secs(),
            "Spawning local process"
        );

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&request.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if self.clear_env {
            command.env_clear();
        }
        command.envs(&request.env);

        let mut child = command.spawn().map_err(|e| {
            SandboxError::execution_failed(format!("failed to spawn {program}: {e}"))
        })?;

        let mut stdout = tokio::spawn(drain(child.stdout.take()));
        let mut stderr = tokio::spawn(drain(child.stderr.take()));

        // One deadline covers the exit and the output drain; a background
        // grandchild may hold the pipes open after the child exits
        let finished = tokio::time::timeout(request.timeout, async {
            let status = child.wait().await?;
            let out = (&mut stdout).await.unwrap_or_default();
            let err = (&mut stderr).await.unwrap_or_default();
            Ok::<_, std::io::Error>((status, out, err))
        })
        .await;

        match finished {
            Ok(result) => {
                let (status, stdout, stderr) = result?;
                let output = ExecOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout,
                    stderr,
                };
                debug!(program = %program, exit_code = output.exit_code, "Local process exited");
                Ok(output)
            }
            Err(_) => {
                warn!(
                    program = %program,
                    timeout_secs = request.timeout.as_secs(),
                    "Local process timed out, killing"
                );
                if let Err(e) = child.kill().await {
                    warn!(program = %program, error = %e, "Failed to kill timed-out process");
                }
                stdout.abort();
                stderr.abort();
                Err(SandboxError::timeout(request.timeout))
            }
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!(error = %e, "Stopped reading process output");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
