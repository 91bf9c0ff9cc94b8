//! Docker CLI sandbox host

use crate::{SandboxError, SandboxHost, SandboxResult, UnitHandle, UnitSpec, UnitState, UnitStatus};
use async_trait::async_trait;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

/// Drives units through the `docker` command line
#[derive(Debug, Clone)]
pub struct DockerHost {
    binary: String,
}

impl DockerHost {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Use a different docker-compatible binary (e.g. `podman`)
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn docker<I, S>(&self, args: I) -> SandboxResult<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SandboxError::unavailable(format!("failed to run {}: {}", self.binary, e)))
    }
}

impl Default for DockerHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxHost for DockerHost {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn is_reachable(&self) -> bool {
        match self.docker(["info", "--format", "{{.ServerVersion}}"]).await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    async fn warm_up(&self, image: &str) -> SandboxResult<()> {
        let inspect = self.docker(["image", "inspect", image]).await?;
        if inspect.status.success() {
            debug!(image, "Image exists locally");
            return Ok(());
        }

        info!(image, "Pulling image");
        let pull = self.docker(["pull", image]).await?;
        if !pull.status.success() {
            return Err(SandboxError::unavailable(format!(
                "failed to pull {}: {}",
                image,
                String::from_utf8_lossy(&pull.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn create_unit(&self, spec: &UnitSpec) -> SandboxResult<UnitHandle> {
        let output = self.docker(run_args(spec)).await?;
        if !output.status.success() {
            return Err(SandboxError::create_failed(format!(
                "docker run {} failed: {}",
                spec.name,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(UnitHandle::new(&spec.name))
    }

    async fn poll_status(&self, handle: &UnitHandle) -> SandboxResult<UnitStatus> {
        let output = self
            .docker([
                "inspect",
                "--format",
                "{{.State.Status}} {{.State.ExitCode}}",
                handle.as_str(),
            ])
            .await?;
        if !output.status.success() {
            return Err(SandboxError::execution_failed(format!(
                "docker inspect {} failed: {}",
                handle,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_inspect(&String::from_utf8_lossy(&output.stdout))
    }

    async fn fetch_logs(&self, handle: &UnitHandle) -> SandboxResult<String> {
        let output = self.docker(["logs", handle.as_str()]).await?;
        if !output.status.success() {
            return Err(SandboxError::execution_failed(format!(
                "docker logs {} failed: {}",
                handle,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    async fn delete_unit(&self, handle: &UnitHandle) -> SandboxResult<()> {
        let output = self.docker(["rm", "-f", handle.as_str()]).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() || stderr.contains("No such container") {
            return Ok(());
        }
        Err(SandboxError::execution_failed(format!(
            "docker rm {} failed: {}",
            handle,
            stderr.trim()
        )))
    }
}

/// Arguments for `docker run` that start `spec` detached
pub fn run_args(spec: &UnitSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "-v".to_string(),
        format!("{}:{}", spec.workspace.display(), spec.mount_point),
        "-w".to_string(),
        spec.mount_point.clone(),
    ];
    if let Some(mem) = &spec.memory_limit {
        args.push("-m".to_string());
        args.push(mem.clone());
    }
    if let Some(cpus) = &spec.cpu_limit {
        args.push("--cpus".to_string());
        args.push(cpus.clone());
    }
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

/// Parse `docker inspect --format '{{.State.Status}} {{.State.ExitCode}}'`
pub fn parse_inspect(raw: &str) -> SandboxResult<UnitStatus> {
    let mut parts = raw.split_whitespace();
    let state = parts
        .next()
        .ok_or_else(|| SandboxError::execution_failed("empty docker inspect output"))?;
    let exit_code = parts.next().and_then(|c| c.parse::<i32>().ok());

    let status = match state {
        "created" => UnitStatus {
            state: UnitState::Pending,
            exit_code: None,
        },
        "running" | "restarting" | "paused" | "removing" => UnitStatus::running(),
        "exited" => UnitStatus::exited(exit_code.unwrap_or(1)),
        "dead" => UnitStatus {
            state: UnitState::Failed,
            exit_code,
        },
        other => {
            return Err(SandboxError::execution_failed(format!(
                "unknown container state: {other}"
            )));
        }
    };
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_args_include_limits_and_mount() {
        let spec = UnitSpec::new("swarm-abc", "swarm/agent:latest", "/tmp/ws")
            .command(vec!["claude".into(), "--print".into(), "hi".into()])
            .env("TASK_ID", "abc")
            .memory_limit("4G")
            .cpu_limit("2");

        let args = run_args(&spec);
        assert_eq!(&args[..4], ["run", "-d", "--name", "swarm-abc"]);
        assert!(args.contains(&"/tmp/ws:/workspace".to_string()));
        assert!(args.windows(2).any(|w| w == ["-m", "4G"]));
        assert!(args.windows(2).any(|w| w == ["--cpus", "2"]));
        assert!(args.windows(2).any(|w| w == ["-e", "TASK_ID=abc"]));

        let image_pos = args.iter().position(|a| a == "swarm/agent:latest").unwrap();
        assert_eq!(&args[image_pos + 1..], ["claude", "--print", "hi"]);
    }

    #[test]
    fn run_args_without_limits() {
        let spec = UnitSpec::new("swarm-x", "alpine", "/ws").command(vec!["true".into()]);
        let args = run_args(&spec);
        assert!(!args.contains(&"-m".to_string()));
        assert!(!args.contains(&"--cpus".to_string()));
    }

    #[test]
    fn parse_inspect_states() {
        assert_eq!(parse_inspect("running 0\n").unwrap(), UnitStatus::running());
        assert_eq!(parse_inspect("exited 0").unwrap(), UnitStatus::exited(0));
        assert_eq!(parse_inspect("exited 137").unwrap().state, UnitState::Failed);
        assert_eq!(parse_inspect("created 0").unwrap().state, UnitState::Pending);
        assert_eq!(parse_inspect("dead 1").unwrap().state, UnitState::Failed);
        assert!(parse_inspect("").is_err());
        assert!(parse_inspect("exploded 0").is_err());
    }
}
