//! Disposable-container sandbox
//!
//! Creates one unit per execution on a [`SandboxHost`], polls it until it
//! reaches a terminal state or the timeout elapses, collects its logs, and
//! deletes it. Deletion happens on every exit path.

use crate::{
    ExecOutput, ExecRequest, SandboxError, SandboxHost, SandboxProvider, SandboxResult,
    UnitHandle, UnitSpec, UnitState,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default interval between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Resource settings applied to every unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSettings {
    /// Image / template identifier
    pub image: String,
    /// Memory limit hint
    pub memory_limit: Option<String>,
    /// CPU limit hint
    pub cpu_limit: Option<String>,
    /// How often to poll unit status
    pub poll_interval: Duration,
}

impl ContainerSettings {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            memory_limit: None,
            cpu_limit: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set memory limit
    pub fn memory_limit(mut self, limit: impl Into<String>) -> Self {
        self.memory_limit = Some(limit.into());
        self
    }

    /// Set CPU limit
    pub fn cpu_limit(mut self, cpus: impl Into<String>) -> Self {
        self.cpu_limit = Some(cpus.into());
        self
    }

    /// Set poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Runs each command in a fresh unit on a sandbox host
pub struct ContainerSandbox {
    host: Arc<dyn SandboxHost>,
    settings: ContainerSettings,
}

impl ContainerSandbox {
    pub fn new(host: Arc<dyn SandboxHost>, settings: ContainerSettings) -> Self {
        Self { host, settings }
    }

    /// Name of the underlying host
    pub fn host_name(&self) -> &'static str {
        self.host.name()
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.settings
    }

    fn unit_spec(&self, request: &ExecRequest) -> UnitSpec {
        let mut spec = UnitSpec::new(&request.unit_name, &self.settings.image, &request.workdir)
            .command(request.command.clone());
        spec.env = request.env.clone();
        if let Some(mem) = &self.settings.memory_limit {
            spec = spec.memory_limit(mem);
        }
        if let Some(cpus) = &self.settings.cpu_limit {
            spec = spec.cpu_limit(cpus);
        }
        spec
    }

    async fn wait_for_unit(
        &self,
        handle: &UnitHandle,
        timeout: Duration,
    ) -> SandboxResult<ExecOutput> {
        let deadline = Instant::now() + timeout;

        loop {
            let status = self.host.poll_status(handle).await?;
            if status.state.is_terminal() {
                let logs = self.host.fetch_logs(handle).await?;
                let exit_code = status.exit_code.unwrap_or(match status.state {
                    UnitState::Succeeded => 0,
                    _ => 1,
                });
                debug!(unit = %handle, exit_code, "Unit reached terminal state");
                return Ok(ExecOutput {
                    exit_code,
                    stdout: logs,
                    stderr: String::new(),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(unit = %handle, timeout_secs = timeout.as_secs(), "Unit timed out");
                return Err(SandboxError::timeout(timeout));
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }
}

#[async_trait]
impl SandboxProvider for ContainerSandbox {
    fn name(&self) -> &'static str {
        "container"
    }

    async fn prepare(&self) -> SandboxResult<()> {
        if !self.host.is_reachable().await {
            return Err(SandboxError::unavailable(format!(
                "{} host is not reachable",
                self.host.name()
            )));
        }
        self.host.warm_up(&self.settings.image).await.map_err(|e| match e {
            SandboxError::Unavailable(_) => e,
            other => SandboxError::unavailable(format!(
                "failed to warm up image {}: {}",
                self.settings.image, other
            )),
        })?;
        info!(host = self.host.name(), image = %self.settings.image, "Sandbox host ready");
        Ok(())
    }

    async fn execute(&self, request: &ExecRequest) -> SandboxResult<ExecOutput> {
        if request.command.is_empty() {
            return Err(SandboxError::invalid_request("empty command"));
        }

        let spec = self.unit_spec(request);
        debug!(unit = %spec.name, image = %spec.image, "Creating unit");
        let handle = match self.host.create_unit(&spec).await {
            Ok(handle) => handle,
            Err(e) => {
                // The host may have registered the unit before failing to start it
                delete_logged(self.host.as_ref(), &UnitHandle::new(&spec.name)).await;
                return Err(match e {
                    SandboxError::CreateFailed(_) => e,
                    other => SandboxError::create_failed(format!("{}: {}", spec.name, other)),
                });
            }
        };

        let mut guard = UnitGuard::new(self.host.clone(), handle.clone());
        let outcome = self.wait_for_unit(&handle, request.timeout).await;
        guard.delete().await;
        outcome
    }
}

/// Deletes its unit when dropped, unless [`UnitGuard::delete`] already ran
///
/// Covers the case where the execute future is dropped mid-poll.
struct UnitGuard {
    host: Arc<dyn SandboxHost>,
    handle: Option<UnitHandle>,
}

impl UnitGuard {
    fn new(host: Arc<dyn SandboxHost>, handle: UnitHandle) -> Self {
        Self {
            host,
            handle: Some(handle),
        }
    }

    async fn delete(&mut self) {
        if let Some(handle) = self.handle.take() {
            delete_logged(self.host.as_ref(), &handle).await;
        }
    }
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let host = self.host.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move { delete_logged(host.as_ref(), &handle).await });
            }
            Err(_) => warn!(unit = %handle, "No runtime to delete abandoned unit"),
        }
    }
}

async fn delete_logged(host: &dyn SandboxHost, handle: &UnitHandle) {
    match host.delete_unit(handle).await {
        Ok(()) => debug!(unit = %handle, "Unit deleted"),
        Err(e) => warn!(unit = %handle, error = %e, "Failed to delete unit"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit_name;
    use std::collections::HashSet;

    #[test]
    fn unit_names_are_unique() {
        let names: HashSet<String> = (0..100).map(|_| unit_name()).collect();
        assert_eq!(names.len(), 100);
        assert!(names.iter().all(|n| n.starts_with("swarm-")));
    }

    #[test]
    fn unit_spec_uses_request_name_and_limits() {
        struct Unreachable;

        #[async_trait]
        impl SandboxHost for Unreachable {
            fn name(&self) -> &'static str {
                "unreachable"
            }
            async fn is_reachable(&self) -> bool {
                false
            }
            async fn create_unit(&self, _spec: &UnitSpec) -> SandboxResult<UnitHandle> {
                Err(SandboxError::unavailable("down"))
            }
            async fn poll_status(&self, _handle: &UnitHandle) -> SandboxResult<crate::UnitStatus> {
                Err(SandboxError::unavailable("down"))
            }
            async fn fetch_logs(&self, _handle: &UnitHandle) -> SandboxResult<String> {
                Err(SandboxError::unavailable("down"))
            }
            async fn delete_unit(&self, _handle: &UnitHandle) -> SandboxResult<()> {
                Ok(())
            }
        }

        let sandbox = ContainerSandbox::new(
            Arc::new(Unreachable),
            ContainerSettings::new("img").memory_limit("1G").cpu_limit("0.5"),
        );
        let request = ExecRequest::new(vec!["run".into()], "/ws")
            .unit_name("swarm-fixed")
            .env("K", "V");
        let spec = sandbox.unit_spec(&request);

        assert_eq!(spec.name, "swarm-fixed");
        assert_eq!(spec.image, "img");
        assert_eq!(spec.command, vec!["run".to_string()]);
        assert_eq!(spec.memory_limit.as_deref(), Some("1G"));
        assert_eq!(spec.cpu_limit.as_deref(), Some("0.5"));
        assert_eq!(spec.env.get("K").map(String::as_str), Some("V"));
    }

    #[test]
    fn settings_builder() {
        let settings = ContainerSettings::new("swarm/agent:latest")
            .memory_limit("8G")
            .cpu_limit("2")
            .poll_interval(Duration::from_millis(10));

        assert_eq!(settings.image, "swarm/agent:latest");
        assert_eq!(settings.memory_limit.as_deref(), Some("8G"));
        assert_eq!(settings.poll_interval, Duration::from_millis(10));
    }
}
