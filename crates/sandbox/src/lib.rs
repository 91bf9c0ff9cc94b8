//! Sandboxed execution for swarm agents
//!
//! A [`SandboxProvider`] runs one agent command rooted at a workspace and
//! blocks until it finishes or times out. Two strategies share the contract:
//!
//! - [`LocalProcessSandbox`]: a plain child process
//! - [`ContainerSandbox`]: a disposable unit on a [`SandboxHost`] such as
//!   [`DockerHost`]

mod backend;
mod container;
mod docker;
mod error;
mod host;
mod local;

pub use backend::{DEFAULT_TIMEOUT, ExecOutput, ExecRequest, SandboxProvider, unit_name};
pub use container::{ContainerSandbox, ContainerSettings, DEFAULT_POLL_INTERVAL};
pub use docker::{DockerHost, parse_inspect, run_args};
pub use error::{SandboxError, SandboxResult};
pub use host::{DEFAULT_MOUNT_POINT, SandboxHost, UnitHandle, UnitSpec, UnitState, UnitStatus};
pub use local::LocalProcessSandbox;
