//! Parallel agent swarms
//!
//! Fans a batch of independent prompts out to agent processes, each in its
//! own workspace and sandbox, with at most `maxConcurrency` running at once.
//! Every task ends `completed` or `failed`; one task's failure never
//! affects another. Completed outputs are persisted through a
//! [`PersistenceSink`] and can optionally be merged by a [`Synthesizer`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use swarm::*;
//! # async fn demo() -> swarm::Result<()> {
//! let config = SwarmConfig::default().max_concurrency(2);
//! let orchestrator = Orchestrator::builder()
//!     .workspaces(Arc::new(ScratchWorkspaceProvider::new("/tmp/swarm")))
//!     .sandbox(select_sandbox(&config, None))
//!     .sink(Arc::new(MemorySink::new()))
//!     .build()?;
//!
//! let result = orchestrator
//!     .run(["summarize README", "list TODOs"], &config, |task| {
//!         println!("{} {}", task.id().short(), task.status());
//!     })
//!     .await?;
//! assert_eq!(result.len(), 2);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod orchestrator;
mod output;
mod registry;
mod result;
mod runner;
mod sink;
mod synthesizer;
mod task;
mod workspace;

pub use config::{SandboxKind, SwarmConfig};
pub use error::{Result, SwarmError};
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, SWARM_TAG, SYNTHESIS_TAG, select_sandbox,
};
pub use output::AgentOutput;
pub use registry::{RegistryEntry, TaskRegistry, TaskUpdate};
pub use result::SwarmResult;
pub use runner::{AgentRunner, CliAgentRunner, RunnerOutput};
pub use sink::{Document, MarkdownDirSink, MemorySink, PersistenceSink};
pub use synthesizer::Synthesizer;
pub use task::{AgentTask, TaskId, TaskStatus, TokenUsage};
pub use workspace::{
    GitWorktreeProvider, ScratchWorkspaceProvider, WORKSPACE_PREFIX, WorkspaceProvider,
    branch_name, workspace_dir_name,
};

pub use sandbox;
