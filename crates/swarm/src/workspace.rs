//! Isolated workspaces, one per task
//!
//! Every successful [`WorkspaceProvider::acquire`] must be paired with exactly
//! one [`WorkspaceProvider::release`]; the orchestrator guarantees that on
//! every exit path. Release failures are logged by the caller, never turned
//! into task failures.

use crate::error::{Result, SwarmError};
use crate::task::TaskId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Prefix for workspace directories and branches
pub const WORKSPACE_PREFIX: &str = "swarm";

/// Creates and destroys per-task working copies
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    /// Create a fresh, uniquely named workspace for `task_id`
    async fn acquire(&self, task_id: &TaskId) -> Result<PathBuf>;

    /// Remove the workspace and anything created for it
    async fn release(&self, path: &Path) -> Result<()>;
}

/// Directory name for a task's workspace
pub fn workspace_dir_name(task_id: &TaskId) -> String {
    format!("{}-{}", WORKSPACE_PREFIX, task_id.simple())
}

/// Branch name for a task's worktree
pub fn branch_name(task_id: &TaskId) -> String {
    format!("{}/{}", WORKSPACE_PREFIX, task_id.simple())
}

/// Branch name recovered from a workspace path created by [`GitWorktreeProvider`]
fn branch_for_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let id = name.strip_prefix(&format!("{WORKSPACE_PREFIX}-"))?;
    Some(format!("{WORKSPACE_PREFIX}/{id}"))
}

/// Git worktrees branched off a base repository
#[derive(Debug, Clone)]
pub struct GitWorktreeProvider {
    /// Repository the worktrees are created from
    repo: PathBuf,
    /// Directory holding the worktrees
    root: PathBuf,
    /// Ref new branches start from
    base_ref: String,
}

impl GitWorktreeProvider {
    pub fn new(repo: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            root: root.into(),
            base_ref: "HEAD".to_string(),
        }
    }

    /// Start branches from `base_ref` instead of `HEAD`
    pub fn base_ref(mut self, base_ref: impl Into<String>) -> Self {
        self.base_ref = base_ref.into();
        self
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn git(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!(repo = %self.repo.display(), ?args, "Running git");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .await?;
        Ok(output)
    }

    /// Run git and turn a spawn failure or non-zero exit into an error
    async fn git_step(&self, args: &[&str]) -> Result<()> {
        let output = self.git(args).await.map_err(|e| {
            SwarmError::workspace(format!("git {} could not run: {}", args.join(" "), e))
        })?;
        if output.status.success() {
            return Ok(());
        }
        Err(SwarmError::workspace(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

#[async_trait]
impl WorkspaceProvider for GitWorktreeProvider {
    async fn acquire(&self, task_id: &TaskId) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(workspace_dir_name(task_id));
        let branch = branch_name(task_id);
        let path_str = path.to_string_lossy().into_owned();

        let output = self
            .git(&[
                "worktree",
                "add",
                "-b",
                branch.as_str(),
                path_str.as_str(),
                self.base_ref.as_str(),
            ])
            .await?;
        if !output.status.success() {
            return Err(SwarmError::workspace(format!(
                "git worktree add {} failed: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!(task_id = %task_id, workspace = %path.display(), branch = %branch, "Worktree created");
        Ok(path)
    }

    async fn release(&self, path: &Path) -> Result<()> {
        let mut first_error: Option<SwarmError> = None;
        let path_str = path.to_string_lossy().into_owned();

        let removed = self
            .git_step(&["worktree", "remove", "--force", path_str.as_str()])
            .await;
        if let Err(e) = removed {
            warn!(workspace = %path.display(), error = %e, "git worktree remove failed");
            first_error = first_error.or(Some(e));
        }

        if let Some(branch) = branch_for_path(path) {
            if let Err(e) = self.git_step(&["branch", "-D", branch.as_str()]).await {
                warn!(branch = %branch, error = %e, "git branch -D failed");
                first_error = first_error.or(Some(e));
            }
        }

        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_dir_all(path).await {
                warn!(workspace = %path.display(), error = %e, "Failed to remove leftover workspace");
                first_error = first_error.or(Some(e.into()));
            }
            // Drop the stale worktree record left by the manual removal
            let _ = self.git(&["worktree", "prune"]).await;
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(workspace = %path.display(), "Worktree removed");
                Ok(())
            }
        }
    }
}

/// Empty scratch directories, for tasks that need no source checkout
#[derive(Debug, Clone)]
pub struct ScratchWorkspaceProvider {
    root: PathBuf,
}

impl ScratchWorkspaceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl WorkspaceProvider for ScratchWorkspaceProvider {
    async fn acquire(&self, task_id: &TaskId) -> Result<PathBuf> {
        let path = self.root.join(workspace_dir_name(task_id));
        tokio::fs::create_dir_all(&self.root).await?;
        // create_dir (not create_dir_all) so a collision is an error
        tokio::fs::create_dir(&path).await.map_err(|e| {
            SwarmError::workspace(format!("failed to create {}: {}", path.display(), e))
        })?;
        debug!(task_id = %task_id, workspace = %path.display(), "Scratch workspace created");
        Ok(path)
    }

    async fn release(&self, path: &Path) -> Result<()> {
        if !path.starts_with(&self.root) {
            return Err(SwarmError::workspace(format!(
                "{} is not under {}",
                path.display(),
                self.root.display()
            )));
        }
        tokio::fs::remove_dir_all(path).await.map_err(|e| {
            SwarmError::workspace(format!("failed to remove {}: {}", path.display(), e))
        })?;
        debug!(workspace = %path.display(), "Scratch workspace removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_derive_from_task_id() {
        let id = TaskId::new();
        let dir = workspace_dir_name(&id);
        let branch = branch_name(&id);

        assert_eq!(dir, format!("swarm-{}", id.simple()));
        assert_eq!(branch, format!("swarm/{}", id.simple()));
        assert_eq!(
            branch_for_path(&PathBuf::from("/tmp/worktrees").join(&dir)),
            Some(branch)
        );
        assert_eq!(branch_for_path(Path::new("/tmp/other")), None);
    }

    #[tokio::test]
    async fn scratch_acquire_and_release() {
        let root = tempfile::tempdir().unwrap();
        let provider = ScratchWorkspaceProvider::new(root.path().join("ws"));
        let id = TaskId::new();

        let path = provider.acquire(&id).await.unwrap();
        assert!(path.is_dir());
        assert!(path.starts_with(root.path()));

        provider.release(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn scratch_workspaces_do_not_collide() {
        let root = tempfile::tempdir().unwrap();
        let provider = ScratchWorkspaceProvider::new(root.path());

        let a = provider.acquire(&TaskId::new()).await.unwrap();
        let b = provider.acquire(&TaskId::new()).await.unwrap();
        assert_ne!(a, b);

        let same = TaskId::new();
        provider.acquire(&same).await.unwrap();
        assert!(provider.acquire(&same).await.is_err());
    }

    #[tokio::test]
    async fn worktree_release_removes_directory_when_git_fails() {
        let root = tempfile::tempdir().unwrap();
        let provider = GitWorktreeProvider::new(root.path().join("no-repo"), root.path());
        let path = root.path().join(workspace_dir_name(&TaskId::new()));
        std::fs::create_dir_all(path.join("src")).unwrap();
        std::fs::write(path.join("src/lib.rs"), "// agent edits").unwrap();

        let err = provider.release(&path).await.unwrap_err();
        assert!(matches!(err, SwarmError::Workspace(_)), "{err}");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn scratch_release_refuses_foreign_paths() {
        let root = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let provider = ScratchWorkspaceProvider::new(root.path());

        assert!(provider.release(other.path()).await.is_err());
        assert!(other.path().exists());
    }
}
