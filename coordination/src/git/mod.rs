//! Per-workflow worktree isolation and commit-level checkpoint/rollback
//! (spec component H), grounded on `worktree_bridge.rs` (worktree
//! add/remove/list) and `harness::git_manager` (checkpoint/
//! rollback/retry-with-backoff) merged into one module.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("not a git repository: {0}")]
    NotARepo(PathBuf),
    #[error("worktree already exists for workflow {0}: {1}")]
    WorktreeExists(String, PathBuf),
    #[error("worktree has uncommitted changes, commit or discard first: {0}")]
    DirtyWorktree(String),
    #[error("git command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("io error running git: {0}")]
    Io(#[from] std::io::Error),
}

pub type GitResult<T> = Result<T, GitError>;

/// A worktree created for one workflow's execution.
#[derive(Debug, Clone)]
pub struct WorktreeHandle {
    pub path: PathBuf,
    pub branch: String,
    pub workflow_id: String,
}

/// A commit-level checkpoint a workflow can roll back to (spec §4.H,
/// used by the reviewer rejection / blocker-resolution paths).
#[derive(Debug, Clone)]
pub struct GitSnapshot {
    pub commit_sha: String,
    pub label: String,
}

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(200);

/// Git worktree isolation and checkpoint/rollback for one repository.
pub struct GitIsolation {
    base_dir: PathBuf,
    repo_root: PathBuf,
}

impl GitIsolation {
    pub fn new(base_dir: PathBuf, repo_root: impl AsRef<Path>) -> GitResult<Self> {
        let repo_root = repo_root.as_ref().to_path_buf();

        let check = Command::new("git")
            .args(["rev-parse", "--git-dir"])
            .current_dir(&repo_root)
            .output()?;
        if !check.status.success() {
            return Err(GitError::NotARepo(repo_root));
        }

        std::fs::create_dir_all(&base_dir)?;

        Ok(Self { base_dir, repo_root })
    }

    fn worktree_path(&self, workflow_id: &str) -> PathBuf {
        self.base_dir.join(workflow_id)
    }

    fn run(&self, dir: &Path, args: &[&str]) -> GitResult<std::process::Output> {
        let output = Command::new("git").args(args).current_dir(dir).output()?;
        Ok(output)
    }

    fn run_checked(&self, dir: &Path, args: &[&str]) -> GitResult<String> {
        let output = self.run(dir, args)?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a mutating git command with bounded exponential-backoff retry
    /// (grounded on `run_git_with_retry`), for operations that
    /// can transiently fail under concurrent worktree activity (lock
    /// contention on `.git/index` / `.git/worktrees`).
    async fn run_with_retry(&self, dir: &Path, args: &[&str]) -> GitResult<String> {
        let mut attempt = 0;
        loop {
            match self.run_checked(dir, args) {
                Ok(out) => return Ok(out),
                Err(err) if attempt + 1 < MAX_RETRIES => {
                    attempt += 1;
                    let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                    tracing::warn!(attempt, ?backoff, %err, "git command failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Create a worktree for `workflow_id`, branching from HEAD.
    pub async fn create_worktree(&self, workflow_id: &str) -> GitResult<WorktreeHandle> {
        let path = self.worktree_path(workflow_id);
        let branch = format!("workflow/{workflow_id}");

        if path.exists() {
            return Err(GitError::WorktreeExists(workflow_id.to_string(), path));
        }

        self.run_with_retry(
            &self.repo_root,
            &["worktree", "add", "-b", &branch, &path.display().to_string()],
        )
        .await?;

        Ok(WorktreeHandle {
            path,
            branch,
            workflow_id: workflow_id.to_string(),
        })
    }

    /// Record a checkpoint at the worktree's current HEAD.
    pub fn checkpoint(&self, handle: &WorktreeHandle, label: impl Into<String>) -> GitResult<GitSnapshot> {
        let sha = self.run_checked(&handle.path, &["rev-parse", "HEAD"])?;
        Ok(GitSnapshot {
            commit_sha: sha.trim().to_string(),
            label: label.into(),
        })
    }

    /// Soft rollback: reset the worktree's working tree to `snapshot`
    /// without discarding history ahead of it (used when a reviewer
    /// rejects a batch and the developer must redo it from a known-good
    /// base, per spec §4.F batch rejection flow).
    pub fn rollback(&self, handle: &WorktreeHandle, snapshot: &GitSnapshot) -> GitResult<()> {
        self.run_checked(&handle.path, &["reset", "--hard", &snapshot.commit_sha])?;
        Ok(())
    }

    /// Hard rollback: also clean untracked files the developer agent may
    /// have written (scratch files, build artifacts).
    pub fn hard_rollback(&self, handle: &WorktreeHandle, snapshot: &GitSnapshot) -> GitResult<()> {
        self.rollback(handle, snapshot)?;
        self.run_checked(&handle.path, &["clean", "-fd"])?;
        Ok(())
    }

    /// Diff the worktree's current HEAD against `base_commit` (spec §4.H /
    /// §4.E reviewer input: `git diff baseCommit..HEAD`).
    pub fn diff_since(&self, handle: &WorktreeHandle, base_commit: &str) -> GitResult<String> {
        self.run_checked(&handle.path, &["diff", &format!("{base_commit}..HEAD")])
    }

    /// Current HEAD sha in the worktree (spec §4.H base-commit re-anchoring
    /// before each developer entry and before the reviewer runs).
    pub fn head_commit(&self, handle: &WorktreeHandle) -> GitResult<String> {
        Ok(self.run_checked(&handle.path, &["rev-parse", "HEAD"])?.trim().to_string())
    }

    /// Commit whatever is currently staged/unstaged in the worktree.
    pub fn commit_all(&self, handle: &WorktreeHandle, message: &str) -> GitResult<String> {
        self.run_checked(&handle.path, &["add", "-A"])?;
        self.run_checked(&handle.path, &["commit", "-m", message, "--allow-empty"])?;
        let sha = self.run_checked(&handle.path, &["rev-parse", "HEAD"])?;
        Ok(sha.trim().to_string())
    }

    /// Merge the workflow branch back into the current branch and remove
    /// the worktree (spec §4.H workflow completion cleanup).
    pub async fn merge_and_remove(&self, handle: &WorktreeHandle) -> GitResult<()> {
        let status = self.run_checked(&handle.path, &["status", "--porcelain"])?;
        if !status.trim().is_empty() {
            return Err(GitError::DirtyWorktree(handle.workflow_id.clone()));
        }

        self.run_with_retry(
            &self.repo_root,
            &[
                "merge",
                "--no-ff",
                &handle.branch,
                "-m",
                &format!("workflow: merge {}", handle.workflow_id),
            ],
        )
        .await?;

        let remove = self.run(
            &self.repo_root,
            &["worktree", "remove", &handle.path.display().to_string()],
        )?;
        if !remove.status.success() {
            tracing::warn!(
                stderr = %String::from_utf8_lossy(&remove.stderr),
                "git worktree remove warning"
            );
        }

        let del = self.run(&self.repo_root, &["branch", "-d", &handle.branch])?;
        if !del.status.success() {
            tracing::warn!(
                stderr = %String::from_utf8_lossy(&del.stderr),
                "git branch -d warning"
            );
        }

        Ok(())
    }

    /// List active worktrees, parsed from `git worktree list --porcelain`.
    pub fn list(&self) -> GitResult<Vec<WorktreeHandle>> {
        let stdout = self.run_checked(&self.repo_root, &["worktree", "list", "--porcelain"])?;

        let mut handles = Vec::new();
        let mut current_path: Option<PathBuf> = None;
        let mut current_branch: Option<String> = None;

        for line in stdout.lines() {
            if let Some(path_str) = line.strip_prefix("worktree ") {
                if let (Some(path), Some(branch)) = (current_path.take(), current_branch.take()) {
                    handles.push(handle_from(path, branch));
                }
                current_path = Some(PathBuf::from(path_str));
            } else if let Some(branch_ref) = line.strip_prefix("branch refs/heads/") {
                current_branch = Some(branch_ref.to_string());
            }
        }
        if let (Some(path), Some(branch)) = (current_path, current_branch) {
            handles.push(handle_from(path, branch));
        }

        Ok(handles)
    }
}

fn handle_from(path: PathBuf, branch: String) -> WorktreeHandle {
    let workflow_id = branch.strip_prefix("workflow/").unwrap_or(&branch).to_string();
    WorktreeHandle { path, branch, workflow_id }
}
