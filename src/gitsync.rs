use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::warn;

use crate::task::{Task, TaskStore};
use crate::tools::ErrorKind;

#[derive(Debug, Error)]
pub enum GitSyncError {
    #[error("not a git repository")]
    NotInGitRepo,

    #[error("git not installed or not on PATH")]
    GitNotInstalled,

    #[error("git command failed: {0}")]
    CommandFailed(String),

    #[error("io error: {0}")]
    Io(String),
}

impl GitSyncError {
    pub fn to_error_kind(&self) -> ErrorKind {
        match self {
            GitSyncError::NotInGitRepo => ErrorKind::ValidationFailed,
            GitSyncError::GitNotInstalled | GitSyncError::CommandFailed(_) | GitSyncError::Io(_) => {
                ErrorKind::IoError
            }
        }
    }
}

impl From<io::Error> for GitSyncError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => GitSyncError::GitNotInstalled,
            _ => GitSyncError::Io(e.to_string()),
        }
    }
}

/// Shells out to the local `git` CLI to keep `.tasks/` in sync with the
/// task store and to stamp commits onto tasks. Never uses a git library —
/// the process boundary is the CLI, matching how the rest of the pack
/// wraps external tools.
pub struct GitSync {
    repo_root: PathBuf,
}

impl GitSync {
    /// Detects the repository root via `git rev-parse --show-toplevel`.
    pub async fn detect(start_dir: impl AsRef<Path>) -> Result<Self, GitSyncError> {
        let output = Self::run(&["rev-parse", "--show-toplevel"], start_dir.as_ref()).await?;
        let root = output.trim();
        if root.is_empty() {
            return Err(GitSyncError::NotInGitRepo);
        }
        Ok(Self {
            repo_root: PathBuf::from(root),
        })
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    async fn run(args: &[&str], cwd: &Path) -> Result<String, GitSyncError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.to_lowercase().contains("not a git repository") {
                Err(GitSyncError::NotInGitRepo)
            } else {
                Err(GitSyncError::CommandFailed(stderr))
            }
        }
    }

    async fn run_here(&self, args: &[&str]) -> Result<String, GitSyncError> {
        Self::run(args, &self.repo_root).await
    }

    /// `git status --porcelain`, ignoring paths under `.tasks/`.
    pub async fn has_uncommitted_code_changes(&self) -> Result<bool, GitSyncError> {
        let output = self.run_here(&["status", "--porcelain"]).await?;
        Ok(output
            .lines()
            .any(|line| !Self::status_line_path(line).starts_with(".tasks/")))
    }

    fn status_line_path(line: &str) -> &str {
        line.get(3..).unwrap_or("").trim()
    }

    /// Short(-ish) HEAD hash via `git log -1 --pretty=%H`.
    pub async fn get_current_head(&self) -> Result<String, GitSyncError> {
        let out = self.run_here(&["log", "-1", "--pretty=%H"]).await?;
        Ok(out.trim().to_string())
    }

    /// Writes `tasks.jsonl` and `dependencies.jsonl` under `.tasks/`,
    /// deterministically ordered by id.
    pub fn export_tasks(&self, store: &TaskStore) -> Result<(), GitSyncError> {
        let dir = self.repo_root.join(".tasks");
        std::fs::create_dir_all(&dir)?;

        let mut tasks: Vec<&Task> = store.all_tasks().collect();
        tasks.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        let tasks_jsonl = tasks
            .iter()
            .map(|t| serde_json::to_string(t).map_err(|e| GitSyncError::Io(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?
            .join("\n");
        std::fs::write(dir.join("tasks.jsonl"), tasks_jsonl + "\n")?;

        let mut deps = store.all_dependencies().to_vec();
        deps.sort_by(|a, b| (a.src_id.as_str(), a.dst_id.as_str()).cmp(&(b.src_id.as_str(), b.dst_id.as_str())));
        let deps_jsonl = deps
            .iter()
            .map(|d| serde_json::to_string(d).map_err(|e| GitSyncError::Io(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?
            .join("\n");
        std::fs::write(dir.join("dependencies.jsonl"), deps_jsonl + "\n")?;

        Ok(())
    }

    /// Markdown summary: current task, ready queue, recently completed
    /// (latest first), free-form notes.
    pub fn write_session_state(&self, store: &TaskStore, notes: &str) -> Result<(), GitSyncError> {
        let dir = self.repo_root.join(".tasks");
        std::fs::create_dir_all(&dir)?;

        let mut out = String::new();
        out.push_str("# Session State\n\n");

        out.push_str("## Current task\n\n");
        match store.current_task_id() {
            Some(id) => {
                if let Ok(task) = store.get_task(id) {
                    out.push_str(&format!("- `{}` — {} ({})\n\n", task.id, task.title, task.status));
                }
            }
            None => out.push_str("- none\n\n"),
        }

        out.push_str("## Ready queue\n\n");
        let ready = store.get_ready_tasks();
        if ready.is_empty() {
            out.push_str("- empty\n\n");
        } else {
            for task in &ready {
                out.push_str(&format!("- `{}` — {} ({:?})\n", task.id, task.title, task.priority));
            }
            out.push('\n');
        }

        out.push_str("## Recently completed\n\n");
        let mut completed: Vec<&Task> = store
            .all_tasks()
            .filter(|t| t.status == crate::task::Status::Completed)
            .collect();
        completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        if completed.is_empty() {
            out.push_str("- none yet\n\n");
        } else {
            for task in completed.iter().take(20) {
                out.push_str(&format!("- `{}` — {}\n", task.id, task.title));
            }
            out.push('\n');
        }

        out.push_str("## Notes\n\n");
        out.push_str(notes);
        out.push('\n');

        std::fs::write(dir.join("SESSION_STATE.md"), out)?;
        Ok(())
    }

    pub fn sync_all_with_notes(&self, store: &TaskStore, notes: &str) -> Result<(), GitSyncError> {
        self.export_tasks(store)?;
        self.write_session_state(store, notes)?;
        Ok(())
    }

    /// Stages `.tasks/` only (never code) and commits. Failure here is
    /// non-fatal for the calling tool (§7) — callers should surface the
    /// returned error as a warning, not abort.
    pub async fn commit(&self, message: &str) -> Result<(), GitSyncError> {
        self.run_here(&["add", ".tasks/"]).await?;
        match self.run_here(&["commit", "-m", message]).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "git commit for .tasks/ failed, continuing");
                Err(e)
            }
        }
    }

    /// Adds tracked code paths, then commits. Used by `submit_work`: the
    /// tool assembles the file list, calls `reset` then `add` for each
    /// path then `commit`.
    pub async fn commit_files(&self, paths: &[String], message: &str) -> Result<(), GitSyncError> {
        self.run_here(&["reset", "HEAD"]).await.ok();
        for path in paths {
            self.run_here(&["add", path]).await?;
        }
        self.run_here(&["commit", "-m", message]).await?;
        Ok(())
    }

    /// Best-effort reader used at cold start; absence or parse failure is
    /// not an error, just an empty result.
    pub fn parse_session_state(&self) -> Option<String> {
        std::fs::read_to_string(self.repo_root.join(".tasks").join("SESSION_STATE.md")).ok()
    }
}
