use std::sync::{Arc, Mutex};

use crate::gitsync::GitSync;
use crate::task::{TaskArena, TaskStore};

/// Shared completion signals, written by terminal tools and read by the
/// orchestrator's transition logic. Modeled as a shared state struct
/// rather than raw mutable pointers.
#[derive(Debug, Default)]
pub struct CompletionFlags {
    pub planning_complete: bool,
    pub tinkering_complete: bool,
    pub task_approved: Option<String>,
    pub revision_requested: Option<(String, String)>,
    pub session_ended: bool,
}

/// The capabilities one tool execution may reach, threaded through by
/// reference. `task_store` and `git_sync` are optional collaborators —
/// a host embedding only the task graph (no git repo) simply omits the
/// latter.
pub struct ExecutionContext<'a> {
    pub task_store: Option<&'a mut TaskStore>,
    pub git_sync: Option<&'a mut GitSync>,
    pub flags: Arc<Mutex<CompletionFlags>>,
    pub task_arena: TaskArena,
    pub current_agent: String,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(current_agent: impl Into<String>, flags: Arc<Mutex<CompletionFlags>>) -> Self {
        Self {
            task_store: None,
            git_sync: None,
            flags,
            task_arena: TaskArena,
            current_agent: current_agent.into(),
        }
    }

    pub fn with_task_store(mut self, store: &'a mut TaskStore) -> Self {
        self.task_store = Some(store);
        self
    }

    pub fn with_git_sync(mut self, git: &'a mut GitSync) -> Self {
        self.git_sync = Some(git);
        self
    }

    pub fn require_task_store(&mut self) -> Result<&mut TaskStore, (crate::tools::ErrorKind, String)> {
        self.task_store
            .as_deref_mut()
            .ok_or_else(|| (crate::tools::ErrorKind::InternalError, "no task store available".to_string()))
    }

    pub fn require_git_sync(&mut self) -> Result<&mut GitSync, (crate::tools::ErrorKind, String)> {
        self.git_sync
            .as_deref_mut()
            .ok_or_else(|| (crate::tools::ErrorKind::InternalError, "no git sync available".to_string()))
    }

    /// Borrows both collaborators at once — needed by tools (e.g.
    /// `end_session`) that read the store while driving git.
    pub fn require_store_and_git(&mut self) -> Result<(&mut TaskStore, &mut GitSync), (crate::tools::ErrorKind, String)> {
        let store = self
            .task_store
            .as_deref_mut()
            .ok_or_else(|| (crate::tools::ErrorKind::InternalError, "no task store available".to_string()))?;
        let git = self
            .git_sync
            .as_deref_mut()
            .ok_or_else(|| (crate::tools::ErrorKind::InternalError, "no git sync available".to_string()))?;
        Ok((store, git))
    }
}
