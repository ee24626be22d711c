use thiserror::Error;

use crate::orchestrator::{OrchestratorEvent, Role};
use crate::tools::ErrorKind;

/// Top-level error type for the orchestration loop.
///
/// Every variant here is either a genuinely unrecoverable condition (a
/// missing role handler, a corrupted transition table) or a typed error
/// bubbled up from a leaf module. Tool failures and store invariant
/// violations are *not* represented here — they become data (a populated
/// `ToolResult`), never a panic and never this enum.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent failed: {0}")]
    AgentFailed(String),

    #[error("invalid transition: {from} + {event:?} not in transition table")]
    InvalidTransition { from: Role, event: OrchestratorEvent },

    #[error("no handler registered for role: {0}")]
    NoHandlerForRole(String),

    #[error("safety cap exceeded after {0} iterations")]
    SafetyCapExceeded(usize),

    #[error("LLM caller error: {0}")]
    LlmError(String),

    #[error(transparent)]
    TaskStore(#[from] crate::task::TaskStoreError),

    #[error(transparent)]
    GitSync(#[from] crate::gitsync::GitSyncError),

    #[error("build error: {0}")]
    BuildError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Maps this error onto the wire-level taxonomy from §6/§7. Used at the
    /// tool layer so a caught `AgentError` can be folded into a `ToolResult`
    /// instead of aborting the batch.
    pub fn to_error_kind(&self) -> ErrorKind {
        match self {
            AgentError::TaskStore(e) => e.to_error_kind(),
            AgentError::GitSync(_) => ErrorKind::IoError,
            AgentError::BuildError(_) | AgentError::Internal(_) => ErrorKind::InternalError,
            AgentError::LlmError(_) => ErrorKind::InternalError,
            _ => ErrorKind::InternalError,
        }
    }
}
