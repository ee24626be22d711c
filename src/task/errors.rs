use thiserror::Error;

use crate::task::model::TaskId;
use crate::tools::ErrorKind;

#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("task id collision: {0}")]
    TaskIdCollision(TaskId),

    #[error("dependency source not found: {0}")]
    SourceNotFound(TaskId),

    #[error("dependency destination not found: {0}")]
    DestNotFound(TaskId),

    #[error("self dependency on task: {0}")]
    SelfDependency(TaskId),

    #[error("dependency {src} -> {dst} would close a cycle on the blocks subgraph")]
    CircularDependency { src: TaskId, dst: TaskId },

    #[error("dependency {src} -> {dst} ({dep_type}) already exists")]
    DependencyExists {
        src: TaskId,
        dst: TaskId,
        dep_type: &'static str,
    },

    #[error("molecule tasks cannot be blocked: {0}")]
    CannotBlockMolecule(TaskId),

    #[error("molecule tasks cannot be started directly: {0}")]
    CannotStartMolecule(TaskId),

    #[error("wisp tasks are immutable and cannot be updated: {0}")]
    CannotUpdateWisp(TaskId),

    #[error("task type cannot be changed to or from wisp: {0}")]
    CannotChangeWispType(TaskId),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TaskStoreError {
    pub fn to_error_kind(&self) -> ErrorKind {
        match self {
            TaskStoreError::TaskNotFound(_) => ErrorKind::NotFound,
            TaskStoreError::TaskIdCollision(_) => ErrorKind::InternalError,
            TaskStoreError::SourceNotFound(_) | TaskStoreError::DestNotFound(_) => {
                ErrorKind::NotFound
            }
            TaskStoreError::SelfDependency(_)
            | TaskStoreError::CircularDependency { .. }
            | TaskStoreError::DependencyExists { .. }
            | TaskStoreError::CannotBlockMolecule(_)
            | TaskStoreError::CannotStartMolecule(_)
            | TaskStoreError::CannotUpdateWisp(_)
            | TaskStoreError::CannotChangeWispType(_) => ErrorKind::ValidationFailed,
            TaskStoreError::Database(_) => ErrorKind::InternalError,
            TaskStoreError::Serialization(_) => ErrorKind::ParseError,
        }
    }
}

impl From<rusqlite::Error> for TaskStoreError {
    fn from(e: rusqlite::Error) -> Self {
        TaskStoreError::Database(e.to_string())
    }
}
