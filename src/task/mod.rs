//! The task DAG: persistent storage, dependency graph, and filtering.

mod errors;
mod filter;
mod model;
mod store;

pub use errors::TaskStoreError;
pub use filter::{ListFilter, OneOrSet, Page, SortKey, SortOrder, SortSpec};
pub use model::{
    Comment, DepType, Dependency, EpicSummary, Priority, Status, Task, TaskId, TaskType,
    PREFIX_APPROVED, PREFIX_BLOCKED, PREFIX_QUEUED, PREFIX_REJECTED, PREFIX_SUMMARY,
};
pub use store::{CreateTaskParams, TaskArena, TaskStore, UpdateTaskParams};
