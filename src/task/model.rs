use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An 8-character hex task identifier, collision-checked on creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Derives a candidate id from randomness. Callers retry with a fresh
    /// value on collision (`TaskStoreError::TaskIdCollision`).
    pub fn generate() -> Self {
        use sha2::{Digest, Sha256};
        let seed = uuid::Uuid::new_v4();
        let digest = Sha256::digest(seed.as_bytes());
        Self(hex_prefix(&digest, 8))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn hex_prefix(bytes: &[u8], len: usize) -> String {
    let mut s = String::with_capacity(len);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
        if s.len() >= len {
            break;
        }
    }
    s.truncate(len);
    s
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Blocked,
    Completed,
    Cancelled,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Blocked => "blocked",
            Status::Completed => "completed",
            Status::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl Status {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Status::Pending,
            "in_progress" => Status::InProgress,
            "blocked" => Status::Blocked,
            "completed" => Status::Completed,
            "cancelled" => Status::Cancelled,
            _ => return None,
        })
    }
}

/// Priority, ordered ascending by urgency (`Critical` sorts first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Priority {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
    Wishlist = 4,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "critical" => Priority::Critical,
            "high" => Priority::High,
            "medium" => Priority::Medium,
            "low" => Priority::Low,
            "wishlist" => Priority::Wishlist,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Wishlist => "wishlist",
        }
    }
}

/// What kind of work item this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Task,
    Bug,
    Feature,
    Research,
    /// A container task; never directly executable, never blocked.
    Molecule,
    /// An ephemeral task; immutable type, cannot be updated.
    Wisp,
}

impl Default for TaskType {
    fn default() -> Self {
        TaskType::Task
    }
}

impl TaskType {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "task" => TaskType::Task,
            "bug" => TaskType::Bug,
            "feature" => TaskType::Feature,
            "research" => TaskType::Research,
            "molecule" => TaskType::Molecule,
            "wisp" => TaskType::Wisp,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Task => "task",
            TaskType::Bug => "bug",
            TaskType::Feature => "feature",
            TaskType::Research => "research",
            TaskType::Molecule => "molecule",
            TaskType::Wisp => "wisp",
        }
    }
}

/// Dependency edge kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepType {
    /// Source must complete before destination is ready.
    Blocks,
    /// Mirrors `Task.parent_id`.
    Parent,
    Related,
    Discovered,
}

impl DepType {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "blocks" => DepType::Blocks,
            "parent" => DepType::Parent,
            "related" => DepType::Related,
            "discovered" => DepType::Discovered,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DepType::Blocks => "blocks",
            DepType::Parent => "parent",
            DepType::Related => "related",
            DepType::Discovered => "discovered",
        }
    }
}

/// A directed dependency edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub src_id: TaskId,
    pub dst_id: TaskId,
    pub dep_type: DepType,
    pub weight: f64,
}

/// An immutable, append-only comment on a task.
///
/// Certain prefixes carry protocol meaning between agents: `BLOCKED:`,
/// `REJECTED:`, `APPROVED:`, `QUEUED:`, `SUMMARY:`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub agent: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

pub const PREFIX_BLOCKED: &str = "BLOCKED:";
pub const PREFIX_REJECTED: &str = "REJECTED:";
pub const PREFIX_APPROVED: &str = "APPROVED:";
pub const PREFIX_QUEUED: &str = "QUEUED:";
pub const PREFIX_SUMMARY: &str = "SUMMARY:";

impl Comment {
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.content.starts_with(prefix)
    }
}

/// A unit of work tracked by the `TaskStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: Status,
    pub priority: Priority,
    pub task_type: TaskType,
    pub parent_id: Option<TaskId>,
    pub labels: BTreeSet<String>,
    pub blocked_by_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub started_at_commit: Option<String>,
    pub completed_at_commit: Option<String>,
    pub comments: Vec<Comment>,
}

impl Task {
    /// A task is ready iff pending, unblocked, and not a molecule container.
    pub fn is_ready(&self) -> bool {
        self.status == Status::Pending
            && self.blocked_by_count == 0
            && self.task_type != TaskType::Molecule
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.created_at)
    }

    /// Number of `REJECTED:` comments — the judge-revision count for this task.
    pub fn rejection_count(&self) -> usize {
        self.comments
            .iter()
            .filter(|c| c.has_prefix(PREFIX_REJECTED))
            .count()
    }

    pub fn latest_comment_with_prefix(&self, prefix: &str) -> Option<&Comment> {
        self.comments.iter().rev().find(|c| c.has_prefix(prefix))
    }
}

/// Aggregate progress summary for a molecule's children.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EpicSummary {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub pending: usize,
    pub completion_percent: f64,
}
