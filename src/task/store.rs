use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::task::errors::TaskStoreError;
use crate::task::filter::{ListFilter, Page, SortKey, SortOrder, SortSpec};
use crate::task::model::{
    Comment, DepType, Dependency, EpicSummary, Priority, Status, Task, TaskId, TaskType,
};

/// A zero-sized scratch handle threaded through `get_task_with_allocator`.
///
/// Mirrors the "explicit allocator, scoped cleanup" design note (§9): the
/// caller owns a per-batch scratch value and drops it when the batch
/// finishes. The store itself never allocates through it — it exists so
/// call sites read the same way the original tool-call batch allocator did.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskArena;

#[derive(Debug, Clone, Default)]
pub struct CreateTaskParams {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub task_type: TaskType,
    pub parent_id: Option<TaskId>,
    pub labels: BTreeSet<String>,
    /// Tasks that must complete before this one is ready.
    pub blocked_by: Vec<TaskId>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskParams {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub task_type: Option<TaskType>,
    pub labels: Option<BTreeSet<String>>,
    pub completed_at_commit: Option<String>,
}

/// In-memory graph + sqlite-backed persistence for the task DAG.
///
/// All mutation goes through `&mut self` methods here; readers see a
/// consistent snapshot because the whole store runs on the single
/// orchestration thread (§5) — no internal locking is needed.
pub struct TaskStore {
    conn: Connection,
    tasks: HashMap<TaskId, Task>,
    dependencies: Vec<Dependency>,
    /// All `blocks` edges, structural (used for cycle detection and cascade).
    blocks_out: HashMap<TaskId, HashSet<TaskId>>,
    current_task: Option<TaskId>,
}

impl TaskStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TaskStoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, TaskStoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, TaskStoreError> {
        Self::ensure_schema(&conn)?;
        let (tasks, dependencies) = Self::load_all(&conn)?;
        let mut blocks_out: HashMap<TaskId, HashSet<TaskId>> = HashMap::new();
        for dep in &dependencies {
            if dep.dep_type == DepType::Blocks {
                blocks_out
                    .entry(dep.src_id.clone())
                    .or_default()
                    .insert(dep.dst_id.clone());
            }
        }
        Ok(Self {
            conn,
            tasks,
            dependencies,
            blocks_out,
            current_task: None,
        })
    }

    fn ensure_schema(conn: &Connection) -> Result<(), TaskStoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tasks (
                id                   TEXT PRIMARY KEY,
                title                TEXT NOT NULL,
                description          TEXT,
                status               TEXT NOT NULL,
                priority             TEXT NOT NULL,
                task_type            TEXT NOT NULL,
                parent_id            TEXT,
                labels               TEXT NOT NULL,
                blocked_by_count     INTEGER NOT NULL,
                created_at           TEXT NOT NULL,
                updated_at           TEXT NOT NULL,
                completed_at         TEXT,
                started_at_commit    TEXT,
                completed_at_commit  TEXT
            );
            CREATE TABLE IF NOT EXISTS comments (
                task_id   TEXT NOT NULL,
                seq       INTEGER NOT NULL,
                agent     TEXT NOT NULL,
                content   TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (task_id, seq)
            );
            CREATE TABLE IF NOT EXISTS dependencies (
                src_id   TEXT NOT NULL,
                dst_id   TEXT NOT NULL,
                dep_type TEXT NOT NULL,
                weight   REAL NOT NULL,
                PRIMARY KEY (src_id, dst_id, dep_type)
            );
            ",
        )?;
        Ok(())
    }

    fn load_all(conn: &Connection) -> Result<(HashMap<TaskId, Task>, Vec<Dependency>), TaskStoreError> {
        let mut tasks = HashMap::new();

        let mut stmt = conn.prepare(
            "SELECT id, title, description, status, priority, task_type, parent_id, labels,
                    blocked_by_count, created_at, updated_at, completed_at,
                    started_at_commit, completed_at_commit
             FROM tasks",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let labels_json: String = row.get(7)?;
            let created_at: String = row.get(9)?;
            let updated_at: String = row.get(10)?;
            let completed_at: Option<String> = row.get(11)?;
            Ok((
                id,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                labels_json,
                row.get::<_, i64>(8)?,
                created_at,
                updated_at,
                completed_at,
                row.get::<_, Option<String>>(12)?,
                row.get::<_, Option<String>>(13)?,
            ))
        })?;

        for row in rows {
            let (
                id,
                title,
                description,
                status,
                priority,
                task_type,
                parent_id,
                labels_json,
                blocked_by_count,
                created_at,
                updated_at,
                completed_at,
                started_at_commit,
                completed_at_commit,
            ) = row?;

            let labels: BTreeSet<String> =
                serde_json::from_str(&labels_json).map_err(|e| TaskStoreError::Serialization(e.to_string()))?;

            let task = Task {
                id: TaskId(id.clone()),
                title,
                description,
                status: Status::parse(&status)
                    .ok_or_else(|| TaskStoreError::Serialization(format!("bad status {status}")))?,
                priority: Priority::parse(&priority)
                    .ok_or_else(|| TaskStoreError::Serialization(format!("bad priority {priority}")))?,
                task_type: TaskType::parse(&task_type)
                    .ok_or_else(|| TaskStoreError::Serialization(format!("bad task_type {task_type}")))?,
                parent_id: parent_id.map(TaskId),
                labels,
                blocked_by_count: blocked_by_count as u32,
                created_at: parse_ts(&created_at)?,
                updated_at: parse_ts(&updated_at)?,
                completed_at: completed_at.map(|s| parse_ts(&s)).transpose()?,
                started_at_commit,
                completed_at_commit,
                comments: Vec::new(),
            };
            tasks.insert(task.id.clone(), task);
        }

        // Comments, ordered by seq within each task.
        let mut stmt = conn.prepare(
            "SELECT task_id, agent, content, timestamp FROM comments ORDER BY task_id, seq",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        for row in rows {
            let (task_id, agent, content, ts) = row?;
            if let Some(task) = tasks.get_mut(&TaskId(task_id)) {
                task.comments.push(Comment {
                    agent,
                    content,
                    timestamp: parse_ts(&ts)?,
                });
            }
        }

        // Dependencies.
        let mut dependencies = Vec::new();
        let mut stmt = conn.prepare("SELECT src_id, dst_id, dep_type, weight FROM dependencies ORDER BY src_id, dst_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;
        for row in rows {
            let (src, dst, dep_type, weight) = row?;
            dependencies.push(Dependency {
                src_id: TaskId(src),
                dst_id: TaskId(dst),
                dep_type: DepType::parse(&dep_type)
                    .ok_or_else(|| TaskStoreError::Serialization(format!("bad dep_type {dep_type}")))?,
                weight,
            });
        }

        Ok((tasks, dependencies))
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn get_task(&self, id: &TaskId) -> Result<Task, TaskStoreError> {
        self.tasks
            .get(id)
            .cloned()
            .ok_or_else(|| TaskStoreError::TaskNotFound(id.clone()))
    }

    pub fn get_task_with_allocator(&self, id: &TaskId, _arena: &TaskArena) -> Result<Task, TaskStoreError> {
        self.get_task(id)
    }

    pub fn list_tasks(&self, filter: &ListFilter, sort: SortSpec, limit: usize, offset: usize) -> Page<Task> {
        let total_unfiltered = self.tasks.len();

        let mut matched: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| {
                if let Some(status) = &filter.status {
                    if !status.matches(t.status) {
                        return false;
                    }
                }
                if let Some(priority) = filter.priority {
                    if t.priority != priority {
                        return false;
                    }
                }
                if let Some(task_type) = &filter.task_type {
                    if !task_type.matches(t.task_type) {
                        return false;
                    }
                }
                if let Some(parent) = &filter.parent {
                    if t.parent_id.as_ref() != Some(parent) {
                        return false;
                    }
                }
                if let Some(label) = &filter.label {
                    if !t.labels.contains(label) {
                        return false;
                    }
                }
                if filter.ready_only && !t.is_ready() {
                    return false;
                }
                if let Some(q) = &filter.search {
                    let q = q.to_lowercase();
                    let hay = format!(
                        "{} {}",
                        t.title.to_lowercase(),
                        t.description.as_deref().unwrap_or("").to_lowercase()
                    );
                    if !hay.contains(&q) {
                        return false;
                    }
                }
                true
            })
            .collect();

        matched.sort_by(|a, b| {
            let ord = match sort.key {
                SortKey::Priority => a.priority.cmp(&b.priority),
                SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
                SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            };
            match sort.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total_matched = matched.len();
        let page: Vec<Task> = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        let has_more = offset + page.len() < total_matched;

        Page {
            items: page,
            has_more,
            total_unfiltered,
        }
    }

    /// All ready tasks, sorted by (priority asc, created_at asc).
    pub fn get_ready_tasks(&self) -> Vec<Task> {
        let mut ready: Vec<Task> = self.tasks.values().filter(|t| t.is_ready()).cloned().collect();
        ready.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        ready
    }

    pub fn current_task_id(&self) -> Option<&TaskId> {
        self.current_task.as_ref()
    }

    /// Returns the current task, auto-assigning the head of the ready queue
    /// if none is set. `head_commit` is the current git HEAD, supplied by
    /// the caller (the tool layer owns `GitSync`, not the store).
    pub fn get_current_task(&mut self, head_commit: Option<&str>) -> Result<Task, TaskStoreError> {
        if let Some(id) = self.current_task.clone() {
            return self.get_task(&id);
        }

        let head_of_queue = self
            .get_ready_tasks()
            .into_iter()
            .next()
            .ok_or_else(|| TaskStoreError::TaskNotFound(TaskId("<none-ready>".into())))?;

        let id = head_of_queue.id.clone();
        self.set_current_task(&id)?;
        if let Some(commit) = head_commit {
            if let Some(task) = self.tasks.get_mut(&id) {
                if task.started_at_commit.is_none() {
                    task.started_at_commit = Some(commit.to_string());
                    self.persist_task_fields(&id)?;
                }
            }
        }
        self.get_task(&id)
    }

    // ── Mutations ────────────────────────────────────────────────────────

    pub fn create_task(&mut self, params: CreateTaskParams) -> Result<TaskId, TaskStoreError> {
        if let Some(parent) = &params.parent_id {
            if !self.tasks.contains_key(parent) {
                return Err(TaskStoreError::TaskNotFound(parent.clone()));
            }
        }
        if params.task_type == TaskType::Molecule && !params.blocked_by.is_empty() {
            return Err(TaskStoreError::CannotBlockMolecule(TaskId("<new>".into())));
        }
        for src in &params.blocked_by {
            if !self.tasks.contains_key(src) {
                return Err(TaskStoreError::SourceNotFound(src.clone()));
            }
        }

        let mut id = TaskId::generate();
        let mut attempts = 0;
        while self.tasks.contains_key(&id) {
            attempts += 1;
            if attempts > 16 {
                return Err(TaskStoreError::TaskIdCollision(id));
            }
            id = TaskId::generate();
        }

        let now = Utc::now();
        let blocked_by_count = params
            .blocked_by
            .iter()
            .filter(|src| self.tasks.get(*src).map(|t| t.status != Status::Completed).unwrap_or(false))
            .count() as u32;

        let task = Task {
            id: id.clone(),
            title: params.title.clone(),
            description: params.description.clone(),
            status: if blocked_by_count > 0 { Status::Blocked } else { Status::Pending },
            priority: params.priority,
            task_type: params.task_type,
            parent_id: params.parent_id.clone(),
            labels: params.labels.clone(),
            blocked_by_count,
            created_at: now,
            updated_at: now,
            completed_at: None,
            started_at_commit: None,
            completed_at_commit: None,
            comments: Vec::new(),
        };

        let labels_json = serde_json::to_string(&task.labels).map_err(|e| TaskStoreError::Serialization(e.to_string()))?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO tasks (id, title, description, status, priority, task_type, parent_id, labels,
                                 blocked_by_count, created_at, updated_at, completed_at,
                                 started_at_commit, completed_at_commit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL, NULL, NULL)",
            params![
                task.id.0,
                task.title,
                task.description,
                task.status.to_string(),
                task.priority.as_str(),
                task.task_type.as_str(),
                task.parent_id.as_ref().map(|p| p.0.clone()),
                labels_json,
                task.blocked_by_count as i64,
                fmt_ts(task.created_at),
                fmt_ts(task.updated_at),
            ],
        )?;
        if let Some(parent) = &params.parent_id {
            tx.execute(
                "INSERT OR IGNORE INTO dependencies (src_id, dst_id, dep_type, weight) VALUES (?1, ?2, 'parent', 1.0)",
                params![parent.0, task.id.0],
            )?;
        }
        for src in &params.blocked_by {
            tx.execute(
                "INSERT OR IGNORE INTO dependencies (src_id, dst_id, dep_type, weight) VALUES (?1, ?2, 'blocks', 1.0)",
                params![src.0, task.id.0],
            )?;
        }
        tx.commit()?;

        if let Some(parent) = &params.parent_id {
            self.dependencies.push(Dependency {
                src_id: parent.clone(),
                dst_id: task.id.clone(),
                dep_type: DepType::Parent,
                weight: 1.0,
            });
        }
        for src in &params.blocked_by {
            self.dependencies.push(Dependency {
                src_id: src.clone(),
                dst_id: task.id.clone(),
                dep_type: DepType::Blocks,
                weight: 1.0,
            });
            self.blocks_out.entry(src.clone()).or_default().insert(task.id.clone());
        }

        self.tasks.insert(task.id.clone(), task);
        Ok(id)
    }

    pub fn set_current_task(&mut self, id: &TaskId) -> Result<(), TaskStoreError> {
        let task = self.tasks.get(id).ok_or_else(|| TaskStoreError::TaskNotFound(id.clone()))?;
        if task.task_type == TaskType::Molecule {
            return Err(TaskStoreError::CannotStartMolecule(id.clone()));
        }
        self.current_task = Some(id.clone());
        if let Some(task) = self.tasks.get_mut(id) {
            if task.status == Status::Pending {
                task.status = Status::InProgress;
                task.updated_at = Utc::now();
            }
        }
        self.persist_task_fields(id)?;
        Ok(())
    }

    /// Marks `id` completed, cascades through active `blocks` edges, and
    /// returns the set of tasks whose `blocked_by_count` hit zero.
    pub fn complete_task(&mut self, id: &TaskId) -> Result<Vec<TaskId>, TaskStoreError> {
        if !self.tasks.contains_key(id) {
            return Err(TaskStoreError::TaskNotFound(id.clone()));
        }

        let now = Utc::now();
        {
            let task = self.tasks.get_mut(id).unwrap();
            task.status = Status::Completed;
            task.completed_at = Some(now);
            task.updated_at = now;
        }

        let mut unblocked = Vec::new();
        if let Some(dsts) = self.blocks_out.get(id).cloned() {
            for dst in dsts {
                if let Some(dst_task) = self.tasks.get_mut(&dst) {
                    if dst_task.blocked_by_count > 0 {
                        dst_task.blocked_by_count -= 1;
                        dst_task.updated_at = now;
                        if dst_task.blocked_by_count == 0 {
                            if dst_task.status == Status::Blocked {
                                dst_task.status = Status::Pending;
                            }
                            unblocked.push(dst.clone());
                        }
                    }
                }
            }
        }

        if self.current_task.as_ref() == Some(id) {
            self.current_task = None;
        }

        self.persist_task_fields(id)?;
        for dst in &unblocked {
            self.persist_task_fields(dst)?;
        }
        Ok(unblocked)
    }

    pub fn update_task(&mut self, id: &TaskId, params: UpdateTaskParams) -> Result<(), TaskStoreError> {
        {
            let task = self.tasks.get(id).ok_or_else(|| TaskStoreError::TaskNotFound(id.clone()))?;
            if task.task_type == TaskType::Wisp {
                return Err(TaskStoreError::CannotUpdateWisp(id.clone()));
            }
            if let Some(new_type) = params.task_type {
                if (new_type == TaskType::Wisp) != (task.task_type == TaskType::Wisp) {
                    return Err(TaskStoreError::CannotChangeWispType(id.clone()));
                }
            }
            if params.status == Some(Status::Blocked) && task.task_type == TaskType::Molecule {
                return Err(TaskStoreError::CannotBlockMolecule(id.clone()));
            }
        }

        if params.status == Some(Status::Completed) {
            // Apply the non-status fields first, then delegate completion.
            let mut rest = params.clone();
            rest.status = None;
            self.apply_update_fields(id, rest)?;
            self.complete_task(id)?;
            return Ok(());
        }

        self.apply_update_fields(id, params)?;
        Ok(())
    }

    fn apply_update_fields(&mut self, id: &TaskId, params: UpdateTaskParams) -> Result<(), TaskStoreError> {
        let task = self.tasks.get_mut(id).ok_or_else(|| TaskStoreError::TaskNotFound(id.clone()))?;
        if let Some(title) = params.title {
            task.title = title;
        }
        if let Some(description) = params.description {
            task.description = description;
        }
        if let Some(status) = params.status {
            task.status = status;
        }
        if let Some(priority) = params.priority {
            task.priority = priority;
        }
        if let Some(task_type) = params.task_type {
            task.task_type = task_type;
        }
        if let Some(labels) = params.labels {
            task.labels = labels;
        }
        if let Some(commit) = params.completed_at_commit {
            task.completed_at_commit = Some(commit);
        }
        task.updated_at = Utc::now();
        self.persist_task_fields(id)
    }

    pub fn add_dependency(&mut self, src: &TaskId, dst: &TaskId, dep_type: DepType) -> Result<(), TaskStoreError> {
        if src == dst {
            return Err(TaskStoreError::SelfDependency(src.clone()));
        }
        if !self.tasks.contains_key(src) {
            return Err(TaskStoreError::SourceNotFound(src.clone()));
        }
        if !self.tasks.contains_key(dst) {
            return Err(TaskStoreError::DestNotFound(dst.clone()));
        }
        if self
            .dependencies
            .iter()
            .any(|d| d.src_id == *src && d.dst_id == *dst && d.dep_type == dep_type)
        {
            return Err(TaskStoreError::DependencyExists {
                src: src.clone(),
                dst: dst.clone(),
                dep_type: dep_type.as_str(),
            });
        }

        if dep_type == DepType::Blocks {
            if self.tasks[dst].task_type == TaskType::Molecule {
                return Err(TaskStoreError::CannotBlockMolecule(dst.clone()));
            }
            if self.reaches(dst, src) {
                return Err(TaskStoreError::CircularDependency {
                    src: src.clone(),
                    dst: dst.clone(),
                });
            }
        }

        self.conn.execute(
            "INSERT INTO dependencies (src_id, dst_id, dep_type, weight) VALUES (?1, ?2, ?3, 1.0)",
            params![src.0, dst.0, dep_type.as_str()],
        )?;

        self.dependencies.push(Dependency {
            src_id: src.clone(),
            dst_id: dst.clone(),
            dep_type,
            weight: 1.0,
        });

        match dep_type {
            DepType::Blocks => {
                self.blocks_out.entry(src.clone()).or_default().insert(dst.clone());
                let src_completed = self.tasks[src].status == Status::Completed;
                if !src_completed {
                    if let Some(dst_task) = self.tasks.get_mut(dst) {
                        dst_task.blocked_by_count += 1;
                        dst_task.updated_at = Utc::now();
                        if dst_task.status == Status::Pending {
                            dst_task.status = Status::Blocked;
                        }
                    }
                    self.persist_task_fields(dst)?;
                }
            }
            DepType::Parent => {
                if let Some(dst_task) = self.tasks.get_mut(dst) {
                    dst_task.parent_id = Some(src.clone());
                    dst_task.updated_at = Utc::now();
                }
                self.persist_task_fields(dst)?;
            }
            DepType::Related | DepType::Discovered => {}
        }

        Ok(())
    }

    /// Depth-first reachability: can `from` reach `to` by following `blocks` edges?
    fn reaches(&self, from: &TaskId, to: &TaskId) -> bool {
        let mut stack = vec![from.clone()];
        let mut seen = HashSet::new();
        while let Some(node) = stack.pop() {
            if &node == to {
                return true;
            }
            if !seen.insert(node.clone()) {
                continue;
            }
            if let Some(next) = self.blocks_out.get(&node) {
                stack.extend(next.iter().cloned());
            }
        }
        false
    }

    pub fn add_comment(&mut self, id: &TaskId, agent: impl Into<String>, content: impl Into<String>) -> Result<(), TaskStoreError> {
        let task = self.tasks.get_mut(id).ok_or_else(|| TaskStoreError::TaskNotFound(id.clone()))?;
        let comment = Comment {
            agent: agent.into(),
            content: content.into(),
            timestamp: Utc::now(),
        };
        let seq = task.comments.len() as i64;
        task.comments.push(comment.clone());
        task.updated_at = Utc::now();

        self.conn.execute(
            "INSERT INTO comments (task_id, seq, agent, content, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id.0, seq, comment.agent, comment.content, fmt_ts(comment.timestamp)],
        )?;
        self.persist_task_fields(id)?;
        Ok(())
    }

    pub fn get_children(&self, parent_id: &TaskId) -> Vec<Task> {
        let mut children: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| t.parent_id.as_ref() == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        children
    }

    pub fn get_siblings(&self, id: &TaskId) -> Result<Vec<Task>, TaskStoreError> {
        let task = self.get_task(id)?;
        let Some(parent) = task.parent_id.clone() else {
            return Ok(Vec::new());
        };
        Ok(self
            .get_children(&parent)
            .into_iter()
            .filter(|t| t.id != *id)
            .collect())
    }

    pub fn get_epic_summary(&self, molecule_id: &TaskId) -> Result<EpicSummary, TaskStoreError> {
        self.get_task(molecule_id)?; // validates existence
        let children = self.get_children(molecule_id);
        let total = children.len();
        let completed = children.iter().filter(|t| t.status == Status::Completed).count();
        let in_progress = children.iter().filter(|t| t.status == Status::InProgress).count();
        let blocked = children.iter().filter(|t| t.status == Status::Blocked).count();
        let pending = children.iter().filter(|t| t.status == Status::Pending).count();
        let completion_percent = if total == 0 {
            0.0
        } else {
            100.0 * completed as f64 / total as f64
        };
        Ok(EpicSummary {
            total,
            completed,
            in_progress,
            blocked,
            pending,
            completion_percent,
        })
    }

    pub fn get_tasks_with_comment_prefix(&self, prefix: &str) -> Vec<Task> {
        let mut matched: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| t.comments.iter().any(|c| c.has_prefix(prefix)))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matched
    }

    pub fn dependencies_of(&self, id: &TaskId) -> Vec<Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.src_id == *id || d.dst_id == *id)
            .cloned()
            .collect()
    }

    pub fn all_dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    fn persist_task_fields(&mut self, id: &TaskId) -> Result<(), TaskStoreError> {
        let task = self.tasks.get(id).ok_or_else(|| TaskStoreError::TaskNotFound(id.clone()))?;
        let labels_json = serde_json::to_string(&task.labels).map_err(|e| TaskStoreError::Serialization(e.to_string()))?;
        self.conn.execute(
            "UPDATE tasks SET title=?2, description=?3, status=?4, priority=?5, task_type=?6, parent_id=?7,
                               labels=?8, blocked_by_count=?9, updated_at=?10, completed_at=?11,
                               started_at_commit=?12, completed_at_commit=?13
             WHERE id=?1",
            params![
                task.id.0,
                task.title,
                task.description,
                task.status.to_string(),
                task.priority.as_str(),
                task.task_type.as_str(),
                task.parent_id.as_ref().map(|p| p.0.clone()),
                labels_json,
                task.blocked_by_count as i64,
                fmt_ts(task.updated_at),
                task.completed_at.map(fmt_ts),
                task.started_at_commit,
                task.completed_at_commit,
            ],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn task_exists(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }
}

fn fmt_ts(ts: chrono::DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_ts(s: &str) -> Result<chrono::DateTime<Utc>, TaskStoreError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TaskStoreError::Serialization(e.to_string()))
}
