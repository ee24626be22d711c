use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::permission::RiskLevel;
use crate::task::{
    CreateTaskParams, DepType, ListFilter, OneOrSet, Priority, SortSpec, Status, TaskId, TaskType,
    UpdateTaskParams,
};
use crate::tools::{ErrorKind, Scope, ToolDefinition};

fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, (ErrorKind, String)> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| (ErrorKind::InvalidArguments, format!("missing required string argument `{key}`")))
}

fn arg_task_id(args: &Value, key: &str) -> Result<TaskId, (ErrorKind, String)> {
    Ok(TaskId::from(arg_str(args, key)?))
}

fn parse_priority(v: &Value) -> Option<Priority> {
    match v {
        Value::Number(n) => match n.as_u64()? {
            0 => Some(Priority::Critical),
            1 => Some(Priority::High),
            2 => Some(Priority::Medium),
            3 => Some(Priority::Low),
            4 => Some(Priority::Wishlist),
            _ => None,
        },
        Value::String(s) => Priority::parse(s),
        _ => None,
    }
}

pub fn create_task() -> ToolDefinition {
    ToolDefinition::builder(
        "create_task",
        "Creates a new task in the task graph. priority is 0 (critical) through 4 (wishlist).",
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "description": { "type": "string" },
                "priority": { "type": "integer", "minimum": 0, "maximum": 4 },
                "task_type": { "type": "string", "enum": ["task", "bug", "feature", "research", "molecule", "wisp"] },
                "parent_id": { "type": "string" },
                "labels": { "type": "array", "items": { "type": "string" } },
                "blocked_by": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["title"]
        }),
        Box::new(|args, ctx| {
            let store = ctx.require_task_store()?;
            let title = arg_str(args, "title")?.to_string();
            let description = args.get("description").and_then(Value::as_str).map(str::to_string);
            let priority = args.get("priority").and_then(parse_priority).unwrap_or_default();
            let task_type = args
                .get("task_type")
                .and_then(Value::as_str)
                .and_then(TaskType::parse)
                .unwrap_or_default();
            let parent_id = args.get("parent_id").and_then(Value::as_str).map(TaskId::from);
            let labels: BTreeSet<String> = args
                .get("labels")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            let blocked_by: Vec<TaskId> = args
                .get("blocked_by")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(TaskId::from).collect())
                .unwrap_or_default();

            let id = store
                .create_task(CreateTaskParams {
                    title,
                    description,
                    priority,
                    task_type,
                    parent_id,
                    labels,
                    blocked_by,
                })
                .map_err(|e| (e.to_error_kind(), e.to_string()))?;
            Ok(id.to_string())
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn list_tasks() -> ToolDefinition {
    ToolDefinition::builder(
        "list_tasks",
        "Lists tasks matching an optional filter, paginated.",
        json!({
            "type": "object",
            "properties": {
                "status": { "type": "string" },
                "priority": { "type": "integer" },
                "task_type": { "type": "string" },
                "parent_id": { "type": "string" },
                "label": { "type": "string" },
                "ready_only": { "type": "boolean" },
                "search": { "type": "string" },
                "limit": { "type": "integer" },
                "offset": { "type": "integer" }
            }
        }),
        Box::new(|args, ctx| {
            let store = ctx.require_task_store()?;
            let filter = ListFilter {
                status: args.get("status").and_then(Value::as_str).and_then(Status::parse).map(OneOrSet::One),
                priority: args.get("priority").and_then(parse_priority),
                task_type: args
                    .get("task_type")
                    .and_then(Value::as_str)
                    .and_then(TaskType::parse)
                    .map(OneOrSet::One),
                parent: args.get("parent_id").and_then(Value::as_str).map(TaskId::from),
                label: args.get("label").and_then(Value::as_str).map(str::to_string),
                ready_only: args.get("ready_only").and_then(Value::as_bool).unwrap_or(false),
                search: args.get("search").and_then(Value::as_str).map(str::to_string),
            };
            let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(50) as usize;
            let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
            let page = store.list_tasks(&filter, SortSpec::default(), limit, offset);
            serde_json::to_string(&json!({
                "items": page.items,
                "has_more": page.has_more,
                "total_unfiltered": page.total_unfiltered,
            }))
            .map_err(|e| (ErrorKind::InternalError, e.to_string()))
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn get_ready_tasks() -> ToolDefinition {
    ToolDefinition::builder(
        "get_ready_tasks",
        "Returns all tasks that are pending, unblocked, and not a molecule container, sorted by priority then age.",
        json!({ "type": "object", "properties": {} }),
        Box::new(|_args, ctx| {
            let store = ctx.require_task_store()?;
            serde_json::to_string(&store.get_ready_tasks()).map_err(|e| (ErrorKind::InternalError, e.to_string()))
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn get_current_task() -> ToolDefinition {
    ToolDefinition::builder(
        "get_current_task",
        "Returns the current task, auto-assigning the head of the ready queue if none is set.",
        json!({ "type": "object", "properties": {} }),
        Box::new(|_args, ctx| {
            let head = match ctx.git_sync.as_deref() {
                Some(git) => {
                    let handle = tokio::runtime::Handle::try_current().ok();
                    handle.and_then(|h| {
                        tokio::task::block_in_place(|| h.block_on(async { git.get_current_head().await.ok() }))
                    })
                }
                None => None,
            };
            let store = ctx.require_task_store()?;
            let task = store.get_current_task(head.as_deref()).map_err(|e| (e.to_error_kind(), e.to_string()))?;
            serde_json::to_string(&task).map_err(|e| (ErrorKind::InternalError, e.to_string()))
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn set_current_task() -> ToolDefinition {
    ToolDefinition::builder(
        "set_current_task",
        "Sets the current task explicitly.",
        json!({
            "type": "object",
            "properties": { "id": { "type": "string" } },
            "required": ["id"]
        }),
        Box::new(|args, ctx| {
            let store = ctx.require_task_store()?;
            let id = arg_task_id(args, "id")?;
            store.set_current_task(&id).map_err(|e| (e.to_error_kind(), e.to_string()))?;
            Ok(id.to_string())
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn start_task() -> ToolDefinition {
    ToolDefinition::builder(
        "start_task",
        "Alias for set_current_task; fails for molecule tasks with invalid_arguments.",
        json!({
            "type": "object",
            "properties": { "id": { "type": "string" } },
            "required": ["id"]
        }),
        Box::new(|args, ctx| {
            let store = ctx.require_task_store()?;
            let id = arg_task_id(args, "id")?;
            store.set_current_task(&id).map_err(|e| {
                let kind = match &e {
                    crate::task::TaskStoreError::CannotStartMolecule(_) => ErrorKind::InvalidArguments,
                    other => other.to_error_kind(),
                };
                (kind, e.to_string())
            })?;
            Ok(id.to_string())
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn update_task() -> ToolDefinition {
    ToolDefinition::builder(
        "update_task",
        "Updates mutable fields of a task. status=completed delegates to complete_task.",
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "title": { "type": "string" },
                "description": { "type": "string" },
                "status": { "type": "string" },
                "priority": { "type": "integer" },
                "task_type": { "type": "string" },
                "labels": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["id"]
        }),
        Box::new(|args, ctx| {
            let store = ctx.require_task_store()?;
            let id = arg_task_id(args, "id")?;
            let params = UpdateTaskParams {
                title: args.get("title").and_then(Value::as_str).map(str::to_string),
                description: args.get("description").and_then(Value::as_str).map(|s| Some(s.to_string())),
                status: args.get("status").and_then(Value::as_str).and_then(Status::parse),
                priority: args.get("priority").and_then(parse_priority),
                task_type: args.get("task_type").and_then(Value::as_str).and_then(TaskType::parse),
                labels: args
                    .get("labels")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect()),
                completed_at_commit: None,
            };
            store.update_task(&id, params).map_err(|e| (e.to_error_kind(), e.to_string()))?;
            Ok(id.to_string())
        }),
    )
    .risk(RiskLevel::Low)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn complete_task() -> ToolDefinition {
    ToolDefinition::builder(
        "complete_task",
        "Marks a task completed and cascades unblocking to dependents.",
        json!({
            "type": "object",
            "properties": { "id": { "type": "string" } },
            "required": ["id"]
        }),
        Box::new(|args, ctx| {
            let store = ctx.require_task_store()?;
            let id = arg_task_id(args, "id")?;
            let unblocked = store.complete_task(&id).map_err(|e| (e.to_error_kind(), e.to_string()))?;
            serde_json::to_string(&json!({ "unblocked": unblocked }))
                .map_err(|e| (ErrorKind::InternalError, e.to_string()))
        }),
    )
    .risk(RiskLevel::Low)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn block_task() -> ToolDefinition {
    ToolDefinition::builder(
        "block_task",
        "Marks a task blocked (manual override, independent of blocked_by_count).",
        json!({
            "type": "object",
            "properties": { "id": { "type": "string" }, "reason": { "type": "string" } },
            "required": ["id", "reason"]
        }),
        Box::new(|args, ctx| {
            let store = ctx.require_task_store()?;
            let id = arg_task_id(args, "id")?;
            let reason = arg_str(args, "reason")?;
            store
                .update_task(
                    &id,
                    UpdateTaskParams {
                        status: Some(Status::Blocked),
                        ..Default::default()
                    },
                )
                .map_err(|e| (e.to_error_kind(), e.to_string()))?;
            store
                .add_comment(&id, "system", format!("{}{}", crate::task::PREFIX_BLOCKED, reason))
                .map_err(|e| (e.to_error_kind(), e.to_string()))?;
            Ok(id.to_string())
        }),
    )
    .risk(RiskLevel::Low)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn add_dependency() -> ToolDefinition {
    ToolDefinition::builder(
        "add_dependency",
        "Adds a directed dependency edge between two tasks.",
        json!({
            "type": "object",
            "properties": {
                "src_id": { "type": "string" },
                "dst_id": { "type": "string" },
                "dep_type": { "type": "string", "enum": ["blocks", "parent", "related", "discovered"] }
            },
            "required": ["src_id", "dst_id", "dep_type"]
        }),
        Box::new(|args, ctx| {
            let store = ctx.require_task_store()?;
            let src = arg_task_id(args, "src_id")?;
            let dst = arg_task_id(args, "dst_id")?;
            let dep_type = DepType::parse(arg_str(args, "dep_type")?)
                .ok_or_else(|| (ErrorKind::InvalidArguments, "unknown dep_type".to_string()))?;
            store.add_dependency(&src, &dst, dep_type).map_err(|e| (e.to_error_kind(), e.to_string()))?;
            Ok(format!("{src} -> {dst} ({})", dep_type.as_str()))
        }),
    )
    .risk(RiskLevel::Low)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn add_comment() -> ToolDefinition {
    ToolDefinition::builder(
        "add_comment",
        "Appends a comment to a task. Certain prefixes (BLOCKED:, REJECTED:, APPROVED:, QUEUED:, SUMMARY:) carry protocol meaning.",
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "agent": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["id", "agent", "content"]
        }),
        Box::new(|args, ctx| {
            let store = ctx.require_task_store()?;
            let id = arg_task_id(args, "id")?;
            let agent = arg_str(args, "agent")?.to_string();
            let content = arg_str(args, "content")?.to_string();
            store.add_comment(&id, agent, content).map_err(|e| (e.to_error_kind(), e.to_string()))?;
            Ok(id.to_string())
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn get_epic_summary() -> ToolDefinition {
    ToolDefinition::builder(
        "get_epic_summary",
        "Returns aggregate progress counts for a molecule's direct children.",
        json!({
            "type": "object",
            "properties": { "id": { "type": "string" } },
            "required": ["id"]
        }),
        Box::new(|args, ctx| {
            let store = ctx.require_task_store()?;
            let id = arg_task_id(args, "id")?;
            let summary = store.get_epic_summary(&id).map_err(|e| (e.to_error_kind(), e.to_string()))?;
            serde_json::to_string(&summary).map_err(|e| (ErrorKind::InternalError, e.to_string()))
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::TodoManagement)
    .build()
}
