use serde_json::{json, Value};

use crate::permission::RiskLevel;
use crate::task::{TaskId, UpdateTaskParams};
use crate::tools::{ErrorKind, Scope, ToolDefinition};

fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, (ErrorKind, String)> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| (ErrorKind::InvalidArguments, format!("missing required string argument `{key}`")))
}

/// Called by the planner to hand control to the tinkerer for the next
/// ready task.
pub fn planning_done() -> ToolDefinition {
    ToolDefinition::builder(
        "planning_done",
        "Signals that planning for this turn is complete; the orchestrator will select the next task for the tinkerer.",
        json!({ "type": "object", "properties": { "notes": { "type": "string" } } }),
        Box::new(|_args, ctx| {
            ctx.flags.lock().unwrap().planning_complete = true;
            Ok("planning complete".to_string())
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::TodoManagement)
    .build()
}

/// Atomic sequence: `git reset HEAD`, `git add` per path, `git commit`,
/// capture the new HEAD into `completed_at_commit`, append a `SUMMARY:`
/// comment, flip `tinkering_complete`.
pub fn submit_work() -> ToolDefinition {
    ToolDefinition::builder(
        "submit_work",
        "Commits the listed files with the given message and records the result on the current task.",
        json!({
            "type": "object",
            "properties": {
                "files": { "type": "array", "items": { "type": "string" } },
                "commit_message": { "type": "string" },
                "summary": { "type": "string" }
            },
            "required": ["files", "commit_message", "summary"]
        }),
        Box::new(|args, ctx| {
            let files: Vec<String> = args
                .get("files")
                .and_then(Value::as_array)
                .ok_or_else(|| (ErrorKind::InvalidArguments, "missing `files` array".to_string()))?
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            let commit_message = arg_str(args, "commit_message")?.to_string();
            let summary = arg_str(args, "summary")?.to_string();

            let git = ctx.require_git_sync()?;
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|_| (ErrorKind::InternalError, "no async runtime available for submit_work".to_string()))?;
            tokio::task::block_in_place(|| {
                handle.block_on(git.commit_files(&files, &commit_message))
            })
            .map_err(|e| (e.to_error_kind(), e.to_string()))?;
            let new_head = tokio::task::block_in_place(|| handle.block_on(git.get_current_head()))
                .map_err(|e| (e.to_error_kind(), e.to_string()))?;

            let store = ctx.require_task_store()?;
            let current = store
                .current_task_id()
                .cloned()
                .ok_or_else(|| (ErrorKind::ValidationFailed, "no current task to submit work for".to_string()))?;
            store
                .update_task(
                    &current,
                    UpdateTaskParams {
                        completed_at_commit: Some(new_head.clone()),
                        ..Default::default()
                    },
                )
                .map_err(|e| (e.to_error_kind(), e.to_string()))?;
            store
                .add_comment(&current, "tinkerer", format!("{}{}", crate::task::PREFIX_SUMMARY, summary))
                .map_err(|e| (e.to_error_kind(), e.to_string()))?;

            ctx.flags.lock().unwrap().tinkering_complete = true;
            Ok(new_head)
        }),
    )
    .risk(RiskLevel::Medium)
    .scope(Scope::ExecuteCommands)
    .build()
}

/// Also available to the tinkerer for explicit mid-turn signalling;
/// `submit_work` sets the same flag as its final step.
pub fn tinkering_done() -> ToolDefinition {
    ToolDefinition::builder(
        "tinkering_done",
        "Signals that the tinkerer's work for this task is complete.",
        json!({ "type": "object", "properties": {} }),
        Box::new(|_args, ctx| {
            ctx.flags.lock().unwrap().tinkering_complete = true;
            Ok("tinkering complete".to_string())
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn approve_task() -> ToolDefinition {
    ToolDefinition::builder(
        "approve_task",
        "Judge approval: completes the current task and advances the orchestrator to the next ready task.",
        json!({
            "type": "object",
            "properties": { "reason": { "type": "string" } },
            "required": ["reason"]
        }),
        Box::new(|args, ctx| {
            let reason = arg_str(args, "reason")?.to_string();
            let store = ctx.require_task_store()?;
            let current = store
                .current_task_id()
                .cloned()
                .ok_or_else(|| (ErrorKind::ValidationFailed, "no current task to approve".to_string()))?;
            store
                .add_comment(&current, "judge", format!("{}{}", crate::task::PREFIX_APPROVED, reason))
                .map_err(|e| (e.to_error_kind(), e.to_string()))?;
            store.complete_task(&current).map_err(|e| (e.to_error_kind(), e.to_string()))?;
            ctx.flags.lock().unwrap().task_approved = Some(current.to_string());
            Ok(current.to_string())
        }),
    )
    .risk(RiskLevel::Low)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn request_revision() -> ToolDefinition {
    ToolDefinition::builder(
        "request_revision",
        "Judge rejection: appends REJECTED: feedback to the task and re-queues the tinkerer with that feedback.",
        json!({
            "type": "object",
            "properties": {
                "task_id": { "type": "string" },
                "feedback": { "type": "string" }
            },
            "required": ["task_id", "feedback"]
        }),
        Box::new(|args, ctx| {
            let task_id = TaskId::from(arg_str(args, "task_id")?);
            let feedback = arg_str(args, "feedback")?.to_string();
            let store = ctx.require_task_store()?;
            store
                .add_comment(&task_id, "judge", format!("{}{}", crate::task::PREFIX_REJECTED, feedback))
                .map_err(|e| (e.to_error_kind(), e.to_string()))?;
            ctx.flags.lock().unwrap().revision_requested = Some((task_id.to_string(), feedback.clone()));
            Ok(format!("revision requested for {task_id}"))
        }),
    )
    .risk(RiskLevel::Low)
    .scope(Scope::TodoManagement)
    .build()
}

pub fn end_session() -> ToolDefinition {
    ToolDefinition::builder(
        "end_session",
        "Ends the session: exports tasks, writes SESSION_STATE.md, and commits .tasks/.",
        json!({
            "type": "object",
            "properties": { "notes": { "type": "string" } }
        }),
        Box::new(|args, ctx| {
            let notes = args.get("notes").and_then(Value::as_str).unwrap_or("").to_string();
            let (store, git) = ctx.require_store_and_git()?;
            git.sync_all_with_notes(store, &notes).map_err(|e| (e.to_error_kind(), e.to_string()))?;
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|_| (ErrorKind::InternalError, "no async runtime available for end_session".to_string()))?;
            if let Err(e) = tokio::task::block_in_place(|| handle.block_on(git.commit("chore: sync session state"))) {
                return Ok(format!("git_warning: {e}"));
            }
            ctx.flags.lock().unwrap().session_ended = true;
            Ok("session ended".to_string())
        }),
    )
    .risk(RiskLevel::Low)
    .scope(Scope::ExecuteCommands)
    .build()
}

/// Same contract as `end_session`; kept as a distinct name because the
/// tool surface exposes both and they are bound to different CLI
/// commands even though they do the same thing.
pub fn land_the_plane() -> ToolDefinition {
    let mut def = end_session();
    def.name = "land_the_plane".to_string();
    def.description = "Alias for end_session: wraps up the session, syncing .tasks/ and committing.".to_string();
    def
}
