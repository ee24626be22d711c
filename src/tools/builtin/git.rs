use serde_json::json;

use crate::permission::RiskLevel;
use crate::tools::{ErrorKind, Scope, ToolDefinition};

pub fn git_status() -> ToolDefinition {
    ToolDefinition::builder(
        "git_status",
        "Reports whether there are uncommitted code changes outside of .tasks/.",
        json!({ "type": "object", "properties": {} }),
        Box::new(|_args, ctx| {
            let git = ctx.require_git_sync()?;
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|_| (ErrorKind::InternalError, "no async runtime available for git_status".to_string()))?;
            tokio::task::block_in_place(|| {
                handle.block_on(async {
                    git.has_uncommitted_code_changes()
                        .await
                        .map(|dirty| if dirty { "dirty".to_string() } else { "clean".to_string() })
                        .map_err(|e| (e.to_error_kind(), e.to_string()))
                })
            })
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::ExecuteCommands)
    .build()
}

pub fn git_diff() -> ToolDefinition {
    ToolDefinition::builder(
        "git_diff",
        "Returns the current git HEAD hash, for stamping task commit fields.",
        json!({ "type": "object", "properties": {} }),
        Box::new(|_args, ctx| {
            let git = ctx.require_git_sync()?;
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|_| (ErrorKind::InternalError, "no async runtime available for git_diff".to_string()))?;
            tokio::task::block_in_place(|| {
                handle.block_on(async { git.get_current_head().await.map_err(|e| (e.to_error_kind(), e.to_string())) })
            })
        }),
    )
    .risk(RiskLevel::Safe)
    .scope(Scope::ExecuteCommands)
    .build()
}
