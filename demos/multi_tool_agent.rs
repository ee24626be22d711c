//! # Multi-Tool Agent Example
//!
//! Drives the full planner → tinkerer → judge pipeline through the
//! `Orchestrator`, handing each role off to a fresh `AgentRuntime` until
//! the orchestrator reaches a terminal role.
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example multi_tool_agent
//! ```

use std::sync::{Arc, Mutex};

use agentcore::tools::builtin;
use agentcore::tools::{CompletionFlags, ExecutionContext};
use agentcore::{
    event_from_flags, AgentRole, AgentRuntime, AutoDenyHandler, CancellationToken, GitSync,
    InMemoryMessageLog, Message, MessageLog, OpenAiCaller, Orchestrator, PermissionManager,
    TaskStore, ToolRegistry,
};

fn system_prompt_for(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Planner => {
            "You are the planning agent. Create tasks for the user's request with \
             create_task, then call planning_done."
        }
        AgentRole::Tinkerer => {
            "You are the implementing agent. Use get_current_task and the file tools to do \
             the work, then call submit_work with the files you changed."
        }
        AgentRole::Judge => {
            "You are the reviewing agent. Inspect the diff with git_diff, then call \
             approve_task or request_revision."
        }
        AgentRole::Done | AgentRole::Error => "",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== agentcore multi-tool pipeline example ===\n");

    let mut registry = ToolRegistry::new();
    builtin::register_all(&mut registry);

    let mut task_store = TaskStore::open_in_memory()?;
    let mut permissions = PermissionManager::in_memory();
    let mut log = InMemoryMessageLog::new();
    let mut git_sync = GitSync::detect(std::env::current_dir()?).await.ok();

    let conv_id = "pipeline-session";
    log.append(Message::user(conv_id, "Add a README section documenting the CLI flags.")).await?;

    let caller = Arc::new(OpenAiCaller::new());
    let mut orchestrator = Orchestrator::new();
    let cancel = CancellationToken::new();
    let mut handler = AutoDenyHandler;

    while !orchestrator.is_terminal() {
        let role = orchestrator.current_role();
        println!("\n── role: {role} ──");

        let flags = Arc::new(Mutex::new(CompletionFlags::default()));
        let mut ctx = ExecutionContext::new(role.to_string(), flags.clone()).with_task_store(&mut task_store);
        let mut ctx = match git_sync.as_mut() {
            Some(git) => ctx.with_git_sync(git),
            None => ctx,
        };

        let runtime = AgentRuntime::new(conv_id, role.to_string(), system_prompt_for(role), "gpt-4o", caller.clone());
        runtime
            .run(&registry, &mut permissions, &mut ctx, &mut log, &mut handler, &cancel, None)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        let snapshot_event = {
            let flags = flags.lock().unwrap();
            event_from_flags(role, &flags)
        };
        let Some(event) = snapshot_event else {
            println!("role {role} produced no completion signal; stopping");
            break;
        };
        orchestrator.advance(event)?;
    }

    println!("\npipeline finished in role: {}", orchestrator.current_role());
    Ok(())
}
