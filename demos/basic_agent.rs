//! # Basic Agent Example
//!
//! Runs a single planner turn against OpenAI with the built-in tool set and
//! an in-memory task store.
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example basic_agent
//! ```

use std::sync::{Arc, Mutex};

use agentcore::tools::builtin;
use agentcore::tools::{CompletionFlags, ExecutionContext};
use agentcore::{
    AgentRuntime, AutoDenyHandler, CancellationToken, InMemoryMessageLog, Message, MessageLog,
    OpenAiCaller, PermissionManager, TaskStore, ToolRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== agentcore basic agent example ===\n");

    let mut registry = ToolRegistry::new();
    builtin::register_all(&mut registry);

    let mut task_store = TaskStore::open_in_memory()?;
    let mut permissions = PermissionManager::in_memory();
    let mut log = InMemoryMessageLog::new();

    let conv_id = "demo-session";
    log.append(Message::user(
        conv_id,
        "Plan out how we'd add a dark-mode toggle to the settings page.",
    ))
    .await?;

    let flags = Arc::new(Mutex::new(CompletionFlags::default()));
    let mut ctx = ExecutionContext::new("planner", flags).with_task_store(&mut task_store);

    let caller = Arc::new(OpenAiCaller::new());
    let runtime = AgentRuntime::new(
        conv_id,
        "planner",
        "You are the planning agent. Break the request into tasks with create_task, \
         then call planning_done once the plan is ready.",
        "gpt-4o",
        caller,
    );

    let mut handler = AutoDenyHandler;
    let cancel = CancellationToken::new();

    let outcome = runtime
        .run(&registry, &mut permissions, &mut ctx, &mut log, &mut handler, &cancel, None)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!("\nRun outcome: {outcome:?}");
    println!("messages logged: {}", log.count(conv_id).await?);
    Ok(())
}
