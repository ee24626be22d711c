//! # Anthropic Agent Example
//!
//! Runs a single tinkerer turn against Claude, demonstrating
//! `AnthropicCaller`'s hand-rolled reqwest transport against the same
//! `AgentRuntime` loop `OpenAiCaller` drives.
//!
//! ```bash
//! ANTHROPIC_API_KEY=sk-ant-... cargo run --example anthropic_agent
//! ```

use std::sync::{Arc, Mutex};

use agentcore::tools::builtin;
use agentcore::tools::{CompletionFlags, ExecutionContext};
use agentcore::{
    AgentRuntime, AnthropicCaller, AutoDenyHandler, CancellationToken, InMemoryMessageLog, Message,
    MessageLog, PermissionManager, TaskStore, ToolRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== agentcore anthropic agent example ===\n");

    let anthropic = AnthropicCaller::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let mut registry = ToolRegistry::new();
    builtin::register_all(&mut registry);

    let mut task_store = TaskStore::open_in_memory()?;
    let mut permissions = PermissionManager::in_memory();
    let mut log = InMemoryMessageLog::new();

    let conv_id = "anthropic-demo";
    log.append(Message::user(
        conv_id,
        "Read Cargo.toml and summarize which dependencies this crate pulls in for networking.",
    ))
    .await?;

    let flags = Arc::new(Mutex::new(CompletionFlags::default()));
    let mut ctx = ExecutionContext::new("tinkerer", flags).with_task_store(&mut task_store);

    let runtime = AgentRuntime::new(
        conv_id,
        "tinkerer",
        "You are the implementing agent. Use read_file and list_directory to inspect the \
         repository, then answer directly with a final message.",
        "claude-opus-4-6",
        Arc::new(anthropic),
    );

    let mut handler = AutoDenyHandler;
    let cancel = CancellationToken::new();

    let outcome = runtime
        .run(&registry, &mut permissions, &mut ctx, &mut log, &mut handler, &cancel, None)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!("\nRun outcome: {outcome:?}");
    Ok(())
}
