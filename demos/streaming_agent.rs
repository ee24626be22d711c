//! # Streaming Agent Example
//!
//! Same planner turn as `basic_agent`, but consumes `RuntimeEvent`s off an
//! `UnboundedSender` to print tokens and tool-call progress as they arrive.
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example streaming_agent
//! ```

use std::io::{stdout, Write};
use std::sync::{Arc, Mutex};

use agentcore::tools::builtin;
use agentcore::tools::{CompletionFlags, ExecutionContext};
use agentcore::{
    AgentRuntime, AutoDenyHandler, CancellationToken, InMemoryMessageLog, Message, MessageLog,
    OpenAiCaller, PermissionManager, RuntimeEvent, TaskStore, ToolRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("Starting agentcore streaming example...");

    let mut registry = ToolRegistry::new();
    builtin::register_all(&mut registry);

    let mut task_store = TaskStore::open_in_memory()?;
    let mut permissions = PermissionManager::in_memory();
    let mut log = InMemoryMessageLog::new();

    let conv_id = "streaming-demo";
    log.append(Message::user(
        conv_id,
        "Explain the importance of Rust in systems programming, then call planning_done.",
    ))
    .await?;

    let flags = Arc::new(Mutex::new(CompletionFlags::default()));
    let mut ctx = ExecutionContext::new("planner", flags).with_task_store(&mut task_store);

    let runtime = AgentRuntime::new(conv_id, "planner", "You are a terse planning agent.", "gpt-4o", Arc::new(OpenAiCaller::new()));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut handler = AutoDenyHandler;
    let cancel = CancellationToken::new();

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                RuntimeEvent::StreamStarted { agent_source } => println!("\n\n[turn started: {agent_source}]"),
                RuntimeEvent::TextDelta(text) => {
                    print!("{text}");
                    let _ = stdout().flush();
                }
                RuntimeEvent::ThinkingDelta(_) => print!("."),
                RuntimeEvent::ToolCallDelta { name, .. } => {
                    if let Some(name) = name {
                        print!("[calling {name}]");
                    }
                }
                RuntimeEvent::PermissionPromptShown { tool, risk } => {
                    println!("\n[permission requested for {tool}, risk={risk:?}]");
                }
                RuntimeEvent::ToolCallFinished { call_id } => println!("\n[tool call {call_id} finished]"),
                RuntimeEvent::IterationComplete { iteration } => println!("\n[iteration {iteration} complete]"),
                RuntimeEvent::FinalAnswer(answer) => println!("\n\nFINAL ANSWER:\n{answer}"),
            }
        }
    });

    let outcome = runtime
        .run(&registry, &mut permissions, &mut ctx, &mut log, &mut handler, &cancel, Some(&tx))
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    drop(tx);
    printer.await?;

    println!("\n\nrun outcome: {outcome:?}");
    Ok(())
}
