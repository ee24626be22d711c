//! Message-pairing invariant: every assistant message carrying tool_calls
//! is followed by exactly that many role=tool messages, and each finished
//! call logs a system summary plus a tool-result JSON message.

use std::sync::{Arc, Mutex};

use agentcore::tools::builtin;
use agentcore::tools::{CompletionFlags, ExecutionContext, ToolCall};
use agentcore::{InMemoryMessageLog, Message, MessageLog, PermissionManager, Role, ToolExecutor, ToolRegistry};

fn registry() -> ToolRegistry {
    let mut r = ToolRegistry::new();
    builtin::register_all(&mut r);
    r
}

#[tokio::test]
async fn batch_of_two_reads_produces_two_paired_tool_messages() {
    let registry = registry();
    let mut permissions = PermissionManager::in_memory();
    let mut log = InMemoryMessageLog::new();
    let flags = Arc::new(Mutex::new(CompletionFlags::default()));
    let mut ctx = ExecutionContext::new("tinkerer", flags);

    let conv_id = "conv-pairing";
    let batch = vec![
        ToolCall {
            id: "call-1".to_string(),
            name: "read_file".to_string(),
            arguments: serde_json::json!({"path": "Cargo.toml"}),
        },
        ToolCall {
            id: "call-2".to_string(),
            name: "list_directory".to_string(),
            arguments: serde_json::json!({"path": "src"}),
        },
    ];
    let tool_call_json: Vec<String> = batch.iter().map(|c| serde_json::to_string(c).unwrap()).collect();
    log.append(Message::assistant_tool_calls(conv_id, "tinkerer", "", tool_call_json))
        .await
        .unwrap();

    let mut executor = ToolExecutor::new(conv_id, batch, 0);
    loop {
        use agentcore::TickOutcome;
        match executor.tick(&registry, &mut permissions, &mut ctx, &mut log).await {
            TickOutcome::IterationComplete | TickOutcome::IterationLimitReached => break,
            _ => {}
        }
    }

    let messages = log.load_range(conv_id, 0, log.count(conv_id).await.unwrap()).await.unwrap();
    assert_eq!(messages[0].role, Role::Assistant);
    assert_eq!(messages[0].tool_calls.len(), 2);

    let tool_messages: Vec<&Message> = messages.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(tool_messages.len(), 2);
    assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("call-1"));
    assert_eq!(tool_messages[1].tool_call_id.as_deref(), Some("call-2"));

    let system_messages: Vec<&Message> = messages.iter().filter(|m| m.role == Role::System).collect();
    assert_eq!(system_messages.len(), 2);

    let parsed: serde_json::Value = serde_json::from_str(&tool_messages[0].content).unwrap();
    assert_eq!(parsed["success"], true);
}

#[tokio::test]
async fn unknown_tool_still_produces_a_paired_error_result() {
    let registry = registry();
    let mut permissions = PermissionManager::in_memory();
    let mut log = InMemoryMessageLog::new();
    let flags = Arc::new(Mutex::new(CompletionFlags::default()));
    let mut ctx = ExecutionContext::new("tinkerer", flags);

    let conv_id = "conv-unknown-tool";
    let batch = vec![ToolCall { id: "call-x".to_string(), name: "does_not_exist".to_string(), arguments: serde_json::json!({}) }];
    let mut executor = ToolExecutor::new(conv_id, batch, 0);

    use agentcore::TickOutcome;
    loop {
        match executor.tick(&registry, &mut permissions, &mut ctx, &mut log).await {
            TickOutcome::IterationComplete | TickOutcome::IterationLimitReached => break,
            _ => {}
        }
    }

    let messages = log.load_range(conv_id, 0, log.count(conv_id).await.unwrap()).await.unwrap();
    let tool_msg = messages.iter().find(|m| m.role == Role::Tool).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&tool_msg.content).unwrap();
    assert_eq!(parsed["success"], false);
    assert_eq!(parsed["error_type"], "not_found");
}
