//! `submit_work` against a real temp git repo: commits the given files,
//! stamps `completed_at_commit`, and appends a `SUMMARY:` comment.

use std::process::Command;
use std::sync::{Arc, Mutex};

use agentcore::task::{CreateTaskParams, TaskType};
use agentcore::tools::builtin;
use agentcore::tools::{CompletionFlags, ExecutionContext, ToolCall};
use agentcore::{GitSync, PermissionManager, TaskStore, ToolExecutor, ToolRegistry, TickOutcome};
use agentcore::{InMemoryMessageLog, Role};

fn init_repo(dir: &std::path::Path) {
    let run = |args: &[&str]| {
        let status = Command::new("git").args(args).current_dir(dir).status().unwrap();
        assert!(status.success(), "git {args:?} failed");
    };
    run(&["init"]);
    run(&["config", "user.email", "test@example.com"]);
    run(&["config", "user.name", "Test"]);
    std::fs::write(dir.join("README.md"), "hello\n").unwrap();
    run(&["add", "README.md"]);
    run(&["commit", "-m", "initial commit"]);
}

#[tokio::test]
async fn submit_work_commits_files_and_stamps_the_task() {
    let tmp = tempfile::tempdir().unwrap();
    init_repo(tmp.path());

    let git = GitSync::detect(tmp.path()).await.unwrap();

    let mut registry = ToolRegistry::new();
    builtin::register_all(&mut registry);

    let mut task_store = TaskStore::open_in_memory().unwrap();
    let task_id = task_store
        .create_task(CreateTaskParams {
            title: "document the CLI".to_string(),
            task_type: TaskType::Task,
            ..Default::default()
        })
        .unwrap();
    task_store.set_current_task(&task_id).unwrap();

    std::fs::write(tmp.path().join("README.md"), "hello\n\nCLI docs here.\n").unwrap();

    let mut permissions = PermissionManager::in_memory();
    let mut log = InMemoryMessageLog::new();
    let flags = Arc::new(Mutex::new(CompletionFlags::default()));
    let mut git = git;
    let mut ctx = ExecutionContext::new("tinkerer", flags.clone())
        .with_task_store(&mut task_store)
        .with_git_sync(&mut git);

    let batch = vec![ToolCall {
        id: "call-submit".to_string(),
        name: "submit_work".to_string(),
        arguments: serde_json::json!({
            "files": ["README.md"],
            "commit_message": "docs: add CLI section",
            "summary": "documented the CLI flags"
        }),
    }];
    let conv_id = "submit-work-conv";
    let mut executor = ToolExecutor::new(conv_id, batch, 0);
    loop {
        match executor.tick(&registry, &mut permissions, &mut ctx, &mut log).await {
            TickOutcome::IterationComplete | TickOutcome::IterationLimitReached => break,
            _ => {}
        }
    }

    assert!(flags.lock().unwrap().tinkering_complete);

    let messages = log.load_range(conv_id, 0, log.count(conv_id).await.unwrap()).await.unwrap();
    let tool_msg = messages.iter().find(|m| m.role == Role::Tool).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&tool_msg.content).unwrap();
    assert_eq!(parsed["success"], true);

    let task = task_store.get_task(&task_id).unwrap();
    assert!(task.completed_at_commit.is_some());

    let log_output = Command::new("git").args(["log", "--oneline"]).current_dir(tmp.path()).output().unwrap();
    let log_text = String::from_utf8_lossy(&log_output.stdout);
    assert!(log_text.contains("docs: add CLI section"));
}
