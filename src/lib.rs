//! Agentic tool-execution and task-orchestration core: a task DAG, a
//! permission-gated tool registry and executor, LLM-transport-agnostic
//! agent turns, and a planner/tinkerer/judge pipeline wired together over
//! a shared message log and git-backed sync.

pub mod budget;
pub mod error;
pub mod executor;
pub mod gitsync;
pub mod llm;
pub mod message_log;
pub mod orchestrator;
pub mod permission;
pub mod runtime;
pub mod task;
pub mod tools;

pub use budget::{TokenBudget, TokenUsage};
pub use error::AgentError;
pub use executor::{ExecutorState, TickOutcome, ToolExecutor};
pub use gitsync::{GitSync, GitSyncError};
pub use llm::{AnthropicCaller, AsyncLlmCaller, LlmResponse, LlmStreamChunk, MockLlmCaller, OpenAiCaller, RetryingLlmCaller};
pub use message_log::{InMemoryMessageLog, Message, MessageLog, Role, SqliteMessageLog};
pub use orchestrator::{build_transition_table, event_from_flags, Orchestrator, OrchestratorEvent, Role as AgentRole};
pub use permission::{Decision, PermissionManager, PromptResponse, RiskLevel};
pub use runtime::{AgentRuntime, AutoDenyHandler, CancellationToken, PermissionPromptHandler, RunOutcome, RuntimeEvent};
pub use task::{CreateTaskParams, Task, TaskId, TaskStore, UpdateTaskParams};
pub use tools::{CompletionFlags, ErrorKind, ExecutionContext, Scope, ToolCall, ToolDefinition, ToolRegistry, ToolResult, ToolSchema};
