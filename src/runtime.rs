//! Runs one agent role (planner, tinkerer, or judge) until it produces a
//! terminal tool call, exhausts its iteration budget, or answers with no
//! tool calls at all.
//!
//! Grounded on the teacher's `AgentEngine::run` loop and its per-state
//! `output_tx: Option<&UnboundedSender<AgentOutput>>` progress channel
//! (`states/planning.rs`, `states/acting.rs`): this module generalizes
//! that single ReAct loop into one that hands each completed tool-call
//! batch to a fresh `ToolExecutor` instead of running tools inline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::executor::{TickOutcome, ToolExecutor};
use crate::llm::{AsyncLlmCaller, LlmResponse, LlmStreamChunk};
use crate::message_log::{Message, MessageLog};
use crate::permission::{PermissionManager, PromptResponse, RiskLevel};
use crate::tools::{ExecutionContext, ToolCall, ToolRegistry};

/// A cheap, clonable stop signal checked between tool calls. Never
/// interrupts a tool call already in flight — only gates whether the
/// runtime starts the next one, matching the source's "finish, then
/// exit" cancellation contract.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Decides the human's (or session policy's) answer to a permission
/// prompt raised mid-iteration. The executor's `tick` is non-blocking and
/// synchronous at this boundary, so the handler is too.
pub trait PermissionPromptHandler: Send {
    fn decide(&mut self, tool: &str, risk: RiskLevel, preview: Option<&str>) -> PromptResponse;
}

/// Denies every risky call — the safe default for a host that hasn't
/// wired up an interactive prompt yet.
pub struct AutoDenyHandler;

impl PermissionPromptHandler for AutoDenyHandler {
    fn decide(&mut self, _tool: &str, _risk: RiskLevel, _preview: Option<&str>) -> PromptResponse {
        PromptResponse::Deny
    }
}

/// Progress reported while a turn is in flight, mirroring the teacher's
/// `AgentOutput` channel (state-started / token / tool-call-delta /
/// tool-call-started / tool-call-finished), generalized to role-driven
/// turns instead of ReAct states.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    StreamStarted { agent_source: String },
    TextDelta(String),
    ThinkingDelta(String),
    ToolCallDelta { name: Option<String>, args_json: String },
    PermissionPromptShown { tool: String, risk: RiskLevel },
    ToolCallFinished { call_id: String },
    IterationComplete { iteration: usize },
    FinalAnswer(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// A terminal tool fired, or the model answered with no tool calls.
    Completed { final_content: Option<String> },
    Cancelled,
    IterationLimitReached,
}

#[derive(Default, Clone)]
struct ToolCallAcc {
    id: Option<String>,
    name: Option<String>,
    args_json: String,
}

/// One role's turn loop. A fresh instance is built per orchestrator role
/// invocation; `conv_id` and `agent_source` tag every message it logs.
pub struct AgentRuntime {
    conv_id: String,
    agent_source: String,
    system_prompt: String,
    model: String,
    caller: Arc<dyn AsyncLlmCaller>,
    max_iterations: usize,
    max_calls_per_iteration: usize,
}

impl AgentRuntime {
    pub fn new(
        conv_id: impl Into<String>,
        agent_source: impl Into<String>,
        system_prompt: impl Into<String>,
        model: impl Into<String>,
        caller: Arc<dyn AsyncLlmCaller>,
    ) -> Self {
        Self {
            conv_id: conv_id.into(),
            agent_source: agent_source.into(),
            system_prompt: system_prompt.into(),
            model: model.into(),
            caller,
            max_iterations: crate::executor::DEFAULT_MAX_ITERATIONS,
            max_calls_per_iteration: crate::executor::DEFAULT_MAX_CALLS_PER_ITERATION,
        }
    }

    pub fn with_caps(mut self, max_iterations: usize, max_calls_per_iteration: usize) -> Self {
        self.max_iterations = max_iterations;
        self.max_calls_per_iteration = max_calls_per_iteration;
        self
    }

    /// Drives the role to completion. `registry` supplies both the tool
    /// schemas sent to the model and the definitions the executor runs
    /// against; `ctx` carries the shared completion flags a terminal tool
    /// writes through.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        registry: &ToolRegistry,
        permissions: &mut PermissionManager,
        ctx: &mut ExecutionContext<'_>,
        log: &mut dyn MessageLog,
        prompt_handler: &mut dyn PermissionPromptHandler,
        cancel: &CancellationToken,
        progress: Option<&UnboundedSender<RuntimeEvent>>,
    ) -> Result<RunOutcome, String> {
        let mut iteration = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }

            emit(progress, RuntimeEvent::StreamStarted { agent_source: self.agent_source.clone() });

            let window = log
                .load_range(&self.conv_id, 0, log.count(&self.conv_id).await.map_err(|e| e.to_string())?)
                .await
                .map_err(|e| e.to_string())?;
            let schemas = registry.schemas();

            let response = self.stream_one_turn(&window, schemas, progress).await?;

            let (content, tool_calls) = match &response {
                LlmResponse::FinalAnswer { content, .. } => (content.clone(), Vec::new()),
                LlmResponse::ToolCall { tool, .. } => (String::new(), vec![tool.clone()]),
                LlmResponse::ParallelToolCalls { tools, .. } => (String::new(), tools.clone()),
            };

            if tool_calls.is_empty() {
                log.append(Message::assistant_final(self.conv_id.clone(), self.agent_source.clone(), content.clone()))
                    .await
                    .map_err(|e| e.to_string())?;
                emit(progress, RuntimeEvent::FinalAnswer(content.clone()));
                return Ok(RunOutcome::Completed { final_content: Some(content) });
            }

            let serialized: Vec<String> = tool_calls
                .iter()
                .map(|tc| serde_json::to_string(tc).unwrap_or_default())
                .collect();
            log.append(Message::assistant_tool_calls(
                self.conv_id.clone(),
                self.agent_source.clone(),
                content,
                serialized,
            ))
            .await
            .map_err(|e| e.to_string())?;

            let mut executor = ToolExecutor::with_caps(
                self.conv_id.clone(),
                tool_calls,
                iteration,
                self.max_calls_per_iteration,
                self.max_iterations,
            );

            loop {
                match executor.tick(registry, permissions, ctx, log).await {
                    TickOutcome::NoAction => {
                        if cancel.is_cancelled() {
                            return Ok(RunOutcome::Cancelled);
                        }
                    }
                    TickOutcome::ShowPermissionPrompt { call_id: _, tool, args: _, risk, preview } => {
                        emit(progress, RuntimeEvent::PermissionPromptShown { tool: tool.clone(), risk });
                        let response = prompt_handler.decide(&tool, risk, preview.as_deref());
                        executor.set_permission_response(response);
                    }
                    TickOutcome::RenderRequested { call_id } => {
                        emit(progress, RuntimeEvent::ToolCallFinished { call_id });
                        if cancel.is_cancelled() {
                            info!("cancellation honored after finishing in-flight tool call");
                            return Ok(RunOutcome::Cancelled);
                        }
                    }
                    TickOutcome::IterationComplete => {
                        emit(progress, RuntimeEvent::IterationComplete { iteration });
                        break;
                    }
                    TickOutcome::IterationLimitReached => {
                        warn!(iteration, "iteration cap reached, returning control to the orchestrator");
                        return Ok(RunOutcome::IterationLimitReached);
                    }
                }
            }

            if executor.terminal_observed() {
                debug!(agent_source = %self.agent_source, "terminal tool observed, ending turn");
                return Ok(RunOutcome::Completed { final_content: None });
            }

            iteration += 1;
        }
    }

    async fn stream_one_turn(
        &self,
        window: &[Message],
        schemas: Vec<crate::tools::ToolSchema>,
        progress: Option<&UnboundedSender<RuntimeEvent>>,
    ) -> Result<LlmResponse, String> {
        let mut stream = self
            .caller
            .call_stream(self.system_prompt.clone(), window.to_vec(), schemas, self.model.clone());

        let mut accs: HashMap<usize, ToolCallAcc> = HashMap::new();

        while let Some(chunk) = stream.next().await {
            match chunk? {
                LlmStreamChunk::TextDelta(text) => {
                    emit(progress, RuntimeEvent::TextDelta(text));
                }
                LlmStreamChunk::ThinkingDelta(text) => {
                    emit(progress, RuntimeEvent::ThinkingDelta(text));
                }
                LlmStreamChunk::ToolCallDelta { index, id, name, args_json } => {
                    let acc = accs.entry(index).or_default();
                    if let Some(id) = id {
                        acc.id = Some(id);
                    }
                    if let Some(name) = name.clone() {
                        acc.name = Some(name);
                    }
                    acc.args_json = args_json;
                    emit(progress, RuntimeEvent::ToolCallDelta { name, args_json: acc.args_json.clone() });
                }
                LlmStreamChunk::Done(response) => return Ok(response),
            }
        }

        Err("LLM stream ended without a terminal Done frame".to_string())
    }
}

fn emit(progress: Option<&UnboundedSender<RuntimeEvent>>, event: RuntimeEvent) {
    if let Some(tx) = progress {
        let _ = tx.send(event);
    }
}

#[allow(dead_code)]
fn assert_tool_call_shape(_: &ToolCall) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::TokenUsage;
    use crate::llm::MockLlmCaller;
    use crate::message_log::InMemoryMessageLog;
    use crate::tools::builtin;
    use crate::tools::context::CompletionFlags;
    use std::sync::Mutex;

    struct AllowAllHandler;
    impl PermissionPromptHandler for AllowAllHandler {
        fn decide(&mut self, _tool: &str, _risk: RiskLevel, _preview: Option<&str>) -> PromptResponse {
            PromptResponse::AllowOnce
        }
    }

    #[tokio::test]
    async fn final_answer_with_no_tool_calls_completes_immediately() {
        let mock = Arc::new(MockLlmCaller::new(vec![LlmResponse::FinalAnswer {
            content: "all done".to_string(),
            usage: Some(TokenUsage::new(10, 5)),
        }]));
        let runtime = AgentRuntime::new("conv-1", "planner", "be helpful", "test-model", mock);

        let mut registry = ToolRegistry::new();
        builtin::register_all(&mut registry);
        let mut permissions = PermissionManager::in_memory();
        let flags = Arc::new(Mutex::new(CompletionFlags::default()));
        let mut ctx = ExecutionContext::new("planner", flags);
        let mut log = InMemoryMessageLog::new();
        let mut handler = AllowAllHandler;
        let cancel = CancellationToken::new();

        let outcome = runtime
            .run(&registry, &mut permissions, &mut ctx, &mut log, &mut handler, &cancel, None)
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Completed { final_content: Some("all done".to_string()) });
        assert_eq!(log.count("conv-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancellation_before_first_stream_stops_immediately() {
        let mock = Arc::new(MockLlmCaller::new(vec![LlmResponse::FinalAnswer {
            content: "unreachable".to_string(),
            usage: None,
        }]));
        let runtime = AgentRuntime::new("conv-2", "planner", "sys", "test-model", mock);

        let mut registry = ToolRegistry::new();
        builtin::register_all(&mut registry);
        let mut permissions = PermissionManager::in_memory();
        let flags = Arc::new(Mutex::new(CompletionFlags::default()));
        let mut ctx = ExecutionContext::new("planner", flags);
        let mut log = InMemoryMessageLog::new();
        let mut handler = AllowAllHandler;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = runtime
            .run(&registry, &mut permissions, &mut ctx, &mut log, &mut handler, &cancel, None)
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled);
    }

    #[tokio::test]
    async fn terminal_tool_call_ends_the_turn() {
        let call = ToolCall {
            id: "call-1".to_string(),
            name: "planning_done".to_string(),
            arguments: serde_json::json!({}),
        };
        let mock = Arc::new(MockLlmCaller::new(vec![LlmResponse::ToolCall { tool: call, usage: None }]));
        let runtime = AgentRuntime::new("conv-3", "planner", "sys", "test-model", mock);

        let mut registry = ToolRegistry::new();
        builtin::register_all(&mut registry);
        let mut permissions = PermissionManager::in_memory();
        let flags = Arc::new(Mutex::new(CompletionFlags::default()));
        let mut ctx = ExecutionContext::new("planner", flags.clone());
        let mut log = InMemoryMessageLog::new();
        let mut handler = AllowAllHandler;
        let cancel = CancellationToken::new();

        let outcome = runtime
            .run(&registry, &mut permissions, &mut ctx, &mut log, &mut handler, &cancel, None)
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Completed { final_content: None });
        assert!(flags.lock().unwrap().planning_complete);
    }
}
