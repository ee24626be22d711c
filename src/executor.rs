use std::collections::VecDeque;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info};

use crate::message_log::{Message, MessageLog};
use crate::permission::{Decision, PermissionManager, PromptResponse, RiskLevel};
use crate::tools::{normalize_arguments, ErrorKind, ExecutionContext, ToolCall, ToolRegistry, ToolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    EvaluatingPolicy,
    AwaitingPermission,
    Executing,
    Completed,
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    NoAction,
    ShowPermissionPrompt {
        call_id: String,
        tool: String,
        args: Value,
        risk: RiskLevel,
        preview: Option<String>,
    },
    RenderRequested {
        call_id: String,
    },
    IterationComplete,
    IterationLimitReached,
}

/// Default per-iteration tool-call cap.
pub const DEFAULT_MAX_CALLS_PER_ITERATION: usize = 15;
/// Default per-user-message iteration cap.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

struct PendingCall {
    call: ToolCall,
    args: Value,
}

/// Drives one batch of tool calls (one model turn) through
/// `idle → evaluating_policy → awaiting_permission? → executing → completed`.
///
/// Ownership of the batch's `ToolCall` objects transfers in on construction
/// and is released as each call completes.
pub struct ToolExecutor {
    state: ExecutorState,
    conv_id: String,
    queue: VecDeque<ToolCall>,
    pending: Option<PendingCall>,
    permission_response: Option<PromptResponse>,
    executed_this_iteration: usize,
    max_calls_per_iteration: usize,
    iteration: usize,
    max_iterations: usize,
    terminal_observed: bool,
}

impl ToolExecutor {
    pub fn new(conv_id: impl Into<String>, batch: Vec<ToolCall>, iteration: usize) -> Self {
        Self::with_caps(conv_id, batch, iteration, DEFAULT_MAX_CALLS_PER_ITERATION, DEFAULT_MAX_ITERATIONS)
    }

    pub fn with_caps(
        conv_id: impl Into<String>,
        batch: Vec<ToolCall>,
        iteration: usize,
        max_calls_per_iteration: usize,
        max_iterations: usize,
    ) -> Self {
        Self {
            state: ExecutorState::Idle,
            conv_id: conv_id.into(),
            queue: batch.into(),
            pending: None,
            permission_response: None,
            executed_this_iteration: 0,
            max_calls_per_iteration,
            iteration,
            max_iterations,
            terminal_observed: false,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ExecutorState::Completed
    }

    pub fn terminal_observed(&self) -> bool {
        self.terminal_observed
    }

    /// Delivers the human's (or session policy's) answer to the most
    /// recent `ShowPermissionPrompt`. Takes effect on the next `tick`.
    pub fn set_permission_response(&mut self, response: PromptResponse) {
        self.permission_response = Some(response);
    }

    /// Advances one step. Never awaits a user response directly — callers
    /// that receive `ShowPermissionPrompt` must call
    /// `set_permission_response` before calling `tick` again.
    pub async fn tick(
        &mut self,
        registry: &ToolRegistry,
        permissions: &mut PermissionManager,
        ctx: &mut ExecutionContext<'_>,
        log: &mut dyn MessageLog,
    ) -> TickOutcome {
        if self.state == ExecutorState::AwaitingPermission {
            return self.resolve_pending_permission(registry, permissions, ctx, log).await;
        }

        if self.pending.is_none() {
            let Some(call) = self.queue.pop_front() else {
                self.state = ExecutorState::Completed;
                return self.finish_iteration();
            };

            self.state = ExecutorState::EvaluatingPolicy;

            if self.executed_this_iteration >= self.max_calls_per_iteration {
                let result = ToolResult::err(
                    ErrorKind::InternalError,
                    format!("per-iteration tool-call cap ({}) reached, call skipped", self.max_calls_per_iteration),
                    Instant::now(),
                );
                self.finish_call(&call, result, log).await;
                return TickOutcome::NoAction;
            }

            let Some(def) = registry.get(&call.name) else {
                let started = Instant::now();
                let result = ToolResult::err(ErrorKind::NotFound, format!("unknown tool `{}`", call.name), started);
                self.finish_call(&call, result, log).await;
                return TickOutcome::NoAction;
            };

            let args = match normalize_arguments(&call.arguments) {
                Ok(args) => args,
                Err((kind, msg)) => {
                    let result = ToolResult::err(kind, msg, Instant::now());
                    self.finish_call(&call, result, log).await;
                    return TickOutcome::NoAction;
                }
            };

            if let Some(validator) = &def.validator {
                if !validator(&args) {
                    let result = ToolResult::err(ErrorKind::ValidationFailed, "argument validation failed".to_string(), Instant::now());
                    self.finish_call(&call, result, log).await;
                    return TickOutcome::NoAction;
                }
            }

            match permissions.evaluate(&call.name, def.risk_level, &args) {
                Decision::AutoAllow => {
                    self.pending = Some(PendingCall { call, args });
                    self.state = ExecutorState::Executing;
                }
                Decision::Deny { reason } => {
                    let result = ToolResult::err(ErrorKind::PermissionDenied, reason, Instant::now());
                    self.finish_call(&call, result, log).await;
                    return TickOutcome::NoAction;
                }
                Decision::Prompt { risk, preview } => {
                    let call_id = call.id.clone();
                    let name = call.name.clone();
                    self.pending = Some(PendingCall { call, args: args.clone() });
                    self.state = ExecutorState::AwaitingPermission;
                    return TickOutcome::ShowPermissionPrompt {
                        call_id,
                        tool: name,
                        args,
                        risk,
                        preview,
                    };
                }
            }
        }

        self.execute_pending(registry, ctx, log).await
    }

    async fn resolve_pending_permission(
        &mut self,
        registry: &ToolRegistry,
        permissions: &mut PermissionManager,
        ctx: &mut ExecutionContext<'_>,
        log: &mut dyn MessageLog,
    ) -> TickOutcome {
        let Some(response) = self.permission_response.take() else {
            return TickOutcome::NoAction;
        };
        let pending = self.pending.as_ref().expect("awaiting_permission implies a pending call");
        let allowed = permissions.commit_response(&pending.call.name, response);

        if !allowed {
            let pending = self.pending.take().expect("checked above");
            let result = ToolResult::err(ErrorKind::PermissionDenied, "denied by user".to_string(), Instant::now());
            self.finish_call(&pending.call, result, log).await;
            self.state = ExecutorState::Idle;
            return TickOutcome::NoAction;
        }

        self.state = ExecutorState::Executing;
        self.execute_pending(registry, ctx, log).await
    }

    async fn execute_pending(&mut self, registry: &ToolRegistry, ctx: &mut ExecutionContext<'_>, log: &mut dyn MessageLog) -> TickOutcome {
        let pending = self.pending.take().expect("execute_pending called with a pending call");
        let started = Instant::now();
        let def = registry.get(&pending.call.name).expect("tool existed during evaluation");
        let result = match def.run(&pending.args, ctx) {
            Ok(output) => ToolResult::ok(output, started),
            Err((kind, message)) => ToolResult::err(kind, message, started),
        };
        let call_id = pending.call.id.clone();

        if matches!(
            pending.call.name.as_str(),
            "planning_done"
                | "tinkering_done"
                | "submit_work"
                | "approve_task"
                | "request_revision"
                | "end_session"
                | "land_the_plane"
        ) {
            self.terminal_observed = true;
        }

        self.finish_call(&pending.call, result, log).await;
        self.executed_this_iteration += 1;
        self.state = ExecutorState::Idle;
        TickOutcome::RenderRequested { call_id }
    }

    fn finish_iteration(&mut self) -> TickOutcome {
        self.iteration += 1;
        if self.iteration >= self.max_iterations {
            return TickOutcome::IterationLimitReached;
        }
        TickOutcome::IterationComplete
    }

    async fn finish_call(&mut self, call: &ToolCall, result: ToolResult, log: &mut dyn MessageLog) {
        let summary = format!(
            "tool `{}` {} in {}ms",
            call.name,
            if result.success { "succeeded" } else { "failed" },
            result.metadata.execution_time_ms
        );
        info!(tool = %call.name, success = result.success, ms = result.metadata.execution_time_ms, "tool call finished");

        let _ = log.append(Message::system(self.conv_id.clone(), summary)).await;

        let content = serde_json::to_string(&result).unwrap_or_else(|e| {
            debug!(error = %e, "failed to serialize tool result, falling back to raw data");
            result.data.clone().unwrap_or_default()
        });
        let _ = log
            .append(Message::tool_result(self.conv_id.clone(), call.id.clone(), content))
            .await;
    }
}
