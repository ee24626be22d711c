//! The single seam between `AgentRuntime` and any LLM transport.
//!
//! Per §9's design note, the source's loose streaming callbacks are
//! replaced with a typed frame stream (`LlmStreamChunk`): a provider
//! implementation pulls model output apart into `TextDelta` /
//! `ThinkingDelta` / `ToolCallDelta` / `Done` frames and `AgentRuntime`
//! only ever sees this one shape, regardless of which wire format
//! produced it.

mod anthropic;
mod mock;
mod openai;
mod retry;

pub use anthropic::AnthropicCaller;
pub use mock::MockLlmCaller;
pub use openai::OpenAiCaller;
pub use retry::RetryingLlmCaller;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::budget::TokenUsage;
use crate::message_log::Message;
use crate::tools::{ToolCall, ToolSchema};

/// What the LLM returned once a turn is fully assembled (from a
/// non-streaming call, or accumulated from a stream's deltas).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LlmResponse {
    /// The model wants to invoke exactly one tool.
    ToolCall { tool: ToolCall, usage: Option<TokenUsage> },
    /// The model requested several tools in the same turn — the
    /// `ToolExecutor` runs them in emission order within one batch.
    ParallelToolCalls { tools: Vec<ToolCall>, usage: Option<TokenUsage> },
    /// The model produced a final assistant message with no tool calls.
    FinalAnswer { content: String, usage: Option<TokenUsage> },
}

/// One frame of a streamed model turn (§9: `TextDelta | ThinkingDelta |
/// ToolCallDelta | Done`). `AgentRuntime` pulls these one at a time and
/// buffers tool-call deltas by index until `Done` delivers the fully
/// parsed response.
#[derive(Debug, Clone)]
pub enum LlmStreamChunk {
    /// A piece of visible assistant text.
    TextDelta(String),
    /// A piece of extended-thinking text (Anthropic); never part of the
    /// final `content` an assistant message is logged with.
    ThinkingDelta(String),
    /// Partial tool-call arguments, keyed by the provider's call index so
    /// parallel tool calls don't interleave into one accumulator.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        args_json: String,
    },
    /// The turn is complete; carries the fully assembled response.
    Done(LlmResponse),
}

/// The interface `AgentRuntime` drives. Implementations own their own
/// provider wire format entirely — `AgentRuntime` never sees HTTP, SSE
/// framing, or any provider-specific JSON shape.
///
/// # Contract
/// - Returns `Err(String)` only for unrecoverable failures (auth failure,
///   network failure after retries, unparseable response). A tool failure
///   is never surfaced here — it already became a `ToolResult` before the
///   next call.
/// - Must build the tool schema list from the `ToolRegistry` passed in and
///   include it on every call, even when the registry is empty.
/// - `call_stream`'s last yielded item MUST be `Ok(LlmStreamChunk::Done(_))`
///   on success; a stream that ends without `Done` is treated by the
///   runtime as a protocol error.
#[async_trait]
pub trait AsyncLlmCaller: Send + Sync {
    async fn call(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tool_schemas: &[ToolSchema],
        model: &str,
    ) -> Result<LlmResponse, String>;

    fn call_stream(
        &self,
        system_prompt: String,
        messages: Vec<Message>,
        tool_schemas: Vec<ToolSchema>,
        model: String,
    ) -> BoxStream<'static, Result<LlmStreamChunk, String>>;
}
