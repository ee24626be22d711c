use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::budget::TokenUsage;
use crate::llm::{AsyncLlmCaller, LlmResponse, LlmStreamChunk};
use crate::message_log::{Message, Role};
use crate::tools::{ToolCall, ToolSchema};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(serde::Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicToolDef>,
    messages: Vec<AnthropicMessage>,
    stream: bool,
}

#[derive(serde::Serialize)]
struct AnthropicToolDef {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(serde::Serialize, Clone)]
struct AnthropicMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(serde::Deserialize, Debug)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(serde::Deserialize, Debug, Clone)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(serde::Deserialize, Debug)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: serde_json::Value },
}

#[derive(serde::Deserialize, Debug)]
#[serde(tag = "type")]
enum AnthropicStreamEvent {
    #[serde(rename = "message_start")]
    MessageStart,
    #[serde(rename = "content_block_start")]
    ContentBlockStart { index: usize, content_block: AnthropicContentBlock },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: AnthropicDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: usize },
    #[serde(rename = "message_delta")]
    MessageDelta {
        delta: AnthropicMessageDelta,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "ping")]
    Ping,
}

#[derive(serde::Deserialize, Debug)]
#[serde(tag = "type")]
enum AnthropicDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { thinking: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(rename = "signature_delta")]
    SignatureDelta {
        #[serde(default)]
        signature: String,
    },
}

#[derive(serde::Deserialize, Debug)]
struct AnthropicMessageDelta {
    stop_reason: Option<String>,
}

/// Calls Anthropic's Messages API directly over `reqwest`; there is no
/// official Anthropic Rust SDK, so requests and SSE frames are hand-typed
/// against the documented wire format.
pub struct AnthropicCaller {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl AnthropicCaller {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: "https://api.anthropic.com".to_string(),
        }
    }

    pub fn from_env() -> Result<Self, String> {
        let key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| "ANTHROPIC_API_KEY not set".to_string())?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into(),
        }
    }

    fn build_tool_defs(schemas: &[ToolSchema]) -> Vec<AnthropicToolDef> {
        schemas
            .iter()
            .map(|s| AnthropicToolDef {
                name: s.name.clone(),
                description: s.description.clone(),
                input_schema: s.input_schema.clone(),
            })
            .collect()
    }

    /// Anthropic takes the system prompt out of band and expects tool
    /// results and assistant tool-calls as content-block arrays rather
    /// than OpenAI's flat string-or-tool_calls shape.
    fn build_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
        messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| match m.role {
                Role::Tool => {
                    let tool_use_id = m.tool_call_id.clone().unwrap_or_default();
                    AnthropicMessage {
                        role: "user".to_string(),
                        content: serde_json::json!([{
                            "type": "tool_result",
                            "tool_use_id": tool_use_id,
                            "content": m.content,
                        }]),
                    }
                }
                Role::Assistant if !m.tool_calls.is_empty() => {
                    let mut blocks = Vec::new();
                    if !m.content.is_empty() {
                        blocks.push(serde_json::json!({"type": "text", "text": m.content}));
                    }
                    for raw in &m.tool_calls {
                        if let Ok(tc) = serde_json::from_str::<ToolCall>(raw) {
                            blocks.push(serde_json::json!({
                                "type": "tool_use",
                                "id": tc.id,
                                "name": tc.name,
                                "input": tc.arguments,
                            }));
                        }
                    }
                    AnthropicMessage { role: "assistant".to_string(), content: serde_json::Value::Array(blocks) }
                }
                Role::Assistant => AnthropicMessage {
                    role: "assistant".to_string(),
                    content: serde_json::Value::String(m.content.clone()),
                },
                Role::User | Role::System => AnthropicMessage {
                    role: "user".to_string(),
                    content: serde_json::Value::String(m.content.clone()),
                },
            })
            .collect()
    }

    fn response_from_blocks(blocks: Vec<AnthropicContentBlock>, usage: Option<TokenUsage>) -> Result<LlmResponse, String> {
        let mut tools = Vec::new();
        let mut text = String::new();
        for block in blocks {
            match block {
                AnthropicContentBlock::ToolUse { id, name, input } => tools.push(ToolCall { id, name, arguments: input }),
                AnthropicContentBlock::Text { text: t } => text.push_str(&t),
                AnthropicContentBlock::Thinking { .. } => {}
            }
        }
        if tools.len() > 1 {
            return Ok(LlmResponse::ParallelToolCalls { tools, usage });
        }
        if let Some(tool) = tools.into_iter().next() {
            return Ok(LlmResponse::ToolCall { tool, usage });
        }
        if text.is_empty() {
            return Err("Anthropic returned an empty response".to_string());
        }
        Ok(LlmResponse::FinalAnswer { content: text, usage })
    }
}

#[async_trait]
impl AsyncLlmCaller for AnthropicCaller {
    async fn call(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tool_schemas: &[ToolSchema],
        model: &str,
    ) -> Result<LlmResponse, String> {
        let body = AnthropicRequest {
            model: model.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: (!system_prompt.is_empty()).then(|| system_prompt.to_string()),
            tools: Self::build_tool_defs(tool_schemas),
            messages: Self::build_messages(messages),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("network error: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Anthropic API error {status}: {body}"));
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|e| format!("failed to parse Anthropic response: {e}"))?;
        let usage = parsed.usage.as_ref().map(|u| TokenUsage::new(u.input_tokens, u.output_tokens));
        Self::response_from_blocks(parsed.content, usage)
    }

    fn call_stream(
        &self,
        system_prompt: String,
        messages: Vec<Message>,
        tool_schemas: Vec<ToolSchema>,
        model: String,
    ) -> BoxStream<'static, Result<LlmStreamChunk, String>> {
        let body = AnthropicRequest {
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
            system: (!system_prompt.is_empty()).then_some(system_prompt),
            tools: Self::build_tool_defs(&tool_schemas),
            messages: Self::build_messages(&messages),
            stream: true,
        };

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let api_base = self.api_base.clone();

        stream::once(async move {
            client
                .post(format!("{api_base}/v1/messages"))
                .header("x-api-key", &api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
                .send()
                .await
                .map_err(|e| format!("network error: {e}"))
        })
        .flat_map(|res| match res {
            Ok(resp) if resp.status().is_success() => {
                let mut text = String::new();
                let mut tool_meta: HashMap<usize, (String, String)> = HashMap::new();
                let mut tool_args: HashMap<usize, String> = HashMap::new();

                resp.bytes_stream()
                    .map(|b| b.map_err(|e| format!("stream error: {e}")))
                    .map(move |res| -> Result<Vec<LlmStreamChunk>, String> {
                        let bytes = res?;
                        let raw = String::from_utf8_lossy(&bytes);
                        let mut chunks = Vec::new();

                        for line in raw.lines() {
                            let Some(data) = line.strip_prefix("data: ") else { continue };
                            let Ok(event) = serde_json::from_str::<AnthropicStreamEvent>(data) else { continue };
                            match event {
                                AnthropicStreamEvent::ContentBlockStart { index, content_block } => {
                                    if let AnthropicContentBlock::ToolUse { id, name, .. } = content_block {
                                        tool_meta.insert(index, (id, name));
                                        tool_args.entry(index).or_default();
                                    }
                                }
                                AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                                    AnthropicDelta::TextDelta { text: t } => {
                                        text.push_str(&t);
                                        chunks.push(LlmStreamChunk::TextDelta(t));
                                    }
                                    AnthropicDelta::ThinkingDelta { thinking } => {
                                        chunks.push(LlmStreamChunk::ThinkingDelta(thinking));
                                    }
                                    AnthropicDelta::SignatureDelta { .. } => {}
                                    AnthropicDelta::InputJsonDelta { partial_json } => {
                                        let entry = tool_args.entry(index).or_default();
                                        entry.push_str(&partial_json);
                                        if let Some((id, name)) = tool_meta.get(&index) {
                                            chunks.push(LlmStreamChunk::ToolCallDelta {
                                                index,
                                                id: Some(id.clone()),
                                                name: Some(name.clone()),
                                                args_json: entry.clone(),
                                            });
                                        }
                                    }
                                },
                                AnthropicStreamEvent::MessageDelta { delta, usage } => {
                                    if delta.stop_reason.is_some() {
                                        let token_usage = usage.map(|u| TokenUsage::new(u.input_tokens, u.output_tokens));
                                        let mut indices: Vec<usize> = tool_meta.keys().copied().collect();
                                        indices.sort_unstable();
                                        let mut tools = Vec::new();
                                        for index in indices {
                                            let (id, name) = tool_meta.get(&index).cloned().unwrap_or_default();
                                            let args_json = tool_args.get(&index).cloned().unwrap_or_default();
                                            let arguments = serde_json::from_str(&args_json)
                                                .unwrap_or(serde_json::Value::Object(Default::default()));
                                            tools.push(ToolCall { id, name, arguments });
                                        }
                                        let response = if tools.len() > 1 {
                                            LlmResponse::ParallelToolCalls { tools, usage: token_usage }
                                        } else if let Some(tool) = tools.into_iter().next() {
                                            LlmResponse::ToolCall { tool, usage: token_usage }
                                        } else {
                                            LlmResponse::FinalAnswer { content: text.clone(), usage: token_usage }
                                        };
                                        chunks.push(LlmStreamChunk::Done(response));
                                    }
                                }
                                AnthropicStreamEvent::ContentBlockStop { .. }
                                | AnthropicStreamEvent::MessageStart
                                | AnthropicStreamEvent::MessageStop
                                | AnthropicStreamEvent::Ping => {}
                            }
                        }
                        Ok(chunks)
                    })
                    .flat_map(|res| match res {
                        Ok(chunks) => stream::iter(chunks.into_iter().map(Ok)).left_stream(),
                        Err(e) => stream::iter(vec![Err(e)]).right_stream(),
                    })
                    .boxed()
            }
            Ok(resp) => stream::once(async move {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                Err(format!("Anthropic API error {status}: {body}"))
            })
            .boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_tool_result_message_from_tool_role() {
        let msg = Message::tool_result("conv-1", "call-1", "{\"ok\":true}");
        let built = AnthropicCaller::build_messages(std::slice::from_ref(&msg));
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].role, "user");
        assert_eq!(built[0].content[0]["tool_use_id"], "call-1");
    }

    #[test]
    fn drops_system_role_messages() {
        let msgs = vec![Message::system("conv-1", "be concise"), Message::user("conv-1", "hi")];
        let built = AnthropicCaller::build_messages(&msgs);
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].role, "user");
    }

    #[test]
    fn reassembles_assistant_tool_calls_as_content_blocks() {
        let call = ToolCall { id: "call-1".to_string(), name: "read_file".to_string(), arguments: serde_json::json!({"path": "a.txt"}) };
        let raw = serde_json::to_string(&call).unwrap();
        let msg = Message::assistant_tool_calls("conv-1", "tinkerer", "", vec![raw]);
        let built = AnthropicCaller::build_messages(std::slice::from_ref(&msg));
        assert_eq!(built[0].role, "assistant");
        assert_eq!(built[0].content[0]["type"], "tool_use");
        assert_eq!(built[0].content[0]["name"], "read_file");
    }
}
