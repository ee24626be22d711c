use std::collections::BTreeMap;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequestArgs,
        FunctionCall, FunctionObject,
    },
    Client,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::budget::TokenUsage;
use crate::llm::{AsyncLlmCaller, LlmResponse, LlmStreamChunk};
use crate::message_log::{Message, Role};
use crate::tools::{ToolCall, ToolSchema};

pub struct OpenAiCaller {
    client: Client<OpenAIConfig>,
}

impl OpenAiCaller {
    /// Standard OpenAI client, reading `OPENAI_API_KEY` from the environment.
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    /// Custom base URL — Groq, Together, Fireworks, Ollama, or any other
    /// OpenAI-compatible endpoint.
    pub fn with_base_url(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_base(api_base).with_api_key(api_key);
        Self { client: Client::with_config(config) }
    }

    fn build_tools(schemas: &[ToolSchema]) -> Vec<ChatCompletionTool> {
        schemas
            .iter()
            .map(|schema| ChatCompletionTool {
                r#type: ChatCompletionToolType::Function,
                function: FunctionObject {
                    name: schema.name.clone(),
                    description: Some(schema.description.clone()),
                    parameters: Some(schema.input_schema.clone()),
                    strict: None,
                },
            })
            .collect()
    }

    /// Converts the conversation window into OpenAI's typed message enum.
    /// `system_prompt` is always emitted first regardless of what the log
    /// holds, matching how `AgentRuntime` composes a turn (§4.5).
    fn build_messages(system_prompt: &str, messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, String> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            out.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|e| e.to_string())?
                    .into(),
            );
        }
        for m in messages {
            let converted = match m.role {
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map_err(|e| e.to_string())?
                    .into(),
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(m.content.clone())
                    .build()
                    .map_err(|e| e.to_string())?
                    .into(),
                Role::Tool => {
                    let tool_call_id = m.tool_call_id.clone().ok_or("tool message missing tool_call_id")?;
                    ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(tool_call_id)
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| e.to_string())?
                        .into()
                }
                Role::Assistant => {
                    let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                    if !m.content.is_empty() {
                        builder.content(m.content.clone());
                    }
                    if !m.tool_calls.is_empty() {
                        let parsed: Vec<ChatCompletionMessageToolCall> = m
                            .tool_calls
                            .iter()
                            .filter_map(|raw| serde_json::from_str::<ToolCall>(raw).ok())
                            .map(|tc| ChatCompletionMessageToolCall {
                                id: tc.id,
                                r#type: ChatCompletionToolType::Function,
                                function: FunctionCall {
                                    name: tc.name,
                                    arguments: tc.arguments.to_string(),
                                },
                            })
                            .collect();
                        builder.tool_calls(parsed);
                    }
                    builder.build().map_err(|e| e.to_string())?.into()
                }
            };
            out.push(converted);
        }
        Ok(out)
    }

    fn parse_tool_call(tc: &ChatCompletionMessageToolCall) -> Result<ToolCall, String> {
        let arguments = serde_json::from_str(&tc.function.arguments)
            .map_err(|e| format!("failed to parse tool arguments: {e}"))?;
        Ok(ToolCall { id: tc.id.clone(), name: tc.function.name.clone(), arguments })
    }
}

impl Default for OpenAiCaller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AsyncLlmCaller for OpenAiCaller {
    async fn call(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tool_schemas: &[ToolSchema],
        model: &str,
    ) -> Result<LlmResponse, String> {
        let oai_messages = Self::build_messages(system_prompt, messages)?;
        let oai_tools = Self::build_tools(tool_schemas);

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(model).messages(oai_messages);
        if !oai_tools.is_empty() {
            builder.tools(oai_tools);
        }
        let request = builder.build().map_err(|e| format!("failed to build request: {e}"))?;

        let response = self.client.chat().create(request).await.map_err(|e| format!("OpenAI API error: {e}"))?;

        let usage = response.usage.map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));

        let choice = response.choices.into_iter().next().ok_or("empty response from OpenAI")?;
        let message = choice.message;

        if let Some(tool_calls) = message.tool_calls {
            if tool_calls.len() > 1 {
                let tools = tool_calls.iter().map(Self::parse_tool_call).collect::<Result<Vec<_>, _>>()?;
                return Ok(LlmResponse::ParallelToolCalls { tools, usage });
            }
            if let Some(tc) = tool_calls.into_iter().next() {
                return Ok(LlmResponse::ToolCall { tool: Self::parse_tool_call(&tc)?, usage });
            }
        }

        let content = message.content.unwrap_or_default();
        Ok(LlmResponse::FinalAnswer { content, usage })
    }

    fn call_stream(
        &self,
        system_prompt: String,
        messages: Vec<Message>,
        tool_schemas: Vec<ToolSchema>,
        model: String,
    ) -> BoxStream<'static, Result<LlmStreamChunk, String>> {
        let oai_messages = match Self::build_messages(&system_prompt, &messages) {
            Ok(m) => m,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        let oai_tools = Self::build_tools(&tool_schemas);

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(model).messages(oai_messages).stream(true);
        if !oai_tools.is_empty() {
            builder.tools(oai_tools);
        }
        let request = match builder.build() {
            Ok(r) => r,
            Err(e) => return stream::once(async move { Err(format!("failed to build request: {e}")) }).boxed(),
        };

        let client = self.client.clone();

        stream::once(async move { client.chat().create_stream(request).await.map_err(|e| format!("OpenAI API error: {e}")) })
            .flat_map(|res| match res {
                Ok(inner) => {
                    #[derive(Default, Clone)]
                    struct Acc {
                        id: Option<String>,
                        name: Option<String>,
                        args: String,
                    }
                    let mut accumulated_content = String::new();
                    // Keyed by the provider's call index and iterated in
                    // that order below, so a multi-tool turn assembles in
                    // emission order (§5 ordering invariant).
                    let mut tool_accs: BTreeMap<u32, Acc> = BTreeMap::new();

                    inner
                        .map(move |res| -> Result<Vec<LlmStreamChunk>, String> {
                            let res = res.map_err(|e| format!("OpenAI stream error: {e}"))?;
                            let choice = res.choices.into_iter().next().ok_or("empty choice in stream")?;
                            let delta = choice.delta;
                            let mut out = Vec::new();

                            if let Some(tool_call_chunks) = delta.tool_calls {
                                for tc in tool_call_chunks {
                                    let acc = tool_accs.entry(tc.index).or_default();
                                    if let Some(id) = &tc.id {
                                        acc.id = Some(id.clone());
                                    }
                                    if let Some(func) = &tc.function {
                                        if let Some(name) = &func.name {
                                            acc.name = Some(name.clone());
                                        }
                                        if let Some(args) = &func.arguments {
                                            acc.args.push_str(args);
                                        }
                                    }
                                    out.push(LlmStreamChunk::ToolCallDelta {
                                        index: tc.index as usize,
                                        id: acc.id.clone(),
                                        name: acc.name.clone(),
                                        args_json: acc.args.clone(),
                                    });
                                }
                            }

                            if let Some(content) = delta.content {
                                accumulated_content.push_str(&content);
                                out.push(LlmStreamChunk::TextDelta(content));
                            }

                            if choice.finish_reason.is_some() {
                                if !tool_accs.is_empty() {
                                    let mut tools: Vec<ToolCall> = Vec::new();
                                    for acc in tool_accs.values() {
                                        let name = acc.name.clone().unwrap_or_default();
                                        let arguments = serde_json::from_str(&acc.args)
                                            .map_err(|e| format!("failed to parse tool arguments: {e}"))?;
                                        tools.push(ToolCall {
                                            id: acc.id.clone().unwrap_or_default(),
                                            name,
                                            arguments,
                                        });
                                    }
                                    let response = if tools.len() > 1 {
                                        LlmResponse::ParallelToolCalls { tools, usage: None }
                                    } else {
                                        LlmResponse::ToolCall { tool: tools.remove(0), usage: None }
                                    };
                                    out.push(LlmStreamChunk::Done(response));
                                } else {
                                    out.push(LlmStreamChunk::Done(LlmResponse::FinalAnswer {
                                        content: accumulated_content.clone(),
                                        usage: None,
                                    }));
                                }
                            }

                            Ok(out)
                        })
                        .flat_map(|res| match res {
                            Ok(chunks) => stream::iter(chunks.into_iter().map(Ok)).left_stream(),
                            Err(e) => stream::iter(vec![Err(e)]).right_stream(),
                        })
                        .boxed()
                }
                Err(e) => stream::once(async move { Err(e) }).boxed(),
            })
            .boxed()
    }
}
