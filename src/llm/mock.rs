use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::llm::{AsyncLlmCaller, LlmResponse, LlmStreamChunk};
use crate::message_log::Message;
use crate::tools::ToolSchema;

/// A programmed-response caller for tests: no network, deterministic, and
/// records every call so assertions can check what was sent.
pub struct MockLlmCaller {
    responses: Mutex<Vec<LlmResponse>>,
    call_log: Mutex<Vec<(String, usize)>>, // (model, messages.len())
}

impl MockLlmCaller {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_log: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    pub fn model_for_call(&self, n: usize) -> Option<String> {
        self.call_log.lock().unwrap().get(n).map(|(model, _)| model.clone())
    }
}

#[async_trait]
impl AsyncLlmCaller for MockLlmCaller {
    async fn call(
        &self,
        _system_prompt: &str,
        messages: &[Message],
        _tool_schemas: &[ToolSchema],
        model: &str,
    ) -> Result<LlmResponse, String> {
        self.call_log.lock().unwrap().push((model.to_string(), messages.len()));
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err("MockLlmCaller: no more programmed responses".to_string());
        }
        Ok(responses.remove(0))
    }

    fn call_stream(
        &self,
        _system_prompt: String,
        messages: Vec<Message>,
        _tool_schemas: Vec<ToolSchema>,
        model: String,
    ) -> BoxStream<'static, Result<LlmStreamChunk, String>> {
        self.call_log.lock().unwrap().push((model, messages.len()));
        let next = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                None
            } else {
                Some(responses.remove(0))
            }
        };
        match next {
            Some(resp) => stream::once(async move { Ok(LlmStreamChunk::Done(resp)) }).boxed(),
            None => stream::once(async move { Err("MockLlmCaller: no more programmed responses".to_string()) }).boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_programmed_responses_in_order() {
        let mock = MockLlmCaller::new(vec![LlmResponse::FinalAnswer {
            content: "done".to_string(),
            usage: None,
        }]);
        let result = mock.call("sys", &[], &[], "test-model").await.unwrap();
        assert!(matches!(result, LlmResponse::FinalAnswer { content, .. } if content == "done"));
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.model_for_call(0).as_deref(), Some("test-model"));
    }

    #[tokio::test]
    async fn errors_once_exhausted() {
        let mock = MockLlmCaller::new(vec![]);
        let result = mock.call("sys", &[], &[], "test-model").await;
        assert!(result.is_err());
    }
}
