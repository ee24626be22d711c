use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::llm::{AsyncLlmCaller, LlmResponse, LlmStreamChunk};
use crate::message_log::Message;
use crate::tools::ToolSchema;

/// Wraps any `AsyncLlmCaller` with exponential backoff on transient
/// failures. Auth errors are never retried; rate-limit errors get a
/// longer initial wait than other transient failures.
pub struct RetryingLlmCaller {
    inner: Arc<dyn AsyncLlmCaller>,
    max_retries: u32,
}

impl RetryingLlmCaller {
    pub fn new(inner: Arc<dyn AsyncLlmCaller>, max_retries: u32) -> Self {
        Self { inner, max_retries }
    }

    fn is_auth_error(err: &str) -> bool {
        let lower = err.to_lowercase();
        lower.contains("401")
            || lower.contains("403")
            || lower.contains("authentication")
            || lower.contains("unauthorized")
            || lower.contains("forbidden")
            || lower.contains("invalid api key")
    }

    fn is_rate_limit_error(err: &str) -> bool {
        let lower = err.to_lowercase();
        lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("too many requests")
            || lower.contains("too_many_tokens_error")
            || lower.contains("token_quota_exceeded")
            || lower.contains("too_many_requests_error")
            || lower.contains("queue_exceeded")
            || lower.contains("limit exceeded")
    }

    fn wait_secs(err: &str, attempt: u32) -> u64 {
        let base_wait = if Self::is_rate_limit_error(err) { 5 } else { 1 };
        std::cmp::min(base_wait << attempt, 60)
    }
}

#[async_trait]
impl AsyncLlmCaller for RetryingLlmCaller {
    async fn call(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tool_schemas: &[ToolSchema],
        model: &str,
    ) -> Result<LlmResponse, String> {
        let mut last_err = String::new();
        let mut rate_limited = false;

        for attempt in 0..=self.max_retries {
            match self.inner.call(system_prompt, messages, tool_schemas, model).await {
                Ok(resp) => return Ok(resp),
                Err(e) if Self::is_auth_error(&e) => {
                    tracing::error!(error = %e, "LLM auth error, not retrying");
                    return Err(e);
                }
                Err(e) => {
                    if Self::is_rate_limit_error(&e) {
                        rate_limited = true;
                    }
                    if attempt < self.max_retries {
                        let wait_secs = Self::wait_secs(&e, attempt);
                        tracing::warn!(
                            attempt = attempt + 1,
                            max = self.max_retries,
                            wait_s = wait_secs,
                            error = %e,
                            "LLM transient error, retrying"
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(wait_secs)).await;
                    }
                    last_err = e;
                }
            }
        }

        let prefix = if rate_limited { "LLM rate limit exceeded" } else { "LLM call failed" };
        Err(format!("{prefix} after {} retries, last error: {last_err}", self.max_retries))
    }

    fn call_stream(
        &self,
        system_prompt: String,
        messages: Vec<Message>,
        tool_schemas: Vec<ToolSchema>,
        model: String,
    ) -> BoxStream<'static, Result<LlmStreamChunk, String>> {
        // A stream that fails mid-flight can't be transparently resumed
        // without re-accumulating partial tool-call state, so retry only
        // covers the initial connection; the inner caller owns that.
        self.inner.call_stream(system_prompt, messages, tool_schemas, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmCaller;

    #[tokio::test]
    async fn returns_first_success_without_retrying() {
        let mock = Arc::new(MockLlmCaller::new(vec![LlmResponse::FinalAnswer { content: "hi".to_string(), usage: None }]));
        let retrying = RetryingLlmCaller::new(mock.clone(), 3);
        let result = retrying.call("sys", &[], &[], "test-model").await.unwrap();
        assert!(matches!(result, LlmResponse::FinalAnswer { content, .. } if content == "hi"));
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn does_not_retry_auth_errors() {
        assert!(RetryingLlmCaller::is_auth_error("401 Unauthorized"));
        assert!(RetryingLlmCaller::is_auth_error("Invalid API key"));
        assert!(!RetryingLlmCaller::is_auth_error("connection reset"));
    }

    #[test]
    fn recognizes_rate_limit_errors() {
        assert!(RetryingLlmCaller::is_rate_limit_error("429 Too Many Requests"));
        assert!(!RetryingLlmCaller::is_rate_limit_error("500 Internal Server Error"));
    }
}
