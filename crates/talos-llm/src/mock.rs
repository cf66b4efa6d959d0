//! Mock provider for testing
//!
//! A queued provider: each `complete` call pops the next scripted response
//! (or error) and falls back to a plain text response when the queue is
//! empty. Used by the orchestration-loop and recipe tests.

use crate::completion::{CompletionRequest, ProviderResponse};
use crate::error::{Error, Result};
use crate::provider::Provider;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Model name reported by the mock
const MOCK_MODEL: &str = "mock-model";

/// A mock provider that returns queued responses or default empty ones
pub struct MockProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse>>>,
    calls: AtomicUsize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider with an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a response
    pub fn push_response(&self, response: ProviderResponse) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(response));
    }

    /// Queue an error (for retry-policy tests)
    pub fn push_error(&self, error: Error) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    /// Number of `complete` calls received so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> &str {
        MOCK_MODEL
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(result) => result,
            None => Ok(ProviderResponse::text("mock response", MOCK_MODEL)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolCall;

    #[tokio::test]
    async fn test_queue_order() {
        let provider = MockProvider::new();
        provider.push_response(ProviderResponse::text("first", MOCK_MODEL));
        provider.push_response(ProviderResponse::with_tool_calls(
            "",
            vec![ToolCall::new("echo", &serde_json::json!({"text": "hi"}))],
            MOCK_MODEL,
        ));

        let request = CompletionRequest::default();
        let first = provider.complete(request.clone()).await.unwrap();
        assert_eq!(first.content, "first");

        let second = provider.complete(request.clone()).await.unwrap();
        assert!(second.has_tool_calls());

        // Queue drained: default response
        let third = provider.complete(request).await.unwrap();
        assert_eq!(third.content, "mock response");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let provider = MockProvider::new();
        provider.push_error(Error::RateLimit);

        let err = provider
            .complete(CompletionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimit));
    }
}
