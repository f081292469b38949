//! Mock implementations for testing
//!
//! Provides a scriptable `LlmProvider` so the client, dispatcher and HTTP
//! surface can be exercised without a network or an API key.

use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenUsage,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted provider reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Successful completion with this content
    Text(String),
    /// Successful completion after a delay
    Delayed(Duration, String),
    /// Successful completion whose content field is absent
    NoContent,
    /// Provider error
    Error(LlmError),
    /// Never completes
    Hang,
}

type Responder = Arc<dyn Fn(&CompletionRequest) -> MockReply + Send + Sync>;

enum Script {
    /// Replies in order; the last one repeats once the list is exhausted
    Sequence(Vec<MockReply>),
    /// Reply computed from the request
    Responder(Responder),
}

/// Mock LLM provider for testing
pub struct MockLlmProvider {
    script: Script,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
    healthy: bool,
}

impl std::fmt::Debug for MockLlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLlmProvider")
            .field("calls", &self.call_count())
            .field("healthy", &self.healthy)
            .finish()
    }
}

impl MockLlmProvider {
    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self::from_script(Script::Sequence(replies))
    }

    pub fn new(responses: Vec<String>) -> Self {
        Self::scripted(responses.into_iter().map(MockReply::Text).collect())
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::scripted(vec![MockReply::Text(response.into())])
    }

    /// Every call fails with a non-retryable backend error
    pub fn with_failure() -> Self {
        let mut provider = Self::scripted(vec![MockReply::Error(LlmError::AuthenticationFailed {
            status: 401,
            message: "Mock LLM failure".to_string(),
        })]);
        provider.healthy = false;
        provider
    }

    pub fn hanging() -> Self {
        Self::scripted(vec![MockReply::Hang])
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> MockReply + Send + Sync + 'static,
    {
        Self::from_script(Script::Responder(Arc::new(responder)))
    }

    fn from_script(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            healthy: true,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests().pop()
    }

    fn next_reply(&self, index: usize, request: &CompletionRequest) -> MockReply {
        match &self.script {
            Script::Sequence(replies) => replies
                .get(index)
                .or_else(|| replies.last())
                .cloned()
                .unwrap_or_else(|| MockReply::Text("Mock response".to_string())),
            Script::Responder(responder) => responder(request),
        }
    }
}

fn completion(content: Option<String>) -> CompletionResponse {
    CompletionResponse {
        content,
        model: "mock-model".to_string(),
        usage: TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        },
        finish_reason: FinishReason::Stop,
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.next_reply(index, &request);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        match reply {
            MockReply::Text(text) => Ok(completion(Some(text))),
            MockReply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(completion(Some(text)))
            }
            MockReply::NoContent => Ok(completion(None)),
            MockReply::Error(error) => Err(error),
            MockReply::Hang => std::future::pending().await,
        }
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.healthy {
            Ok(())
        } else {
            Err(LlmError::NotConfigured(
                "Mock health check failure".to_string(),
            ))
        }
    }
}
