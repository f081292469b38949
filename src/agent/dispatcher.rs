//! Task dispatcher
//!
//! Top-level entry point for one task: classify the request, build the
//! prompt, call the LLM, normalize the answer. The dispatcher owns no
//! mutable state, so one instance is shared by every concurrent request.

use crate::config::AnalystConfig;
use crate::error::DispatchError;
use crate::llm::client::{LlmCallOutcome, LlmClient, LlmOptions};
use crate::llm::provider::LlmProvider;
use crate::observability::metrics::metrics;
use crate::processing::prompt::PromptBuilder;
use crate::processing::response_parser::ResponseParser;
use crate::protocol::messages::{TaskRequest, TaskResult, TaskType};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn, Instrument};
use uuid::Uuid;

/// Stateless task dispatcher
#[derive(Clone)]
pub struct TaskDispatcher {
    llm: LlmClient,
    supported: Vec<TaskType>,
}

impl TaskDispatcher {
    /// Dispatcher declaring every known task type
    pub fn new(llm: LlmClient) -> Self {
        Self::with_supported(llm, TaskType::ALL.to_vec())
    }

    pub fn with_supported(llm: LlmClient, supported: Vec<TaskType>) -> Self {
        Self { llm, supported }
    }

    /// Build from configuration around an already constructed provider
    pub fn from_config(config: &AnalystConfig, provider: Arc<dyn LlmProvider>) -> Self {
        let llm = LlmClient::new(provider, LlmOptions::from(&config.llm));
        Self::with_supported(llm, config.supported_task_types())
    }

    pub fn supported_task_types(&self) -> &[TaskType] {
        &self.supported
    }

    pub fn llm(&self) -> &LlmClient {
        &self.llm
    }

    /// Map the request's task name to a declared task type. No inference.
    pub fn classify(&self, task_type: &str) -> Result<TaskType, DispatchError> {
        TaskType::parse(task_type)
            .filter(|parsed| self.supported.contains(parsed))
            .ok_or_else(|| DispatchError::unknown_task_type(task_type))
    }

    /// Handle one request, bounded only by the LLM client's own policy
    pub async fn handle(&self, request: &TaskRequest) -> Result<TaskResult, DispatchError> {
        self.handle_inner(request, None).await
    }

    /// Handle one request, aborting the outstanding LLM call once `deadline` expires
    pub async fn handle_with_deadline(
        &self,
        request: &TaskRequest,
        deadline: Duration,
    ) -> Result<TaskResult, DispatchError> {
        self.handle_inner(request, Some(deadline)).await
    }

    async fn handle_inner(
        &self,
        request: &TaskRequest,
        deadline: Option<Duration>,
    ) -> Result<TaskResult, DispatchError> {
        let request_id = Uuid::new_v4();
        let span = crate::task_span!(
            request_id = %request_id,
            task_type = %request.task_type,
            context_chars = request.company_context.len()
        );

        async move {
            let started = Instant::now();
            let _in_flight = metrics().task_received();

            let result = self.dispatch(request, deadline).await;
            let elapsed = started.elapsed();

            match &result {
                Ok(task_result) => {
                    metrics().task_completed(task_result.task_type(), elapsed);
                    info!(
                        duration_ms = elapsed.as_millis() as u64,
                        "Task completed"
                    );
                }
                Err(e) => {
                    metrics().task_failed(e.code(), elapsed);
                    warn!(
                        code = e.code().as_str(),
                        duration_ms = elapsed.as_millis() as u64,
                        "Task failed: {}",
                        e
                    );
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch(
        &self,
        request: &TaskRequest,
        deadline: Option<Duration>,
    ) -> Result<TaskResult, DispatchError> {
        let task_type = self.classify(&request.task_type)?;

        let prompt = PromptBuilder::build(
            task_type,
            &request.company_context,
            &request.auxiliary_data,
        );
        trace!(prompt = %prompt.text(), "Built prompt");

        let outcome = match deadline {
            Some(deadline) => {
                let options = self.llm.options().with_deadline(deadline);
                // Dropping the call future cancels the in-flight request
                tokio::time::timeout(deadline, self.llm.complete_with(prompt.to_messages(), &options))
                    .await
                    .map_err(|_| DispatchError::deadline_exceeded(task_type, deadline.as_millis()))?
            }
            None => self.llm.complete(prompt.to_messages()).await,
        };

        let raw_text = match outcome {
            LlmCallOutcome::Success(raw_text) => raw_text,
            LlmCallOutcome::Failure(failure) => {
                return Err(DispatchError::llm_unavailable(task_type, failure));
            }
        };

        debug!(raw_chars = raw_text.len(), "Parsing model output");
        Ok(ResponseParser::parse(task_type, &raw_text)?)
    }
}
