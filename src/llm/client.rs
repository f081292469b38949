//! Retrying LLM client
//!
//! Wraps one [`LlmProvider`] with the per-call policy: a per-attempt timeout,
//! a bounded number of retries for transient failures, backoff between
//! attempts, and an optional overall deadline. The result is always an
//! [`LlmCallOutcome`]; provider errors never escape as `Err`.
//!
//! Worst-case blocking time of one call is
//! `timeout × (max_retries + 1)` plus the backoff delays, and never more than
//! `deadline` when one is set.

use crate::config::LlmSection;
use crate::llm::provider::{CompletionRequest, LlmError, LlmProvider, Message, ResponseFormat};
use crate::observability::metrics::metrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn, Instrument};

/// Longest single backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Per-call options
#[derive(Debug, Clone, PartialEq)]
pub struct LlmOptions {
    pub model_name: String,
    /// Cap on a single attempt
    pub timeout: Duration,
    /// Attempts after the first one, for transient failures only
    pub max_retries: u32,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Base delay between attempts
    pub backoff_base: Duration,
    /// Ask the backend for a JSON object response
    pub json_mode: bool,
    /// Overall cap across all attempts and backoff
    pub deadline: Option<Duration>,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            model_name: "deepseek/deepseek-v3.2".to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 2,
            temperature: 0.2,
            max_tokens: Some(2000),
            backoff_base: Duration::from_millis(500),
            json_mode: true,
            deadline: None,
        }
    }
}

impl From<&LlmSection> for LlmOptions {
    fn from(section: &LlmSection) -> Self {
        Self {
            model_name: section.model.clone(),
            timeout: section.timeout(),
            max_retries: section.max_retries,
            temperature: section.temperature,
            max_tokens: section.max_tokens,
            backoff_base: Duration::from_millis(section.backoff_ms),
            json_mode: section.json_mode,
            deadline: None,
        }
    }
}

impl LlmOptions {
    /// Copy of these options with an overall deadline applied
    pub fn with_deadline(&self, deadline: Duration) -> Self {
        let deadline = match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        };
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    /// Delay before the attempt following `attempts_made` failed attempts
    ///
    /// Rate limits back off exponentially, other transient failures linearly.
    pub fn backoff_delay(&self, attempts_made: u32, reason: FailureReason) -> Duration {
        let delay = match reason {
            FailureReason::RateLimited => {
                let exponent = attempts_made.saturating_sub(1).min(16);
                self.backoff_base.saturating_mul(1u32 << exponent)
            }
            _ => self.backoff_base.saturating_mul(attempts_made.max(1)),
        };
        delay.min(MAX_BACKOFF)
    }

    /// Upper bound on how long one `complete` call can block
    pub fn worst_case_duration(&self) -> Duration {
        let attempts = self.max_retries + 1;
        let mut total = self.timeout.saturating_mul(attempts);
        for attempt in 1..attempts {
            total += self.backoff_delay(attempt, FailureReason::RateLimited);
        }
        match self.deadline {
            Some(deadline) => total.min(deadline),
            None => total,
        }
    }

    fn to_request(&self, messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            messages,
            model: self.model_name.clone(),
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
            response_format: self.json_mode.then_some(ResponseFormat::Json),
        }
    }
}

/// Why a call ultimately failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    TransportError,
    RateLimited,
    #[serde(rename = "non_2xx")]
    Non2xx,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::TransportError => "transport_error",
            FailureReason::RateLimited => "rate_limited",
            FailureReason::Non2xx => "non_2xx",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&LlmError> for FailureReason {
    fn from(error: &LlmError) -> Self {
        match error {
            LlmError::Timeout(_) => FailureReason::Timeout,
            LlmError::RateLimitExceeded(_) => FailureReason::RateLimited,
            LlmError::AuthenticationFailed { .. }
            | LlmError::InvalidRequest { .. }
            | LlmError::ServerError { .. } => FailureReason::Non2xx,
            // The request never produced a usable HTTP exchange
            LlmError::NetworkError(_)
            | LlmError::InvalidResponse(_)
            | LlmError::NotConfigured(_) => FailureReason::TransportError,
        }
    }
}

/// Terminal failure of one logical call
#[derive(Debug, Clone, PartialEq)]
pub struct LlmFailure {
    pub reason: FailureReason,
    pub message: String,
    pub attempts: u32,
}

/// Result of one logical completion call
#[derive(Debug, Clone, PartialEq)]
pub enum LlmCallOutcome {
    Success(String),
    Failure(LlmFailure),
}

impl LlmCallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LlmCallOutcome::Success(_))
    }
}

/// Provider wrapper owning retry and timeout policy
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    options: LlmOptions,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>, options: LlmOptions) -> Self {
        Self { provider, options }
    }

    pub fn options(&self) -> &LlmOptions {
        &self.options
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Complete with the client's configured options
    pub async fn complete(&self, messages: Vec<Message>) -> LlmCallOutcome {
        self.complete_with(messages, &self.options).await
    }

    /// Complete with explicit options
    pub async fn complete_with(&self, messages: Vec<Message>, options: &LlmOptions) -> LlmCallOutcome {
        let span = crate::llm_span!(
            provider = %self.provider.name(),
            model = %options.model_name,
            max_retries = options.max_retries
        );
        self.run_attempts(options.to_request(messages), options)
            .instrument(span)
            .await
    }

    async fn run_attempts(&self, request: CompletionRequest, options: &LlmOptions) -> LlmCallOutcome {
        let started = Instant::now();
        let max_attempts = options.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let attempt_timeout = match options.deadline {
                Some(deadline) => options
                    .timeout
                    .min(deadline.saturating_sub(started.elapsed())),
                None => options.timeout,
            };

            if attempt_timeout.is_zero() {
                return Self::give_up(
                    FailureReason::Timeout,
                    "deadline exhausted before attempt could start".to_string(),
                    attempt - 1,
                );
            }

            debug!(attempt, timeout_ms = attempt_timeout.as_millis() as u64, "LLM attempt");
            metrics().record_llm_attempt(attempt > 1);

            let error = match tokio::time::timeout(
                attempt_timeout,
                self.provider.complete(request.clone()),
            )
            .await
            {
                Ok(Ok(response)) => {
                    let text = response.content.unwrap_or_default();
                    debug!(
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        completion_chars = text.len(),
                        "LLM call succeeded"
                    );
                    trace!(completion = %text, "LLM completion text");
                    return LlmCallOutcome::Success(text);
                }
                Ok(Err(e)) => e,
                Err(_) => LlmError::Timeout(format!(
                    "no response within {}ms",
                    attempt_timeout.as_millis()
                )),
            };

            let reason = FailureReason::from(&error);

            if !error.is_retryable() {
                return Self::give_up(reason, format!("non-retryable error: {error}"), attempt);
            }

            if attempt >= max_attempts {
                return Self::give_up(
                    reason,
                    format!("{error} (after {attempt} attempts)"),
                    attempt,
                );
            }

            let delay = options.backoff_delay(attempt, reason);
            if let Some(deadline) = options.deadline {
                if started.elapsed() + delay >= deadline {
                    return Self::give_up(
                        reason,
                        format!("{error} (deadline leaves no room for another attempt)"),
                        attempt,
                    );
                }
            }

            warn!(
                attempt,
                reason = %reason,
                delay_ms = delay.as_millis() as u64,
                "LLM attempt failed, retrying: {}",
                error
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn give_up(reason: FailureReason, message: String, attempts: u32) -> LlmCallOutcome {
        error!(reason = %reason, attempts, "LLM call failed: {}", message);
        LlmCallOutcome::Failure(LlmFailure {
            reason,
            message,
            attempts,
        })
    }
}
