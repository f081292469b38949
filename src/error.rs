//! Error types for task dispatch
//!
//! Every failure a caller can observe is one of these variants, and each maps
//! to a documented error code and HTTP status. Messages are sanitized before
//! they leave the process.

use crate::llm::client::{FailureReason, LlmFailure};
use crate::processing::response_parser::ParseFailure;
use crate::protocol::messages::{ErrorCode, ErrorDetails, ErrorResponse, TaskType};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const MAX_MESSAGE_LEN: usize = 500;
const TRUNCATE_SUFFIX: &str = "...[truncated]";

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret|authorization)[=:]\s*\S+").expect("secret regex")
});

static BEARER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)bearer\s+\S+").expect("bearer regex"));

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path regex")
});

/// Failure of a single `handle` call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("Unknown task type: {task_type}")]
    UnknownTaskType { task_type: String },

    #[error("LLM unavailable for {task_type} ({reason}): {message}")]
    LlmUnavailable {
        task_type: TaskType,
        reason: FailureReason,
        message: String,
    },

    #[error("Could not parse {task_type} response: {message}")]
    ParseFailure { task_type: TaskType, message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl DispatchError {
    pub fn unknown_task_type<S: Into<String>>(task_type: S) -> Self {
        Self::UnknownTaskType {
            task_type: task_type.into(),
        }
    }

    pub fn llm_unavailable(task_type: TaskType, failure: LlmFailure) -> Self {
        Self::LlmUnavailable {
            task_type,
            reason: failure.reason,
            message: failure.message,
        }
    }

    /// The caller's deadline expired before the task finished
    pub fn deadline_exceeded(task_type: TaskType, deadline_ms: u128) -> Self {
        Self::LlmUnavailable {
            task_type,
            reason: FailureReason::Timeout,
            message: format!("request deadline of {deadline_ms}ms exceeded"),
        }
    }

    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchError::UnknownTaskType { .. } => ErrorCode::UnknownTaskType,
            DispatchError::LlmUnavailable { .. } => ErrorCode::LlmUnavailable,
            DispatchError::ParseFailure { .. } => ErrorCode::ParseFailure,
            DispatchError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
        }
    }

    /// Task the request was classified as, if it got that far
    pub fn task_type(&self) -> Option<TaskType> {
        match self {
            DispatchError::LlmUnavailable { task_type, .. }
            | DispatchError::ParseFailure { task_type, .. } => Some(*task_type),
            DispatchError::UnknownTaskType { .. } | DispatchError::InvalidRequest { .. } => None,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            DispatchError::UnknownTaskType { .. } | DispatchError::InvalidRequest { .. } => 400,
            DispatchError::ParseFailure { .. } => 502,
            DispatchError::LlmUnavailable {
                reason: FailureReason::Timeout,
                ..
            } => 504,
            DispatchError::LlmUnavailable { .. } => 503,
        }
    }

    /// Caller-facing error body
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetails {
                code: self.code(),
                message: sanitize_error_message(&self.to_string()),
            },
            task: self.task_type(),
        }
    }
}

impl From<ParseFailure> for DispatchError {
    fn from(failure: ParseFailure) -> Self {
        Self::ParseFailure {
            task_type: failure.task_type,
            message: failure.message,
        }
    }
}

/// Redact credentials and sensitive paths, and bound the length
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = BEARER_PATTERN.replace_all(message, "Bearer ***");
    let sanitized = SECRET_PATTERN.replace_all(&sanitized, "${1}=***");
    let mut sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN - TRUNCATE_SUFFIX.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str(TRUNCATE_SUFFIX);
    }

    sanitized
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;
