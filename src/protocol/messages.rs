//! Wire types for the three-task evaluation protocol
//!
//! Inbound requests name a task type explicitly; outbound results are tagged
//! with the task name and carry a single payload key of the same name:
//!
//! ```json
//! {"task": "risk_classification", "risk_classification": ["Credit Risk"]}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The three evaluation tasks this agent answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    RiskClassification,
    BusinessSummary,
    ConsistencyCheck,
}

impl TaskType {
    /// All task types in protocol order (task 1, 2, 3)
    pub const ALL: [TaskType; 3] = [
        TaskType::RiskClassification,
        TaskType::BusinessSummary,
        TaskType::ConsistencyCheck,
    ];

    /// Wire name, also used as the payload key of the result
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::RiskClassification => "risk_classification",
            TaskType::BusinessSummary => "business_summary",
            TaskType::ConsistencyCheck => "consistency_check",
        }
    }

    /// Exact match against the wire name. No guessing.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }

    /// Human-readable title used in prompts and the agent card
    pub fn title(&self) -> &'static str {
        match self {
            TaskType::RiskClassification => "Risk Classification",
            TaskType::BusinessSummary => "Business Summary",
            TaskType::ConsistencyCheck => "Consistency Check",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound task request
///
/// `task_type` stays a raw string on the wire so that an unrecognised value
/// reaches the dispatcher and is reported as `unknown_task_type` rather than
/// failing body decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_type: String,
    #[serde(default)]
    pub company_context: String,
    /// Extra named inputs, e.g. `prior_risks` for a consistency check
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub auxiliary_data: BTreeMap<String, String>,
}

impl TaskRequest {
    pub fn new(task_type: impl Into<String>, company_context: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            company_context: company_context.into(),
            auxiliary_data: BTreeMap::new(),
        }
    }

    /// Builder-style helper for attaching auxiliary data
    pub fn with_auxiliary(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.auxiliary_data.insert(key.into(), value.into());
        self
    }
}

/// Business summary payload - all three fields are always present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusinessSummary {
    pub industry: String,
    pub products: String,
    pub geography: String,
}

/// Final answer for one task
///
/// # Examples
/// ```
/// use finance_analyst::protocol::TaskResult;
///
/// let result = TaskResult::RiskClassification {
///     risk_classification: vec!["Credit Risk".to_string()],
/// };
/// let json = serde_json::to_value(&result).unwrap();
/// assert_eq!(json["task"], "risk_classification");
/// assert_eq!(json["risk_classification"][0], "Credit Risk");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskResult {
    RiskClassification {
        risk_classification: Vec<String>,
    },
    BusinessSummary {
        business_summary: BusinessSummary,
    },
    ConsistencyCheck {
        consistency_check: Vec<String>,
    },
}

impl TaskResult {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskResult::RiskClassification { .. } => TaskType::RiskClassification,
            TaskResult::BusinessSummary { .. } => TaskType::BusinessSummary,
            TaskResult::ConsistencyCheck { .. } => TaskType::ConsistencyCheck,
        }
    }
}

/// Error body returned for every failed request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
    /// Task name when the request got far enough to be classified
    pub task: Option<TaskType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    /// Human-readable description (no sensitive data)
    pub message: String,
}

/// Documented error codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnknownTaskType,
    LlmUnavailable,
    ParseFailure,
    InvalidRequest,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnknownTaskType => "unknown_task_type",
            ErrorCode::LlmUnavailable => "llm_unavailable",
            ErrorCode::ParseFailure => "parse_failure",
            ErrorCode::InvalidRequest => "invalid_request",
        }
    }
}

/// Free-text inbound message, as sent by evaluators that do not tag tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextMessage {
    pub text: String,
}
