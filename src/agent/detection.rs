//! Task detection for free-text messages
//!
//! Used only by the `/message` adapter, where a caller sends one prose
//! message instead of a typed request. Explicit task markers win over content
//! keywords; anything unrecognised is treated as risk classification.

use crate::protocol::messages::{TaskRequest, TaskType};

pub fn detect_task_type(text: &str) -> TaskType {
    let lower = text.to_lowercase();

    if lower.contains("task 1") || lower.contains("risk classification") {
        TaskType::RiskClassification
    } else if lower.contains("task 2") || lower.contains("business summary") {
        TaskType::BusinessSummary
    } else if lower.contains("task 3") || lower.contains("consistency") {
        TaskType::ConsistencyCheck
    } else if lower.contains("risk factor") || lower.contains("section 1a") {
        TaskType::RiskClassification
    } else if lower.contains("business") && lower.contains("section 1") {
        TaskType::BusinessSummary
    } else {
        TaskType::RiskClassification
    }
}

/// Typed request for a free-text message; the whole text becomes the context
pub fn request_from_text(text: &str) -> TaskRequest {
    TaskRequest::new(detect_task_type(text).as_str(), text)
}
