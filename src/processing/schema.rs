//! JSON schemas for task results
//!
//! Every result leaving the parser is checked against the schema of its
//! variant, so a value that reaches the caller has exactly the documented
//! shape: the `task` tag, one payload key, nothing else.

use crate::protocol::messages::{TaskResult, TaskType};
use serde_json::{json, Value};

fn label_list(min_items: usize) -> Value {
    json!({
        "type": "array",
        "minItems": min_items,
        "uniqueItems": true,
        "items": { "type": "string", "minLength": 1, "pattern": "\\S" }
    })
}

fn non_blank_string() -> Value {
    json!({ "type": "string", "minLength": 1, "pattern": "\\S" })
}

/// Schema describing the wire shape of one task's result
pub fn result_schema(task_type: TaskType) -> Value {
    let payload = match task_type {
        TaskType::RiskClassification => label_list(1),
        TaskType::ConsistencyCheck => label_list(0),
        TaskType::BusinessSummary => json!({
            "type": "object",
            "required": ["industry", "products", "geography"],
            "additionalProperties": false,
            "properties": {
                "industry": non_blank_string(),
                "products": non_blank_string(),
                "geography": non_blank_string()
            }
        }),
    };

    json!({
        "type": "object",
        "required": ["task", task_type.as_str()],
        "additionalProperties": false,
        "properties": {
            "task": { "const": task_type.as_str() },
            task_type.as_str(): payload
        }
    })
}

/// Validate an arbitrary JSON value against a task's result schema
pub fn validate_value(task_type: TaskType, value: &Value) -> Result<(), String> {
    let schema = result_schema(task_type);
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| format!("Schema compilation error: {e}"))?;

    let error_messages: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("At '{}': {}", e.instance_path, e))
        .collect();
    if error_messages.is_empty() {
        Ok(())
    } else {
        Err(error_messages.join("; "))
    }
}

/// Validate a typed result by checking its serialized form
pub fn validate_result(result: &TaskResult) -> Result<(), String> {
    let value = serde_json::to_value(result).map_err(|e| format!("Serialization error: {e}"))?;
    validate_value(result.task_type(), &value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::BusinessSummary;

    #[test]
    fn test_valid_results_pass() {
        let results = vec![
            TaskResult::RiskClassification {
                risk_classification: vec!["Credit Risk".to_string()],
            },
            TaskResult::ConsistencyCheck {
                consistency_check: vec![],
            },
            TaskResult::BusinessSummary {
                business_summary: BusinessSummary {
                    industry: "Banking".to_string(),
                    products: "Unknown".to_string(),
                    geography: "Unknown".to_string(),
                },
            },
        ];

        for result in results {
            assert!(validate_result(&result).is_ok(), "{result:?}");
        }
    }

    #[test]
    fn test_empty_risk_list_rejected() {
        let result = TaskResult::RiskClassification {
            risk_classification: vec![],
        };
        assert!(validate_result(&result).is_err());
    }

    #[test]
    fn test_blank_fields_rejected() {
        let result = TaskResult::BusinessSummary {
            business_summary: BusinessSummary {
                industry: "   ".to_string(),
                products: "Loans".to_string(),
                geography: "US".to_string(),
            },
        };
        assert!(validate_result(&result).is_err());
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let result = TaskResult::ConsistencyCheck {
            consistency_check: vec!["Market Risk".to_string(), "Market Risk".to_string()],
        };
        assert!(validate_result(&result).is_err());
    }

    #[test]
    fn test_extra_and_mismatched_keys_rejected() {
        let extra = json!({
            "task": "risk_classification",
            "risk_classification": ["Credit Risk"],
            "confidence": 0.9
        });
        assert!(validate_value(TaskType::RiskClassification, &extra).is_err());

        let wrong_tag = json!({
            "task": "consistency_check",
            "risk_classification": ["Credit Risk"]
        });
        let error = validate_value(TaskType::RiskClassification, &wrong_tag).unwrap_err();
        assert!(!error.is_empty());
    }
}
