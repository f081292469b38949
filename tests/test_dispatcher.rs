//! End-to-end dispatcher behavior with a scripted LLM backend

use finance_analyst::agent::TaskDispatcher;
use finance_analyst::error::DispatchError;
use finance_analyst::llm::client::{FailureReason, LlmClient};
use finance_analyst::llm::provider::{CompletionRequest, LlmError};
use finance_analyst::protocol::{BusinessSummary, ErrorCode, TaskRequest, TaskResult, TaskType};
use finance_analyst::testing::mocks::{MockLlmProvider, MockReply};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};


use test_helpers::{dispatcher_with, fast_options};

fn user_turn(request: &CompletionRequest) -> &str {
    request
        .messages
        .last()
        .map(|message| message.content.as_str())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_risk_classification_from_json_answer() {
    let provider = Arc::new(MockLlmProvider::single_response(
        r#"{"risk_classification": ["Credit Risk", "Liquidity Risk"]}"#,
    ));
    let dispatcher = dispatcher_with(provider.clone());

    let result = dispatcher
        .handle(&TaskRequest::new(
            "risk_classification",
            "Regional lender funding long mortgages with short deposits",
        ))
        .await
        .unwrap();

    assert_eq!(
        result,
        TaskResult::RiskClassification {
            risk_classification: vec!["Credit Risk".to_string(), "Liquidity Risk".to_string()],
        }
    );
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_business_summary_from_fenced_json() {
    let provider = Arc::new(MockLlmProvider::single_response(
        "Here you go:\n```json\n{\"industry\": \"Semiconductors\", \"products\": \"GPUs and networking\", \"geography\": \"Global\"}\n```",
    ));

    let result = dispatcher_with(provider)
        .handle(&TaskRequest::new("business_summary", "Chip designer"))
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({
            "task": "business_summary",
            "business_summary": {
                "industry": "Semiconductors",
                "products": "GPUs and networking",
                "geography": "Global"
            }
        })
    );
}

#[tokio::test]
async fn test_partial_business_summary_fills_unknown() {
    let provider = Arc::new(MockLlmProvider::single_response("Industry: Banking"));

    let result = dispatcher_with(provider)
        .handle(&TaskRequest::new("business_summary", "A regional bank"))
        .await
        .unwrap();

    assert_eq!(
        result,
        TaskResult::BusinessSummary {
            business_summary: BusinessSummary {
                industry: "Banking".to_string(),
                products: "Unknown".to_string(),
                geography: "Unknown".to_string(),
            },
        }
    );
}

#[tokio::test]
async fn test_consistency_check_sends_prior_risks() {
    let provider = Arc::new(MockLlmProvider::single_response(
        r#"{"consistency_check": ["Crypto Exposure"]}"#,
    ));
    let dispatcher = dispatcher_with(provider.clone());

    let request = TaskRequest::new("consistency_check", "Community bank with farm loans")
        .with_auxiliary("prior_risks", "Credit Risk\nCrypto Exposure");
    let result = dispatcher.handle(&request).await.unwrap();

    assert_eq!(
        result,
        TaskResult::ConsistencyCheck {
            consistency_check: vec!["Crypto Exposure".to_string()],
        }
    );

    let sent = provider.last_request().unwrap();
    let prompt = user_turn(&sent);
    assert!(prompt.contains("Community bank with farm loans"));
    assert!(prompt.contains("Crypto Exposure"));
}

#[tokio::test]
async fn test_consistency_check_none_answer_is_empty_list() {
    let provider = Arc::new(MockLlmProvider::single_response(
        "None. Every prior risk is supported by the context.",
    ));

    let result = dispatcher_with(provider)
        .handle(
            &TaskRequest::new("consistency_check", "Bank")
                .with_auxiliary("prior_risks", "Credit Risk"),
        )
        .await
        .unwrap();

    assert_eq!(
        result,
        TaskResult::ConsistencyCheck {
            consistency_check: vec![],
        }
    );
}

#[tokio::test]
async fn test_unknown_task_makes_no_llm_call() {
    let provider = Arc::new(MockLlmProvider::single_response("unused"));
    let dispatcher = dispatcher_with(provider.clone());

    let error = dispatcher
        .handle(&TaskRequest::new("valuation", "Some company"))
        .await
        .unwrap_err();

    assert_eq!(error, DispatchError::unknown_task_type("valuation"));
    assert_eq!(error.code(), ErrorCode::UnknownTaskType);
    assert_eq!(error.http_status(), 400);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_task_type_match_is_exact() {
    let provider = Arc::new(MockLlmProvider::single_response("1. Credit Risk"));
    let dispatcher = dispatcher_with(provider.clone());

    for name in ["Risk_Classification", " risk_classification", "risk classification"] {
        let error = dispatcher
            .handle(&TaskRequest::new(name, "Bank"))
            .await
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::UnknownTaskType, "{name:?}");
    }
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_undeclared_task_is_unknown() {
    let provider = Arc::new(MockLlmProvider::single_response("1. Credit Risk"));
    let dispatcher = TaskDispatcher::with_supported(
        LlmClient::new(provider.clone(), fast_options()),
        vec![TaskType::BusinessSummary],
    );

    let error = dispatcher
        .handle(&TaskRequest::new("risk_classification", "Bank"))
        .await
        .unwrap_err();

    assert_eq!(error.code(), ErrorCode::UnknownTaskType);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_backend_failure_is_llm_unavailable() {
    let provider = Arc::new(MockLlmProvider::with_failure());

    let error = dispatcher_with(provider.clone())
        .handle(&TaskRequest::new("business_summary", "Bank"))
        .await
        .unwrap_err();

    match &error {
        DispatchError::LlmUnavailable {
            task_type, reason, ..
        } => {
            assert_eq!(*task_type, TaskType::BusinessSummary);
            assert_eq!(*reason, FailureReason::Non2xx);
        }
        other => panic!("Expected LlmUnavailable, got {:?}", other),
    }
    assert_eq!(error.http_status(), 503);
    // Authentication failures are not retried
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let provider = Arc::new(MockLlmProvider::scripted(vec![
        MockReply::Error(LlmError::RateLimitExceeded("429".to_string())),
        MockReply::Error(LlmError::NetworkError("connection reset".to_string())),
        MockReply::Text("1. Market Risk".to_string()),
    ]));

    let result = dispatcher_with(provider.clone())
        .handle(&TaskRequest::new("risk_classification", "Broker-dealer"))
        .await
        .unwrap();

    assert_eq!(
        result,
        TaskResult::RiskClassification {
            risk_classification: vec!["Market Risk".to_string()],
        }
    );
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn test_empty_completion_is_parse_failure() {
    let provider = Arc::new(MockLlmProvider::scripted(vec![MockReply::NoContent]));

    let error = dispatcher_with(provider)
        .handle(&TaskRequest::new("consistency_check", "Bank"))
        .await
        .unwrap_err();

    assert_eq!(error.code(), ErrorCode::ParseFailure);
    assert_eq!(error.task_type(), Some(TaskType::ConsistencyCheck));
    assert_eq!(error.http_status(), 502);
}

#[tokio::test]
async fn test_empty_risk_answer_gets_default_label() {
    let provider = Arc::new(MockLlmProvider::scripted(vec![MockReply::NoContent]));

    let result = dispatcher_with(provider)
        .handle(&TaskRequest::new("risk_classification", ""))
        .await
        .unwrap();

    match result {
        TaskResult::RiskClassification {
            risk_classification,
        } => assert_eq!(risk_classification, vec!["Unclassified Risk".to_string()]),
        other => panic!("Expected risk classification, got {:?}", other),
    }
}

#[tokio::test]
async fn test_deadline_aborts_hanging_backend() {
    let provider = Arc::new(MockLlmProvider::hanging());
    let dispatcher = dispatcher_with(provider);

    let started = Instant::now();
    let error = dispatcher
        .handle_with_deadline(
            &TaskRequest::new("risk_classification", "Bank"),
            Duration::from_millis(150),
        )
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(
        error,
        DispatchError::LlmUnavailable {
            reason: FailureReason::Timeout,
            ..
        }
    ));
    assert_eq!(error.http_status(), 504);
}

#[tokio::test]
async fn test_concurrent_requests_stay_independent() {
    let provider = Arc::new(MockLlmProvider::with_responder(|request| {
        let prompt = user_turn(request);
        let company = prompt
            .split_whitespace()
            .find(|word| word.starts_with("ACME"))
            .unwrap_or("ACME?")
            .to_string();
        let delay = Duration::from_millis((company.len() as u64 * 7) % 40);
        MockReply::Delayed(
            delay,
            json!({ "risk_classification": [format!("{company} Risk")] }).to_string(),
        )
    }));
    let dispatcher = dispatcher_with(provider.clone());

    let requests: Vec<TaskRequest> = (0..12)
        .map(|i| TaskRequest::new("risk_classification", format!("ACME{i} makes things")))
        .collect();

    let results = futures::future::join_all(
        requests.iter().map(|request| dispatcher.handle(request)),
    )
    .await;

    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(
            result.unwrap(),
            TaskResult::RiskClassification {
                risk_classification: vec![format!("ACME{i} Risk")],
            }
        );
    }
    assert_eq!(provider.call_count(), 12);
}

#[tokio::test]
async fn test_error_body_shape() {
    let provider = Arc::new(MockLlmProvider::single_response("unused"));

    let error = dispatcher_with(provider)
        .handle(&TaskRequest::new("stock_tips", "Bank"))
        .await
        .unwrap_err();

    let body = serde_json::to_value(error.to_error_response()).unwrap();
    assert_eq!(body["error"]["code"], "unknown_task_type");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("stock_tips"));
}
