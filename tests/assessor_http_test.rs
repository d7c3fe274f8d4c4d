//! HTTP severity assessor against a mock chat completions endpoint

mod common;

use common::*;
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use triage_engine::{
    assessor::{AssessorError, HttpSeverityAssessor, SeverityAssessor},
    triage::{InferenceContext, TriageStatus},
};

const PATH: &str = "/v1/chat/completions";

fn completion(content: &str) -> String {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            {
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }
        ]
    })
    .to_string()
}

#[tokio::test]
async fn test_sends_chat_request_and_returns_content() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", PATH)
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!({
            "model": "triage-test",
            "temperature": 0.0
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion("2;possible fracture"))
        .create_async()
        .await;

    let assessor = HttpSeverityAssessor::new(
        format!("{}{}", server.url(), PATH),
        "triage-test",
        Some("test-key".to_string()),
    )
    .unwrap();

    let raw = assessor.assess("Age: 67").await.unwrap();
    assert_eq!(raw, "2;possible fracture");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", PATH)
        .with_status(500)
        .with_body("upstream exploded")
        .create_async()
        .await;

    let assessor =
        HttpSeverityAssessor::new(format!("{}{}", server.url(), PATH), "triage-test", None).unwrap();

    match assessor.assess("Age: 67").await {
        Err(AssessorError::Unavailable(msg)) => assert!(msg.contains("500")),
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_response_without_choices_is_unavailable() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[]}"#)
        .create_async()
        .await;

    let assessor =
        HttpSeverityAssessor::new(format!("{}{}", server.url(), PATH), "triage-test", None).unwrap();

    assert!(matches!(
        assessor.assess("Age: 67").await,
        Err(AssessorError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_unreachable_endpoint_degrades_triage() {
    // Nothing listens on the discard port
    let assessor = HttpSeverityAssessor::new("http://127.0.0.1:9/v1/chat/completions", "triage-test", None)
        .unwrap();
    let context = InferenceContext::new(shared_artifact(), Arc::new(assessor), Duration::from_secs(5));

    let report = context.triage(&observation_for(3)).await.unwrap();
    assert_eq!(report.status, TriageStatus::Degraded);
    assert_eq!(report.recommended_score.value(), 3);
    assert_eq!(report.failure.unwrap().stage, "assessor_unavailable");
}

#[tokio::test]
async fn test_mocked_endpoint_end_to_end() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", PATH)
        .match_body(Matcher::Regex("Blood pressure".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion("1;shock"))
        .create_async()
        .await;

    let assessor =
        HttpSeverityAssessor::new(format!("{}{}", server.url(), PATH), "triage-test", None).unwrap();
    let context = InferenceContext::new(shared_artifact(), Arc::new(assessor), Duration::from_secs(5));

    let report = context.triage(&observation_for(5)).await.unwrap();
    assert_eq!(report.status, TriageStatus::Fused);
    // 0.75 * 1 + 0.25 * 5 = 2.0
    assert_eq!(report.recommended_score.value(), 2);
    assert_eq!(report.external.unwrap().rationale, "shock");
}
