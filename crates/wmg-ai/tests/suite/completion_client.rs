use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;
use url::Url;
use wmg_ai::{CompletionClient, CompletionConfig, RemoteCallError};

fn config_for(server: &MockServer) -> CompletionConfig {
    let endpoint = Url::parse(&format!("{}/v1/completions", server.base_url()))
        .expect("valid server url");
    let mut cfg = CompletionConfig::new(endpoint, "test-key");
    cfg.model = "test-model".to_string();
    cfg.max_tokens = 64;
    cfg.temperature = 0.5;
    cfg.timeout = Duration::from_secs(2);
    cfg
}

#[tokio::test]
async fn sends_prompt_model_and_bearer_key() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/completions")
            .header("authorization", "Bearer test-key")
            .header("content-type", "application/json")
            .json_body(json!({
                "prompt": "Improve this",
                "model": "test-model",
                "max_tokens": 64,
                "temperature": 0.5,
            }));
        then.status(200).json_body(json!({
            "id": "cmpl-42",
            "object": "text_completion",
            "created": 1_700_000_000u64,
            "model": "test-model",
            "choices": [{ "text": "Improved", "index": 0, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 2, "completion_tokens": 1, "total_tokens": 3 }
        }));
    });

    let client = CompletionClient::new(config_for(&server)).expect("client");
    let response = client.complete("Improve this").await.expect("completion");

    assert_eq!(response.id, "cmpl-42");
    assert_eq!(response.first_text(), Some("Improved"));
    assert_eq!(response.usage.map(|u| u.total_tokens), Some(3));
    mock.assert_hits(1);
}

#[tokio::test]
async fn non_success_status_is_reported_with_status_and_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1/completions");
        then.status(429).body("rate limited");
    });

    let client = CompletionClient::new(config_for(&server)).expect("client");
    let err = client.complete("hi").await.unwrap_err();

    match &err {
        RemoteCallError::BadStatus { status, body } => {
            assert_eq!(status.as_u16(), 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("expected BadStatus, got {other:?}"),
    }
    // A single attempt; failures are never retried.
    mock.assert_hits(1);
}

#[tokio::test]
async fn malformed_json_is_an_invalid_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/completions");
        then.status(200)
            .header("content-type", "application/json")
            .body("{ not json");
    });

    let client = CompletionClient::new(config_for(&server)).expect("client");
    let err = client.complete("hi").await.unwrap_err();
    assert!(matches!(err, RemoteCallError::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn empty_choices_is_an_invalid_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/completions");
        then.status(200).json_body(json!({ "id": "cmpl-1", "choices": [] }));
    });

    let client = CompletionClient::new(config_for(&server)).expect("client");
    let err = client.complete("hi").await.unwrap_err();
    assert!(matches!(err, RemoteCallError::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/completions");
        then.status(200)
            .delay(Duration::from_millis(1_500))
            .json_body(json!({ "choices": [{ "text": "too late" }] }));
    });

    let mut cfg = config_for(&server);
    cfg.timeout = Duration::from_millis(100);
    let client = CompletionClient::new(cfg).expect("client");

    let err = client.complete("hi").await.unwrap_err();
    assert!(matches!(err, RemoteCallError::Timeout), "{err:?}");
    assert_eq!(err.to_string(), "request timed out");
}

#[tokio::test]
async fn client_built_from_config_uses_configured_provider() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/complete")
            .header("authorization", "Bearer sk-from-config")
            .body_contains("\"model\":\"configured-model\"");
        then.status(200)
            .json_body(json!({ "choices": [{ "text": "ok" }] }));
    });

    let mut ai = wmg_config::AiConfig::default();
    ai.api_key = Some("sk-from-config".to_string());
    ai.provider.url = Url::parse(&format!("{}/complete", server.base_url())).unwrap();
    ai.provider.model = "configured-model".to_string();

    let client = CompletionClient::from_config(&ai).expect("client");
    let response = client.complete("hi").await.expect("completion");
    assert_eq!(response.first_text(), Some("ok"));
    mock.assert_hits(1);
}

#[test]
fn missing_api_key_fails_construction() {
    let err = CompletionClient::from_config(&wmg_config::AiConfig::default()).unwrap_err();
    assert!(matches!(err, RemoteCallError::InvalidConfig(_)), "{err:?}");
    assert!(err.to_string().contains("WMG_API_KEY"), "{err}");
}
