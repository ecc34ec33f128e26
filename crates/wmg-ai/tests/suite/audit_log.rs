use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;
use tracing::{field::Visit, Event};
use tracing_subscriber::{layer::Context, prelude::*, Layer};
use url::Url;
use wmg_ai::{CompletionClient, CompletionConfig};
use wmg_config::AI_AUDIT_TARGET;

#[derive(Debug, Clone)]
struct CapturedEvent {
    target: String,
    fields: HashMap<String, String>,
}

#[derive(Clone)]
struct CapturingLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S> Layer<S> for CapturingLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events
            .lock()
            .expect("events mutex poisoned")
            .push(CapturedEvent {
                target: event.metadata().target().to_string(),
                fields: visitor.fields,
            });
    }
}

#[derive(Default)]
struct FieldVisitor {
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), value.to_string());
    }
}

fn capture() -> (Arc<Mutex<Vec<CapturedEvent>>>, tracing::subscriber::DefaultGuard) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(CapturingLayer {
        events: events.clone(),
    });
    let guard = tracing::subscriber::set_default(subscriber);
    (events, guard)
}

fn audit_events(events: &[CapturedEvent]) -> Vec<&CapturedEvent> {
    events
        .iter()
        .filter(|event| event.target == AI_AUDIT_TARGET)
        .collect()
}

fn audited_client(url: Url) -> CompletionClient {
    let mut cfg = CompletionConfig::new(url, "sk-test-012345678901234567890123");
    cfg.timeout = Duration::from_secs(2);
    cfg.audit_logging = true;
    CompletionClient::new(cfg).expect("client")
}

#[tokio::test(flavor = "current_thread")]
async fn audit_events_redact_secrets_in_prompt_and_completion() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/completions");
        then.status(200).json_body(json!({
            "choices": [{
                "text": "Rewritten. Bearer abcdefghijklmnopqrstuvwxyz",
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 4, "completion_tokens": 3, "total_tokens": 7 }
        }));
    });

    let (events, _guard) = capture();
    let client = audited_client(
        Url::parse(&format!("{}/v1/completions", server.base_url())).unwrap(),
    );
    client
        .complete("Please fix: my key is sk-proj-abcdefghijklmnopqrstuvwx")
        .await
        .expect("completion");

    let events = events.lock().expect("events mutex poisoned");
    let audit = audit_events(&events);
    assert_eq!(audit.len(), 2, "captured: {events:?}");

    let request = audit[0];
    assert_eq!(request.fields["event"], "llm_request");
    assert!(request.fields["prompt"].contains("Please fix"));
    assert!(!request.fields["prompt"].contains("sk-proj-abcdefghijklmnopqrstuvwx"));

    let response = audit[1];
    assert_eq!(response.fields["event"], "llm_response");
    assert_eq!(response.fields["request_id"], request.fields["request_id"]);
    assert_eq!(response.fields["total_tokens"], "7");
    assert!(response.fields["completion"].contains("Rewritten."));
    assert!(!response.fields["completion"].contains("abcdefghijklmnopqrstuvwxyz"));

    for event in &audit {
        for (field, value) in &event.fields {
            assert!(
                !value.contains("sk-test-012345678901234567890123"),
                "audit field `{field}` leaked the api key: {value}"
            );
        }
    }
}

#[tokio::test(flavor = "current_thread")]
async fn audit_error_event_does_not_leak_url_secrets() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/completions");
        then.status(503).body("unavailable");
    });

    let mut url = Url::parse(&format!("{}/v1/completions", server.base_url())).unwrap();
    url.set_username("user").expect("set url username");
    url.set_password(Some("pass")).expect("set url password");
    url.set_query(Some("key=supersecret"));

    let (events, _guard) = capture();
    let client = audited_client(url);
    let _ = client.complete("hello").await;

    let events = events.lock().expect("events mutex poisoned");
    let audit = audit_events(&events);
    let error_event = audit
        .iter()
        .find(|event| event.fields.get("event").map(String::as_str) == Some("llm_error"))
        .unwrap_or_else(|| panic!("expected llm_error event, captured: {events:?}"));
    assert!(error_event.fields["error"].contains("503"));

    for event in &audit {
        for (field, value) in &event.fields {
            assert!(
                !value.contains("supersecret"),
                "event field `{field}` leaked query value: {value}"
            );
            assert!(
                !value.contains("user:pass"),
                "event field `{field}` leaked url credentials: {value}"
            );
        }
    }
}

#[tokio::test(flavor = "current_thread")]
async fn no_audit_events_unless_enabled() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/completions");
        then.status(200)
            .json_body(json!({ "choices": [{ "text": "fine" }] }));
    });

    let (events, _guard) = capture();
    let cfg = CompletionConfig::new(
        Url::parse(&format!("{}/v1/completions", server.base_url())).unwrap(),
        "test-key",
    );
    let client = CompletionClient::new(cfg).expect("client");
    client.complete("hello").await.expect("completion");

    let events = events.lock().expect("events mutex poisoned");
    assert!(audit_events(&events).is_empty(), "captured: {events:?}");
}
