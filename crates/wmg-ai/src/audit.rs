//! Audit events for completion calls, plus the redaction helpers every log line goes through.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;
use wmg_config::AI_AUDIT_TARGET;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Redact common secret patterns (API keys, bearer tokens, credential assignments).
fn sanitize_text(text: &str) -> String {
    static OPENAI_KEY_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"sk-[A-Za-z0-9_-]{16,}").expect("valid regex"));
    static BEARER_TOKEN_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9\-._=+/]{8,}").expect("valid regex"));
    static HEADER_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r#"(?i)(['"]?\b(?:authorization|api[-_]?key|access[_-]?token)\b['"]?)\s*:\s*([^\r\n,}]+)"#,
        )
        .expect("valid regex")
    });
    static QUERY_PARAM_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)([?&](?:key|api[_-]?key|token|access[_-]?token)=)([^&\s]+)")
            .expect("valid regex")
    });
    static URL_USERINFO_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\b([a-z][a-z0-9+.-]*://)[^\s/@]+@").expect("valid regex"));

    let mut out = URL_USERINFO_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!("{}[REDACTED]@", &caps[1])
        })
        .into_owned();
    out = HEADER_VALUE_RE
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            format!("{}: [REDACTED]", &caps[1])
        })
        .into_owned();
    out = QUERY_PARAM_RE
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            format!("{}[REDACTED]", &caps[1])
        })
        .into_owned();
    out = BEARER_TOKEN_RE
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            format!("{}[REDACTED]", &caps[1])
        })
        .into_owned();
    OPENAI_KEY_RE.replace_all(&out, "[REDACTED]").into_owned()
}

/// Sanitize an error string before it reaches a log line or an error `Display`.
///
/// `reqwest::Error` renders the full request URL, so query strings and userinfo are dropped
/// before the token redaction rules run.
pub(crate) fn sanitize_error_for_tracing(error: &str) -> String {
    sanitize_text(&strip_url_queries(error))
}

fn strip_url_queries(text: &str) -> String {
    static URL_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\b[a-z][a-z0-9+.-]*://[^\s]+").expect("valid regex"));

    URL_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let matched = &caps[0];

            // reqwest wraps URLs in parentheses ("... for url (http://...)"); keep trailing
            // punctuation out of the parse and re-append it.
            let end = matched
                .trim_end_matches([')', ']', '}', ',', '.', ';', ':', '"', '\'', '>'])
                .len();
            let (url_part, suffix) = matched.split_at(end);

            match url::Url::parse(url_part) {
                Ok(url) => format!("{}{}", sanitize_url_for_log(&url), suffix),
                Err(_) => {
                    let cut = url_part
                        .find(|c| matches!(c, '?' | '#'))
                        .unwrap_or(url_part.len());
                    format!("{}{}", &url_part[..cut], suffix)
                }
            }
        })
        .into_owned()
}

pub(crate) fn sanitize_url_for_log(url: &url::Url) -> String {
    let mut safe = url.clone();
    safe.set_query(None);
    safe.set_fragment(None);
    let _ = safe.set_username("");
    let _ = safe.set_password(None);
    sanitize_text(safe.as_str())
}

pub(crate) fn sanitize_prompt_for_audit(prompt: &str) -> String {
    sanitize_text(prompt)
}

/// Identifies one completion call across its request/response/error audit events.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AuditContext<'a> {
    pub request_id: u64,
    pub model: &'a str,
    pub endpoint: &'a str,
}

pub(crate) fn log_llm_request(
    ctx: AuditContext<'_>,
    prompt: &str,
    max_tokens: u32,
    temperature: f32,
) {
    let prompt_len = prompt.len() as u64;
    let prompt = sanitize_prompt_for_audit(prompt);
    info!(
        target: AI_AUDIT_TARGET,
        event = "llm_request",
        request_id = ctx.request_id,
        model = ctx.model,
        endpoint = ctx.endpoint,
        max_tokens = max_tokens,
        temperature = temperature as f64,
        prompt_len = prompt_len,
        prompt = %prompt,
    );
}

pub(crate) fn log_llm_response(
    ctx: AuditContext<'_>,
    completion: &str,
    finish_reason: Option<&str>,
    total_tokens: Option<u64>,
    latency: Duration,
) {
    let completion_len = completion.len() as u64;
    let completion = sanitize_text(completion);
    info!(
        target: AI_AUDIT_TARGET,
        event = "llm_response",
        request_id = ctx.request_id,
        model = ctx.model,
        endpoint = ctx.endpoint,
        latency_ms = latency.as_millis() as u64,
        finish_reason = finish_reason,
        total_tokens = total_tokens,
        completion_len = completion_len,
        completion = %completion,
    );
}

pub(crate) fn log_llm_error(ctx: AuditContext<'_>, error: &str, latency: Duration) {
    let error = sanitize_error_for_tracing(error);
    info!(
        target: AI_AUDIT_TARGET,
        event = "llm_error",
        request_id = ctx.request_id,
        model = ctx.model,
        endpoint = ctx.endpoint,
        latency_ms = latency.as_millis() as u64,
        error = %error,
    );
}
