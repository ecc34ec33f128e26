use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

use crate::audit::{self, AuditContext};
use crate::RemoteCallError;

const USER_AGENT: &str = concat!("wmg-ai/", env!("CARGO_PKG_VERSION"));

/// Anything that can turn a prompt into a [`RemoteCompletionResponse`].
///
/// [`CompletionClient`] is the HTTP implementation; tests substitute in-memory backends.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<RemoteCompletionResponse, RemoteCallError>;
}

#[derive(Clone)]
pub struct CompletionConfig {
    /// Full URL of the completion endpoint; the request is POSTed here as-is.
    pub endpoint: Url,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Bounds the whole request: connect, send, and reading the body.
    pub timeout: Duration,
    pub audit_logging: bool,
}

impl CompletionConfig {
    pub fn new(endpoint: Url, api_key: impl Into<String>) -> Self {
        let defaults = wmg_config::AiProviderConfig::default();
        let timeout = defaults.timeout();
        Self {
            endpoint,
            api_key: api_key.into(),
            model: defaults.model,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            timeout,
            audit_logging: false,
        }
    }

    /// Settings from the `[ai]` config section. Fails when no API key is configured.
    pub fn from_ai_config(config: &wmg_config::AiConfig) -> Result<Self, RemoteCallError> {
        let api_key = config
            .require_api_key()
            .map_err(|err| RemoteCallError::InvalidConfig(err.to_string()))?;
        Ok(Self {
            endpoint: config.provider.url.clone(),
            api_key: api_key.to_owned(),
            model: config.provider.model.clone(),
            max_tokens: config.provider.max_tokens,
            temperature: config.provider.temperature,
            timeout: config.provider.timeout(),
            audit_logging: config.audit_log.enabled,
        })
    }
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("endpoint", &audit::sanitize_url_for_log(&self.endpoint))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("audit_logging", &self.audit_logging)
            .finish()
    }
}

/// Everything needed to issue one completion request, without sending it.
#[derive(Debug, Clone)]
pub struct ProviderRequestParts {
    pub url: Url,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

/// Raw response of the completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
}

impl RemoteCompletionResponse {
    /// Text of `choices[0]`, the only part of the response the processor reads.
    pub fn first_text(&self) -> Option<&str> {
        self.choices.first().map(|choice| choice.text.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub text: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompletionUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct CompletionClient {
    cfg: CompletionConfig,
    authorization: HeaderValue,
    http: reqwest::Client,
}

impl CompletionClient {
    pub fn new(cfg: CompletionConfig) -> Result<Self, RemoteCallError> {
        if cfg.api_key.trim().is_empty() {
            return Err(RemoteCallError::InvalidConfig(
                "completion endpoint requires an api key".into(),
            ));
        }
        if cfg.timeout == Duration::ZERO {
            return Err(RemoteCallError::InvalidConfig("timeout must be > 0".into()));
        }

        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", cfg.api_key.trim()))
            .map_err(|_| {
                RemoteCallError::InvalidConfig("api key is not a valid header value".into())
            })?;
        authorization.set_sensitive(true);

        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            cfg,
            authorization,
            http,
        })
    }

    pub fn from_config(config: &wmg_config::AiConfig) -> Result<Self, RemoteCallError> {
        Self::new(CompletionConfig::from_ai_config(config)?)
    }

    pub fn build_request_parts(&self, prompt: &str) -> ProviderRequestParts {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.authorization.clone());
        let body = json!({
            "prompt": prompt,
            "model": self.cfg.model,
            "max_tokens": self.cfg.max_tokens,
            "temperature": self.cfg.temperature,
        });
        ProviderRequestParts {
            url: self.cfg.endpoint.clone(),
            headers,
            body,
        }
    }

    /// Issue one completion request. No retries, no caching.
    pub async fn complete(&self, prompt: &str) -> Result<RemoteCompletionResponse, RemoteCallError> {
        let parts = self.build_request_parts(prompt);
        let safe_url = audit::sanitize_url_for_log(&parts.url);
        let ctx = AuditContext {
            request_id: if self.cfg.audit_logging {
                audit::next_request_id()
            } else {
                0
            },
            model: &self.cfg.model,
            endpoint: &safe_url,
        };

        if self.cfg.audit_logging {
            audit::log_llm_request(ctx, prompt, self.cfg.max_tokens, self.cfg.temperature);
        } else {
            debug!(url = %safe_url, model = %self.cfg.model, prompt_len = prompt.len(), "completion request");
        }

        let started_at = Instant::now();
        let result = self.send(parts).await;
        let latency = started_at.elapsed();

        match &result {
            Ok(response) if self.cfg.audit_logging => {
                let first = response.choices.first();
                audit::log_llm_response(
                    ctx,
                    first.map(|c| c.text.as_str()).unwrap_or_default(),
                    first.and_then(|c| c.finish_reason.as_deref()),
                    response.usage.map(|u| u.total_tokens),
                    latency,
                );
            }
            Ok(response) => {
                debug!(
                    model = %response.model,
                    choices = response.choices.len(),
                    latency_ms = latency.as_millis() as u64,
                    "completion response"
                );
            }
            Err(err) if self.cfg.audit_logging => {
                audit::log_llm_error(ctx, &err.to_string(), latency);
            }
            Err(_) => {}
        }

        result
    }

    async fn send(
        &self,
        parts: ProviderRequestParts,
    ) -> Result<RemoteCompletionResponse, RemoteCallError> {
        let response = self
            .http
            .post(parts.url)
            .headers(parts.headers)
            .json(&parts.body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            return Err(RemoteCallError::BadStatus { status, body });
        }

        parse_completion_response(&bytes)
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(&self, prompt: &str) -> Result<RemoteCompletionResponse, RemoteCallError> {
        CompletionClient::complete(self, prompt).await
    }
}

fn parse_completion_response(bytes: &[u8]) -> Result<RemoteCompletionResponse, RemoteCallError> {
    let resp: RemoteCompletionResponse = serde_json::from_slice(bytes)?;
    if resp.choices.is_empty() {
        return Err(RemoteCallError::InvalidResponse("missing choices[0]".into()));
    }
    Ok(resp)
}
