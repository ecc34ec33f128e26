use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::completion::{CompletionBackend, CompletionClient};
use crate::{
    build_prompt, ContentForm, ContentRequest, ProcessError, RemoteCallError, StyleOptions,
};

pub const SUCCESS_MESSAGE: &str = "Content processed successfully";

/// The revised text plus any editor notes extracted from the completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub revised_text: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl CompletionResult {
    /// Shape the first choice's text.
    ///
    /// A `{"revised_text": ..., "suggestions": [...]}` object (optionally inside a ```json
    /// fence) is unpacked; anything else becomes `revised_text` verbatim.
    pub fn from_completion_text(text: &str) -> Self {
        match parse_structured(text) {
            Some(parsed) => parsed,
            None => Self {
                revised_text: text.to_string(),
                suggestions: Vec::new(),
            },
        }
    }
}

fn parse_structured(text: &str) -> Option<CompletionResult> {
    let trimmed = text.trim();
    let body = strip_json_fence(trimmed).unwrap_or(trimmed);
    if !body.starts_with('{') {
        return None;
    }
    serde_json::from_str::<CompletionResult>(body).ok()
}

fn strip_json_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    let rest = rest.strip_suffix("```")?;
    // Optional language tag on the opening fence line.
    let (first_line, remainder) = rest.split_once('\n')?;
    let tag = first_line.trim();
    if !(tag.is_empty() || tag.eq_ignore_ascii_case("json")) {
        return None;
    }
    Some(remainder.trim())
}

/// Result of one successful [`ContentProcessor::process`] call: the validated input alongside
/// the shaped completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedContent {
    pub original_content: String,
    pub options: StyleOptions,
    pub revised_text: String,
    pub suggestions: Vec<String>,
}

impl ProcessedContent {
    fn new(request: ContentRequest, result: CompletionResult) -> Self {
        Self {
            options: request.options(),
            original_content: request.into_content(),
            revised_text: result.revised_text,
            suggestions: result.suggestions,
        }
    }
}

/// Wire shape handed back to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessResponse {
    Success {
        success: Succeeded,
        message: String,
        data: ProcessedData,
    },
    Failure {
        error: String,
    },
}

/// The `"success": true` marker. Only ever serializes as `true` and only accepts `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Succeeded;

impl Serialize for Succeeded {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(true)
    }
}

impl<'de> Deserialize<'de> for Succeeded {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if bool::deserialize(deserializer)? {
            Ok(Succeeded)
        } else {
            Err(serde::de::Error::custom("expected `success: true`"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedData {
    pub original_content: String,
    pub processed_content: String,
    pub options: StyleOptions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ProcessResponse {
    pub fn success(processed: ProcessedContent) -> Self {
        ProcessResponse::Success {
            success: Succeeded,
            message: SUCCESS_MESSAGE.to_string(),
            data: ProcessedData {
                original_content: processed.original_content,
                processed_content: processed.revised_text,
                options: processed.options,
                suggestions: processed.suggestions,
            },
        }
    }

    /// Only the short user message crosses the wire; the detail stays in the logs.
    pub fn failure(err: &ProcessError) -> Self {
        ProcessResponse::Failure {
            error: err.user_message().to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessResponse::Success { .. })
    }
}

impl From<Result<ProcessedContent, ProcessError>> for ProcessResponse {
    fn from(result: Result<ProcessedContent, ProcessError>) -> Self {
        match result {
            Ok(processed) => ProcessResponse::success(processed),
            Err(err) => ProcessResponse::failure(&err),
        }
    }
}

/// Validates a form, builds the prompt, calls the completion backend and shapes the result.
///
/// Cheap to clone and safe to share between concurrent callers.
#[derive(Clone)]
pub struct ContentProcessor {
    backend: Arc<dyn CompletionBackend>,
}

impl std::fmt::Debug for ContentProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentProcessor").finish_non_exhaustive()
    }
}

impl ContentProcessor {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Build a processor backed by the HTTP [`CompletionClient`].
    pub fn from_config(config: &wmg_config::AiConfig) -> Result<Self, RemoteCallError> {
        let client = CompletionClient::from_config(config)?;
        Ok(Self::new(Arc::new(client)))
    }

    pub async fn process(&self, form: ContentForm) -> Result<ProcessedContent, ProcessError> {
        let request = form.validate().map_err(|err| {
            warn!(error = %err, "rejected content form");
            ProcessError::InvalidForm(err)
        })?;
        self.process_request(request).await
    }

    /// Everything after validation, for callers that validated the form themselves.
    pub async fn process_request(
        &self,
        request: ContentRequest,
    ) -> Result<ProcessedContent, ProcessError> {
        let prompt = build_prompt(&request);
        debug!(
            prompt_len = prompt.len(),
            options = ?request.options(),
            "built prompt"
        );

        let response = self.backend.complete(&prompt).await.map_err(|err| {
            error!(error = %err, "completion request failed");
            ProcessError::Remote(err)
        })?;

        let Some(text) = response.first_text() else {
            let err = RemoteCallError::InvalidResponse("missing choices[0]".into());
            error!(error = %err, "completion request failed");
            return Err(ProcessError::Remote(err));
        };

        let result = CompletionResult::from_completion_text(text);
        Ok(ProcessedContent::new(request, result))
    }

    pub async fn process_json(
        &self,
        raw: &serde_json::Value,
    ) -> Result<ProcessedContent, ProcessError> {
        let form = ContentForm::from_json(raw).map_err(|err| {
            warn!(error = %err, "rejected content form");
            ProcessError::InvalidForm(err)
        })?;
        self.process(form).await
    }

    /// [`Self::process`] folded into the wire response; never fails.
    pub async fn respond(&self, form: ContentForm) -> ProcessResponse {
        self.process(form).await.into()
    }
}
