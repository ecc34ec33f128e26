use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Raw, unvalidated form input as submitted by a caller.
///
/// JSON keys are camelCase (`improveGrammar`, ...). Unknown keys are ignored; a field with the
/// wrong JSON type (including `null`) makes the whole form invalid. Only an absent key falls back
/// to its default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentForm {
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub improve_grammar: Option<bool>,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub make_creative: Option<bool>,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub make_professional: Option<bool>,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub keep_length: Option<bool>,
}

impl ContentForm {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: StyleOptions) -> Self {
        self.improve_grammar = Some(options.improve_grammar);
        self.make_creative = Some(options.make_creative);
        self.make_professional = Some(options.make_professional);
        self.keep_length = Some(options.keep_length);
        self
    }

    pub fn from_json(raw: &serde_json::Value) -> Result<Self, ValidationError> {
        Self::deserialize(raw).map_err(|err| ValidationError::Malformed(err.to_string()))
    }

    /// `content` must be non-empty. It is deliberately not trimmed, so whitespace-only input
    /// passes. Missing flags default to `false`.
    pub fn validate(self) -> Result<ContentRequest, ValidationError> {
        let content = match self.content {
            Some(content) if !content.is_empty() => content,
            _ => return Err(ValidationError::ContentRequired),
        };

        Ok(ContentRequest {
            content,
            options: StyleOptions {
                improve_grammar: self.improve_grammar.unwrap_or(false),
                make_creative: self.make_creative.unwrap_or(false),
                make_professional: self.make_professional.unwrap_or(false),
                keep_length: self.keep_length.unwrap_or(false),
            },
        })
    }
}

// Runs only when the key is present, so `null` reaches `T::deserialize` and is rejected.
fn present_value<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// The style toggles offered to the user.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleOptions {
    pub improve_grammar: bool,
    pub make_creative: bool,
    pub make_professional: bool,
    pub keep_length: bool,
}

/// A validated content-processing request. Built fresh per submission and consumed by
/// [`crate::build_prompt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    content: String,
    options: StyleOptions,
}

impl ContentRequest {
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn options(&self) -> StyleOptions {
        self.options
    }

    pub fn into_content(self) -> String {
        self.content
    }
}
