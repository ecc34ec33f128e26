//! `wmg-ai` turns a piece of user text plus a handful of style toggles into an improved
//! version of that text, using a remote completion endpoint.
//!
//! The pipeline is linear: [`ContentForm::validate`] -> [`build_prompt`] ->
//! [`CompletionBackend::complete`] -> [`CompletionResult`]. [`ContentProcessor`] drives it and
//! folds the outcome into the [`ProcessResponse`] wire shape.

mod audit;
pub mod completion;
mod error;
mod processor;
mod prompt;
mod request;

pub use completion::{
    CompletionBackend, CompletionClient, CompletionConfig, ProviderRequestParts,
    RemoteCompletionResponse,
};
pub use error::{ErrorKind, ProcessError, RemoteCallError, ValidationError};
pub use processor::{
    CompletionResult, ContentProcessor, ProcessResponse, ProcessedContent, ProcessedData,
    Succeeded, SUCCESS_MESSAGE,
};
pub use prompt::{
    build_prompt, CREATIVE_DIRECTIVE, GRAMMAR_DIRECTIVE, KEEP_LENGTH_DIRECTIVE,
    PROFESSIONAL_DIRECTIVE, PROMPT_PREAMBLE,
};
pub use request::{ContentForm, ContentRequest, StyleOptions};
