use std::{error::Error, fmt};

use reqwest::StatusCode;
use thiserror::Error;

/// The submitted form does not describe a valid [`crate::ContentRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Content is required")]
    ContentRequired,
    #[error("Invalid form data: {0}")]
    Malformed(String),
}

/// Any failure while talking to the completion endpoint.
///
/// `Display` and `Debug` are sanitized (URL query strings, userinfo and token-like strings are
/// stripped) so the error can be logged as-is.
pub enum RemoteCallError {
    Timeout,
    Request(reqwest::Error),
    BadStatus { status: StatusCode, body: String },
    InvalidResponse(String),
    InvalidConfig(String),
}

impl From<reqwest::Error> for RemoteCallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err)
        }
    }
}

impl From<serde_json::Error> for RemoteCallError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

fn sanitize(text: &str) -> String {
    crate::audit::sanitize_error_for_tracing(text)
}

impl fmt::Display for RemoteCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteCallError::Timeout => f.write_str("request timed out"),
            RemoteCallError::Request(err) => {
                write!(f, "request failed: {}", sanitize(&err.to_string()))
            }
            RemoteCallError::BadStatus { status, body } => write!(
                f,
                "provider returned non-success status {status}: {}",
                sanitize(body)
            ),
            RemoteCallError::InvalidResponse(msg) => {
                write!(f, "failed to parse provider response: {}", sanitize(msg))
            }
            RemoteCallError::InvalidConfig(msg) => {
                write!(f, "invalid configuration: {}", sanitize(msg))
            }
        }
    }
}

impl fmt::Debug for RemoteCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteCallError::Timeout => f.write_str("RemoteCallError::Timeout"),
            RemoteCallError::Request(err) => f
                .debug_struct("RemoteCallError::Request")
                .field("message", &sanitize(&err.to_string()))
                .field("is_connect", &err.is_connect())
                .finish(),
            RemoteCallError::BadStatus { status, body } => f
                .debug_struct("RemoteCallError::BadStatus")
                .field("status", &status.as_u16())
                .field("body", &sanitize(body))
                .finish(),
            RemoteCallError::InvalidResponse(msg) => f
                .debug_struct("RemoteCallError::InvalidResponse")
                .field("message", &sanitize(msg))
                .finish(),
            RemoteCallError::InvalidConfig(msg) => f
                .debug_struct("RemoteCallError::InvalidConfig")
                .field("message", &sanitize(msg))
                .finish(),
        }
    }
}

// `source()` stays `None`: reqwest's own `Display` may carry the unsanitized request URL.
impl Error for RemoteCallError {}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    RemoteCall,
}

/// Failure of a single [`crate::ContentProcessor::process`] invocation.
///
/// `Display` is the short user-facing message; the wrapped error carries the detail.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Invalid form data")]
    InvalidForm(#[source] ValidationError),
    #[error("Failed to process content")]
    Remote(#[source] RemoteCallError),
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::InvalidForm(_) => ErrorKind::Validation,
            ProcessError::Remote(_) => ErrorKind::RemoteCall,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            ProcessError::InvalidForm(_) => "Invalid form data",
            ProcessError::Remote(_) => "Failed to process content",
        }
    }

    pub fn validation_error(&self) -> Option<&ValidationError> {
        match self {
            ProcessError::InvalidForm(err) => Some(err),
            ProcessError::Remote(_) => None,
        }
    }

    pub fn remote_error(&self) -> Option<&RemoteCallError> {
        match self {
            ProcessError::InvalidForm(_) => None,
            ProcessError::Remote(err) => Some(err),
        }
    }
}
