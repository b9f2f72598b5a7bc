//! Error types for the cinepay backend client

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when talking to the cinepay backend
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The backend answered with a non-success status
    #[error("API error (status {status})")]
    Status {
        /// HTTP status code
        status: u16,
        /// Decoded response body (`Value::Null` when empty)
        body: Value,
    },

    /// HTTP request failed before a response arrived
    #[error("Request failed: {0}")]
    Transport(String),

    /// Response body could not be decoded
    #[error("Response parsing failed: {0}")]
    Decode(String),

    /// The owning surface cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Input rejected locally, no request was made
    #[error("{0}")]
    Validation(String),

    /// Success status, but the body lacks a usable identity or URL
    #[error("{0}")]
    MalformedResponse(String),

    /// Every candidate endpoint answered 404/405
    #[error("No {resource} endpoint available")]
    NoEndpointAvailable {
        /// What was being looked up or created
        resource: &'static str,
    },

    /// Nothing usable was found for the resource
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    /// HTTP status, when the backend answered
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 404/405: the route is not implemented here, try the next candidate
    #[must_use]
    pub const fn is_not_supported(&self) -> bool {
        matches!(self.status(), Some(404 | 405))
    }

    /// Whether the request was cancelled by its owner
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Best-effort human-readable message
    ///
    /// Looks through the response body (a bare string, then `errorMessage`,
    /// `message`, `error`, `title`, `detail`, then the first entry of an
    /// `errors` map), then the locally produced message, then `fallback`.
    #[must_use]
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Status { body, .. } => body_message(body).unwrap_or_else(|| fallback.to_string()),
            Self::Validation(message) | Self::MalformedResponse(message) | Self::NotFound(message) => {
                non_empty(message).unwrap_or_else(|| fallback.to_string())
            },
            Self::Transport(message) => non_empty(message).unwrap_or_else(|| fallback.to_string()),
            Self::NoEndpointAvailable { .. } => self.to_string(),
            Self::Decode(_) | Self::Cancelled => fallback.to_string(),
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Extract a message from the shapes error bodies come in
#[must_use]
pub fn body_message(body: &Value) -> Option<String> {
    if let Value::String(text) = body {
        return non_empty(text);
    }

    let object = body.as_object()?;

    for key in ["errorMessage", "message", "error", "title", "detail"] {
        if let Some(message) = object.get(key).and_then(Value::as_str).and_then(non_empty) {
            return Some(message);
        }
    }

    let (_, first) = object.get("errors")?.as_object()?.iter().next()?;
    match first {
        Value::Array(items) => items.first().and_then(Value::as_str).and_then(non_empty),
        Value::String(text) => non_empty(text),
        _ => None,
    }
}
