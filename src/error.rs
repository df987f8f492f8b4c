//! Error types for image editing.

use std::time::Duration;

/// Maximum length of an API error body kept in error messages.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while editing images.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// API key missing or invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Delay suggested by the `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// Request timed out.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Billing is not enabled for the API key.
    #[error("billing error: {0}")]
    Billing(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Uploaded file rejected (wrong type or too large).
    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    /// The model answered without an image.
    #[error("No image returned from API")]
    NoImage,

    /// A prompt is already being processed.
    #[error("a request is already in progress")]
    Busy,

    /// Response did not have the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data or a data URL.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., reading an upload or saving an image).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EditorError {
    /// Returns true if this error is likely transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_)
        )
    }

    /// Returns the suggested retry delay, if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            Self::Timeout(_) => Some(Duration::from_secs(1)),
            Self::Network(_) => Some(Duration::from_secs(2)),
            _ => None,
        }
    }
}

/// Result type alias for image editing operations.
pub type Result<T> = std::result::Result<T, EditorError>;

/// Trims an API error body for display and redacts anything that looks like a key.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let redacted: String = text
        .split_inclusive(|c: char| c.is_whitespace() || c == '"' || c == '=' || c == '&')
        .map(|token| {
            let word = token.trim_end_matches(|c: char| {
                c.is_whitespace() || c == '"' || c == '=' || c == '&'
            });
            if word.starts_with("AIza") && word.len() >= 30 {
                token.replacen(word, "[REDACTED]", 1)
            } else {
                token.to_string()
            }
        })
        .collect();

    let trimmed = redacted.trim();
    if trimmed.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let cut: String = trimmed.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}

/// Reads a `Retry-After` header expressed in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
