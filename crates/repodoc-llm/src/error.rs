use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing or rejected credential (HTTP 401/403).
    #[error("{provider} rejected the credential (status {status})")]
    Auth { provider: String, status: u16 },

    #[error("rate limited")]
    RateLimited,

    /// Transient upstream failure (5xx or an unexpected status).
    #[error("{provider} request failed (status {status})")]
    Service { provider: String, status: u16 },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: String },

    #[error("text generation not supported by {provider}")]
    GenerateUnsupported { provider: String },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether a later attempt with the same input may succeed.
    ///
    /// `Service` errors are transient only for 5xx statuses.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited | Self::Timeout { .. } => true,
            Self::Service { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
