//! Error types for repodoc-index.

/// Errors raised while building, querying or persisting an index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A required credential or setting is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Caller supplied an out-of-contract value; state is unchanged.
    #[error("validation error: {0}")]
    Validation(String),

    /// Store and indices disagree, or persisted artifacts do not belong together.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Embedding collaborator failure.
    #[error("LLM error: {0}")]
    Llm(#[from] repodoc_llm::LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
