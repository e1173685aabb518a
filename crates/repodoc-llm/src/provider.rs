use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LlmError, Result};

/// Whether texts are embedded for storage or for lookup.
///
/// Asymmetric embedding models (Voyage) encode the two differently; symmetric
/// ones ignore the distinction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedMode {
    Document,
    Query,
}

impl EmbedMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Query => "query",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 8192,
        }
    }
}

pub trait LlmProvider: Send + Sync {
    /// Generate a completion for a single user prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the credential, fails to respond,
    /// or does not support text generation.
    fn generate(
        &self,
        prompt: &str,
        params: GenerationParams,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Embed a batch of texts, returning one vector per input in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails, does not support embeddings, or
    /// returns a different number of vectors than texts.
    fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbedMode,
    ) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;

    /// Whether `embed_batch` can succeed: a model is configured and a credential is present.
    fn supports_embeddings(&self) -> bool;

    fn name(&self) -> &str;
}

/// Bound a collaborator call by `limit`, mapping expiry to [`LlmError::Timeout`].
///
/// # Errors
///
/// Returns the inner error, or `LlmError::Timeout` if `limit` elapses first.
pub async fn with_timeout<T, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if let Ok(result) = tokio::time::timeout(limit, fut).await {
        result
    } else {
        tracing::warn!(
            operation,
            timeout_secs = limit.as_secs_f64(),
            "collaborator call timed out"
        );
        Err(LlmError::Timeout {
            operation,
            after: limit,
        })
    }
}

/// Check that a provider answered with exactly one vector per input text.
pub(crate) fn ensure_batch_len(
    provider: &str,
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>> {
    if vectors.len() == expected {
        Ok(vectors)
    } else {
        Err(LlmError::Other(format!(
            "{provider} returned {} embeddings for {expected} inputs",
            vectors.len()
        )))
    }
}
