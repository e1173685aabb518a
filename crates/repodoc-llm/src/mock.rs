//! Deterministic in-process provider for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{LlmError, Result};
use crate::provider::{EmbedMode, GenerationParams, LlmProvider};

/// Embeds text as a hashed bag of words so that texts sharing tokens land
/// close together, and answers prompts from a scripted queue.
#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    embed_calls: Arc<AtomicUsize>,
    overrides: HashMap<String, Vec<f32>>,
    pub default_response: String,
    pub dimension: usize,
    pub supports_embeddings: bool,
    pub fail_generate: bool,
    pub fail_embed: bool,
    /// Milliseconds to sleep before answering either call.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            overrides: HashMap::new(),
            default_response: "mock response".into(),
            dimension: 16,
            supports_embeddings: true,
            fail_generate: false,
            fail_embed: false,
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_generate: true,
            fail_embed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn without_embeddings(mut self) -> Self {
        self.supports_embeddings = false;
        self
    }

    /// Pin the vector returned for an exact text.
    #[must_use]
    pub fn with_embedding(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.overrides.insert(text.into(), vector);
        self
    }

    /// Prompts passed to `generate`, oldest first.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of `embed_batch` calls that reached the provider.
    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Hashed bag-of-words embedding, L2-normalized. Empty text maps to the zero vector.
    #[must_use]
    pub fn hash_embedding(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension.max(1)];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let hash = fnv1a(token.as_bytes());
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }

    async fn pause(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

impl LlmProvider for MockProvider {
    async fn generate(&self, prompt: &str, _params: GenerationParams) -> Result<String> {
        self.pause().await;
        self.prompts.lock().unwrap().push(prompt.to_owned());
        if self.fail_generate {
            return Err(LlmError::Service {
                provider: "mock".into(),
                status: 503,
            });
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed_batch(&self, texts: &[String], _mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        self.pause().await;
        if !self.supports_embeddings {
            return Err(LlmError::EmbedUnsupported {
                provider: "mock".into(),
            });
        }
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(LlmError::Service {
                provider: "mock".into(),
                status: 503,
            });
        }
        Ok(texts
            .iter()
            .map(|t| {
                self.overrides
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| self.hash_embedding(t))
            })
            .collect())
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responses_are_consumed_in_order() {
        let p = MockProvider::with_responses(vec!["one".into(), "two".into()]);
        let params = GenerationParams::default();
        assert_eq!(p.generate("a", params).await.unwrap(), "one");
        assert_eq!(p.generate("b", params).await.unwrap(), "two");
        assert_eq!(p.generate("c", params).await.unwrap(), "mock response");
        assert_eq!(p.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn hash_embedding_is_deterministic_and_normalized() {
        let p = MockProvider::default();
        let a = p.hash_embedding("cat mat");
        assert_eq!(a, p.hash_embedding("cat mat"));
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(p.hash_embedding("").iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn overrides_take_precedence() {
        let p = MockProvider::default()
            .with_dimension(2)
            .with_embedding("x", vec![3.0, 4.0]);
        let out = p
            .embed_batch(&["x".to_owned(), "y".to_owned()], EmbedMode::Document)
            .await
            .unwrap();
        assert_eq!(out[0], vec![3.0, 4.0]);
        assert_eq!(out[1].len(), 2);
        assert_eq!(p.embed_calls(), 1);
    }

    #[tokio::test]
    async fn failing_provider_errors() {
        let p = MockProvider::failing();
        assert!(p.generate("q", GenerationParams::default()).await.is_err());
        assert!(p.embed_batch(&[], EmbedMode::Query).await.is_err());
    }

    #[tokio::test]
    async fn without_embeddings_is_unsupported() {
        let p = MockProvider::default().without_embeddings();
        assert!(!p.supports_embeddings());
        let err = p.embed_batch(&[], EmbedMode::Query).await.unwrap_err();
        assert!(matches!(err, LlmError::EmbedUnsupported { .. }));
    }
}
