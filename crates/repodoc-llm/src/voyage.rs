use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LlmError, Result};
use crate::http::check_status;
use crate::provider::{EmbedMode, GenerationParams, LlmProvider, ensure_batch_len};
use crate::retry::send_with_retry;

pub const DEFAULT_BASE_URL: &str = "https://api.voyageai.com/v1";

/// Voyage embeddings backend. Passes [`EmbedMode`] through as `input_type`.
#[derive(Clone)]
pub struct VoyageProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl fmt::Debug for VoyageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoyageProvider")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl VoyageProvider {
    #[must_use]
    pub fn new(api_key: String, mut base_url: String, model: String) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: crate::http::default_client(),
            api_key,
            base_url,
            model,
            max_retries: 0,
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl LlmProvider for VoyageProvider {
    async fn generate(&self, _prompt: &str, _params: GenerationParams) -> Result<String> {
        Err(LlmError::GenerateUnsupported {
            provider: "voyage".into(),
        })
    }

    async fn embed_batch(&self, texts: &[String], mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        if self.api_key.is_empty() {
            return Err(LlmError::Auth {
                provider: "voyage".into(),
                status: 401,
            });
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            input: texts,
            model: &self.model,
            input_type: mode.as_str(),
        };
        let url = format!("{}/embeddings", self.base_url);
        tracing::debug!(count = texts.len(), mode = mode.as_str(), "voyage embed request");

        let response = send_with_retry("voyage", self.max_retries, || {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;
        check_status("voyage", status, &text)?;

        let mut resp: EmbeddingResponse = serde_json::from_str(&text)?;
        if resp.data.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: "voyage".into(),
            });
        }
        resp.data.sort_by_key(|d| d.index);
        ensure_batch_len(
            "voyage",
            texts.len(),
            resp.data.into_iter().map(|d| d.embedding).collect(),
        )
    }

    fn supports_embeddings(&self) -> bool {
        !self.api_key.is_empty()
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "voyage"
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    input_type: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}
