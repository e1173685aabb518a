use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LlmError, Result};
use crate::http::check_status;
use crate::provider::{EmbedMode, GenerationParams, LlmProvider, ensure_batch_len};
use crate::retry::send_with_retry;

/// OpenAI-compatible backend: `/chat/completions` for generation and
/// `/embeddings` for vectors.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: Option<String>,
    max_retries: u32,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(
        api_key: String,
        mut base_url: String,
        model: String,
        embedding_model: Option<String>,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: crate::http::default_client(),
            api_key,
            base_url,
            model,
            embedding_model,
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

    async fn post<B: Serialize + Sync>(&self, endpoint: &str, body: &B) -> Result<String> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = send_with_retry("openai", self.max_retries, || {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(body)
                .send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;
        check_status("openai", status, &text)?;
        Ok(text)
    }
}

impl LlmProvider for OpenAiProvider {
    async fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(LlmError::Auth {
                provider: "openai".into(),
                status: 401,
            });
        }
        let messages = [ApiMessage {
            role: "user",
            content: prompt,
        }];
        let body = ChatRequest {
            model: &self.model,
            messages: &messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let text = self.post("chat/completions", &body).await?;
        let resp: ChatResponse = serde_json::from_str(&text)?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse {
                provider: "openai".into(),
            })
    }

    async fn embed_batch(&self, texts: &[String], _mode: EmbedMode) -> Result<Vec<Vec<f32>>> {
        let model = self
            .embedding_model
            .as_deref()
            .ok_or(LlmError::EmbedUnsupported {
                provider: "openai".into(),
            })?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            input: texts,
            model,
        };
        let text = self.post("embeddings", &body).await?;
        let mut resp: EmbeddingResponse = serde_json::from_str(&text)?;
        resp.data.sort_by_key(|d| d.index);

        ensure_batch_len(
            "openai",
            texts.len(),
            resp.data.into_iter().map(|d| d.embedding).collect(),
        )
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding_model.is_some() && !self.api_key.is_empty()
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage<'a>],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
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

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_provider() -> OpenAiProvider {
        OpenAiProvider::new(
            "sk-test-key".into(),
            "https://api.openai.com/v1".into(),
            "gpt-4o".into(),
            Some("text-embedding-3-small".into()),
        )
    }

    fn provider_at(uri: &str) -> OpenAiProvider {
        OpenAiProvider::new(
            "sk-test-key".into(),
            uri.into(),
            "gpt-4o".into(),
            Some("text-embedding-3-small".into()),
        )
    }

    #[test]
    fn debug_redacts_api_key() {
        let debug = format!("{:?}", test_provider());
        assert!(!debug.contains("sk-test-key"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        let p = OpenAiProvider::new("k".into(), "https://api.openai.com/v1//".into(), "m".into(), None);
        assert_eq!(p.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn supports_embeddings_requires_model_and_key() {
        assert!(test_provider().supports_embeddings());
        let no_model = OpenAiProvider::new("k".into(), "u".into(), "m".into(), None);
        assert!(!no_model.supports_embeddings());
        let no_key = OpenAiProvider::new(String::new(), "u".into(), "m".into(), Some("e".into()));
        assert!(!no_key.supports_embeddings());
    }

    #[test]
    fn chat_request_serialization() {
        let messages = [ApiMessage {
            role: "user",
            content: "hello",
        }];
        let body = ChatRequest {
            model: "gpt-4o",
            messages: &messages,
            temperature: 0.5,
            max_tokens: 64,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 64);
    }

    #[tokio::test]
    async fn generate_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test-key"))
            .and(body_partial_json(json!({"model": "gpt-4o", "max_tokens": 32})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "It adds numbers."}}]
            })))
            .mount(&server)
            .await;

        let params = GenerationParams {
            temperature: 0.1,
            max_tokens: 32,
        };
        let answer = provider_at(&server.uri())
            .generate("What does add do?", params)
            .await
            .unwrap();
        assert_eq!(answer, "It adds numbers.");
    }

    #[tokio::test]
    async fn generate_empty_choices_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = provider_at(&server.uri())
            .generate("q", GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn generate_unauthorized_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = provider_at(&server.uri())
            .generate("q", GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Auth { status: 401, .. }));
    }

    #[tokio::test]
    async fn generate_without_key_fails_before_request() {
        let p = OpenAiProvider::new(String::new(), "http://127.0.0.1:1".into(), "m".into(), None);
        let err = p.generate("q", GenerationParams::default()).await.unwrap_err();
        assert!(matches!(err, LlmError::Auth { .. }));
    }

    #[tokio::test]
    async fn embed_batch_orders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({"input": ["a", "b"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let vectors = provider_at(&server.uri())
            .embed_batch(&["a".to_owned(), "b".to_owned()], EmbedMode::Document)
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn embed_batch_count_mismatch_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [1.0]}]
            })))
            .mount(&server)
            .await;

        let result = provider_at(&server.uri())
            .embed_batch(&["a".to_owned(), "b".to_owned()], EmbedMode::Document)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn embed_without_model_returns_error() {
        let p = OpenAiProvider::new("k".into(), "http://127.0.0.1:1".into(), "m".into(), None);
        let err = p
            .embed_batch(&["x".to_owned()], EmbedMode::Query)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("embedding not supported"));
    }

    #[tokio::test]
    async fn embed_unreachable_endpoint_errors() {
        let p = provider_at("http://127.0.0.1:1");
        assert!(
            p.embed_batch(&["x".to_owned()], EmbedMode::Query)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    #[ignore = "requires OPENAI_API_KEY env var"]
    async fn integration_openai_generate() {
        let api_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set");
        let provider = OpenAiProvider::new(
            api_key,
            "https://api.openai.com/v1".into(),
            "gpt-4o-mini".into(),
            None,
        );
        let params = GenerationParams {
            temperature: 0.0,
            max_tokens: 16,
        };
        let answer = provider.generate("Reply with the word pong.", params).await.unwrap();
        assert!(!answer.is_empty());
    }
}
