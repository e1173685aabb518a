//! Retrieval-augmented question answering over an indexed repository.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use repodoc_index::{HybridRetriever, ScoredChunk};
use repodoc_llm::{GenerationParams, LlmProvider, with_timeout};
use serde::Serialize;

use crate::error::QaError;

pub const NO_CONTEXT_ANSWER: &str = "I don't have enough information to answer this question.";

/// Provenance for one chunk that grounded an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub file: String,
    pub line_range: String,
    #[serde(rename = "type")]
    pub element_type: String,
    pub relevance: f32,
    pub preview: String,
}

impl From<&ScoredChunk> for Source {
    fn from(hit: &ScoredChunk) -> Self {
        let chunk = &hit.chunk;
        Self {
            file: chunk.meta("file_path").unwrap_or("Unknown").to_owned(),
            line_range: chunk.meta("line_range").unwrap_or("N/A").to_owned(),
            element_type: chunk.meta("element_type").unwrap_or("code").to_owned(),
            relevance: hit.score,
            preview: chunk.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
    /// Blended score of the top-ranked chunk; 0 when nothing was retrieved or the call failed.
    pub confidence: f32,
}

impl QaAnswer {
    fn empty(answer: String) -> Self {
        Self {
            answer,
            sources: Vec::new(),
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Copy)]
pub struct QaSettings {
    pub top_k: usize,
    pub generation: GenerationParams,
    pub generation_timeout: Duration,
}

impl Default for QaSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            generation: GenerationParams::default(),
            generation_timeout: Duration::from_secs(120),
        }
    }
}

/// Render retrieved chunks as numbered source blocks for the prompt.
#[must_use]
pub fn build_context(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let chunk = &hit.chunk;
            let mut block = format!(
                "[Source {}] File: {}",
                i + 1,
                chunk.meta("file_path").unwrap_or("Unknown")
            );
            if let Some(lines) = chunk.meta("line_range") {
                let _ = write!(block, " (lines {lines})");
            }
            let _ = write!(block, "\n{}\n", chunk.content);
            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[must_use]
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a helpful assistant analyzing a code repository. \
Answer the user's question based on the provided context from the repository.

Context from repository:
{context}

User Question: {question}

Instructions:
1. Answer the question based ONLY on the provided context
2. If the context doesn't contain enough information, say so
3. Reference specific files and line numbers when relevant
4. Be concise but complete
5. If asked about code location, cite the file and lines
6. If asked about functionality, explain what the code does

Answer:"
    )
}

/// Answers questions from chunks found by a [`HybridRetriever`].
///
/// `P` embeds queries for retrieval; `G` generates the answer text.
pub struct QaBot<P: LlmProvider, G: LlmProvider> {
    retriever: HybridRetriever<P>,
    generator: Arc<G>,
    settings: QaSettings,
    history: Vec<Exchange>,
}

impl<P: LlmProvider, G: LlmProvider> QaBot<P, G> {
    #[must_use]
    pub fn new(retriever: HybridRetriever<P>, generator: Arc<G>, settings: QaSettings) -> Self {
        Self {
            retriever,
            generator,
            settings,
            history: Vec::new(),
        }
    }

    pub async fn query(&mut self, question: &str) -> QaAnswer {
        self.query_with_top_k(question, self.settings.top_k).await
    }

    /// Answer `question` from the `top_k` best chunks.
    ///
    /// Never fails: collaborator errors become an `"Error: ..."` answer with no sources.
    pub async fn query_with_top_k(&mut self, question: &str, top_k: usize) -> QaAnswer {
        match self.answer(question, top_k).await {
            Ok(Some((answer, results))) => {
                self.history.push(Exchange {
                    question: question.to_owned(),
                    answer: answer.clone(),
                });
                QaAnswer {
                    answer,
                    sources: results.iter().map(Source::from).collect(),
                    confidence: results.first().map_or(0.0, |r| r.score),
                }
            }
            Ok(None) => QaAnswer::empty(NO_CONTEXT_ANSWER.to_owned()),
            Err(e) => {
                tracing::error!("failed to answer question: {e:#}");
                QaAnswer::empty(format!("Error: {e}"))
            }
        }
    }

    async fn answer(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<Option<(String, Vec<ScoredChunk>)>, QaError> {
        let results = self.retriever.search(question, top_k).await?;
        if results.is_empty() {
            tracing::info!("no chunks retrieved, answering without generation");
            return Ok(None);
        }

        let prompt = build_prompt(question, &build_context(&results));
        tracing::info!(
            sources = results.len(),
            prompt_chars = prompt.len(),
            generator = self.generator.name(),
            "generating answer"
        );
        let answer = with_timeout(
            "generate",
            self.settings.generation_timeout,
            self.generator.generate(&prompt, self.settings.generation),
        )
        .await?;
        Ok(Some((answer, results)))
    }

    #[must_use]
    pub fn history(&self) -> &[Exchange] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    #[must_use]
    pub fn retriever(&self) -> &HybridRetriever<P> {
        &self.retriever
    }

    #[must_use]
    pub fn settings(&self) -> &QaSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use repodoc_index::{Chunk, DistanceMetric, DocumentStore, StoreConfig};
    use repodoc_llm::mock::MockProvider;

    use super::*;

    fn retriever(embedder: MockProvider) -> HybridRetriever<MockProvider> {
        let config = StoreConfig {
            model: "mock".into(),
            dimension: embedder.dimension,
            metric: DistanceMetric::Euclidean,
            embed_timeout: Duration::from_secs(5),
        };
        HybridRetriever::new(DocumentStore::new(Arc::new(embedder), config), 0.5).unwrap()
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            Chunk::new("1", "def calculate_sum(a, b): return a + b")
                .with_metadata("file_path", "src/math_utils.py")
                .with_metadata("line_range", "1-3")
                .with_metadata("element_type", "function"),
            Chunk::new("2", "class UserManager: create_user stores a new user")
                .with_metadata("file_path", "src/models/user.py")
                .with_metadata("line_range", "10-15")
                .with_metadata("element_type", "class"),
            Chunk::new("3", "calculate_sum is used for basic arithmetic"),
        ]
    }

    async fn bot(generator: MockProvider) -> QaBot<MockProvider, MockProvider> {
        let mut r = retriever(MockProvider::default());
        r.index(corpus()).await.unwrap();
        QaBot::new(r, Arc::new(generator), QaSettings::default())
    }

    #[test]
    fn context_blocks_are_numbered() {
        let results = vec![
            ScoredChunk {
                chunk: corpus().remove(0),
                score: 0.9,
            },
            ScoredChunk {
                chunk: corpus().remove(2),
                score: 0.4,
            },
        ];
        assert_eq!(
            build_context(&results),
            "[Source 1] File: src/math_utils.py (lines 1-3)\n\
             def calculate_sum(a, b): return a + b\n\n\
             [Source 2] File: Unknown\n\
             calculate_sum is used for basic arithmetic\n"
        );
    }

    #[test]
    fn prompt_embeds_context_and_question() {
        let prompt = build_prompt("Where is X?", "CTX");
        assert!(prompt.starts_with("You are a helpful assistant analyzing a code repository."));
        assert!(prompt.contains("Context from repository:\nCTX\n\nUser Question: Where is X?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[tokio::test]
    async fn empty_question_returns_canned_answer() {
        let generator = MockProvider::default();
        let mut bot = bot(generator.clone()).await;
        let answer = bot.query("").await;
        assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
        assert!(answer.sources.is_empty());
        assert!(answer.confidence.abs() < f32::EPSILON);
        assert!(generator.prompts().is_empty());
        assert!(bot.history().is_empty());
    }

    #[tokio::test]
    async fn empty_corpus_returns_canned_answer() {
        let generator = MockProvider::default();
        let mut bot = QaBot::new(
            retriever(MockProvider::default()),
            Arc::new(generator.clone()),
            QaSettings::default(),
        );
        assert!(bot.retriever().store().is_empty());
        assert_eq!(bot.settings().top_k, 5);
        let answer = bot.query("what does calculate_sum do?").await;
        assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn answer_carries_sources_and_confidence() {
        let generator = MockProvider::with_responses(vec!["It adds two numbers.".into()]);
        let mut bot = bot(generator.clone()).await;
        let answer = bot.query_with_top_k("calculate_sum", 2).await;

        assert_eq!(answer.answer, "It adds two numbers.");
        assert_eq!(answer.sources.len(), 2);
        assert!((answer.confidence - answer.sources[0].relevance).abs() < f32::EPSILON);
        assert!(answer.confidence > 0.0);

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("[Source 1] File: "));
        assert!(prompts[0].contains("User Question: calculate_sum"));

        assert_eq!(
            bot.history(),
            [Exchange {
                question: "calculate_sum".into(),
                answer: "It adds two numbers.".into(),
            }]
        );
    }

    #[tokio::test]
    async fn sources_fill_missing_metadata_with_defaults() {
        let hit = ScoredChunk {
            chunk: Chunk::new("x", "body"),
            score: 0.25,
        };
        let source = Source::from(&hit);
        assert_eq!(source.file, "Unknown");
        assert_eq!(source.line_range, "N/A");
        assert_eq!(source.element_type, "code");
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["type"], "code");
    }

    #[tokio::test]
    async fn generation_failure_becomes_error_answer() {
        let mut bot = bot(MockProvider::failing()).await;
        let answer = bot.query("calculate_sum").await;
        assert!(answer.answer.starts_with("Error: "));
        assert!(answer.sources.is_empty());
        assert!(answer.confidence.abs() < f32::EPSILON);
        assert!(bot.history().is_empty());
    }

    #[tokio::test]
    async fn generation_timeout_becomes_error_answer() {
        let mut r = retriever(MockProvider::default());
        r.index(corpus()).await.unwrap();
        let settings = QaSettings {
            generation_timeout: Duration::from_millis(20),
            ..QaSettings::default()
        };
        let mut bot = QaBot::new(r, Arc::new(MockProvider::default().with_delay(500)), settings);
        let answer = bot.query("calculate_sum").await;
        assert!(answer.answer.contains("timed out"));
    }

    #[tokio::test]
    async fn retrieval_failure_becomes_error_answer() {
        let dir = tempfile::tempdir().unwrap();
        let mut healthy = retriever(MockProvider::default());
        healthy.index(corpus()).await.unwrap();
        healthy.persist(dir.path()).unwrap();

        let mut broken = retriever(MockProvider::failing());
        broken.restore(dir.path()).unwrap();
        let generator = MockProvider::default();
        let mut bot = QaBot::new(broken, Arc::new(generator.clone()), QaSettings::default());

        let answer = bot.query("calculate_sum").await;
        assert!(answer.answer.starts_with("Error: "));
        assert!(answer.sources.is_empty());
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn clear_history_forgets_exchanges() {
        let mut bot = bot(MockProvider::default()).await;
        bot.query("calculate_sum").await;
        assert_eq!(bot.history().len(), 1);
        bot.clear_history();
        assert!(bot.history().is_empty());
    }
}
