//! Hybrid retrieval: BM25 and embedding scores blended into one ranking.

use std::collections::HashMap;
use std::path::Path;

use repodoc_llm::LlmProvider;

use crate::chunk::{Chunk, ScoredChunk};
use crate::error::{IndexError, Result};
use crate::lexical::{Bm25Params, LexicalIndex};
use crate::store::{DocumentStore, SemanticHit};

/// Semantic candidates fetched per requested result.
const SEMANTIC_OVERFETCH: usize = 2;

fn check_alpha(alpha: f32) -> Result<()> {
    if alpha.is_nan() || !(0.0..=1.0).contains(&alpha) {
        return Err(IndexError::Validation(format!(
            "alpha must be within [0, 1], got {alpha}"
        )));
    }
    Ok(())
}

/// Owns the document store and the lexical index built over the same corpus.
///
/// `alpha` weighs the semantic side: `combined = (1 - alpha) * lexical + alpha * semantic`.
pub struct HybridRetriever<P: LlmProvider> {
    store: DocumentStore<P>,
    lexical: LexicalIndex,
    alpha: f32,
}

impl<P: LlmProvider> HybridRetriever<P> {
    /// Wrap `store`. The lexical index stays unbuilt until the next [`index`](Self::index)
    /// or [`restore`](Self::restore), so a pre-filled store searches semantically only.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `alpha` is outside `[0, 1]`.
    pub fn new(store: DocumentStore<P>, alpha: f32) -> Result<Self> {
        check_alpha(alpha)?;
        Ok(Self {
            store,
            lexical: LexicalIndex::default(),
            alpha,
        })
    }

    #[must_use]
    pub fn with_bm25(mut self, params: Bm25Params) -> Self {
        self.lexical = LexicalIndex::new(params);
        if !self.store.is_empty() {
            self.lexical.build(self.store.chunks_in_slot_order());
        }
        self
    }

    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// # Errors
    ///
    /// Returns `Validation` for NaN or values outside `[0, 1]`; the previous alpha is kept.
    pub fn set_alpha(&mut self, alpha: f32) -> Result<()> {
        check_alpha(alpha)?;
        self.alpha = alpha;
        Ok(())
    }

    /// Store `chunks` and rebuild the lexical index over the whole corpus.
    ///
    /// # Errors
    ///
    /// Propagates any [`DocumentStore::put`] failure; neither index changes then.
    pub async fn index(&mut self, chunks: Vec<Chunk>) -> Result<usize> {
        let added = self.store.put(chunks).await?;
        if added > 0 {
            self.rebuild_lexical();
        }
        Ok(added)
    }

    fn rebuild_lexical(&mut self) {
        if self.store.is_empty() {
            self.lexical.reset();
        } else {
            self.lexical.build(self.store.chunks_in_slot_order());
        }
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.lexical.reset();
    }

    /// # Errors
    ///
    /// Returns an error if the index cannot be written.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        self.store.persist(dir)
    }

    /// Replace the corpus with the one saved in `dir` and rebuild lexical scoring from it.
    ///
    /// # Errors
    ///
    /// Returns `Consistency` for missing or mismatched artifacts; state is unchanged then.
    pub fn restore(&mut self, dir: &Path) -> Result<()> {
        self.store.restore(dir)?;
        self.rebuild_lexical();
        Ok(())
    }

    /// Nearest chunks by embedding alone, scored by similarity.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query fails.
    pub async fn semantic_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let hits = self.store.semantic_search(query, k).await?;
        Ok(self.resolve(hits.into_iter().map(|h| (h.slot, h.similarity))))
    }

    /// Top `top_k` chunks for `query`, best first.
    ///
    /// Equal scores keep slot order, so results are deterministic for a given corpus.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query fails, or `Consistency` if the
    /// lexical index and the store have drifted apart.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() || top_k == 0 || self.store.is_empty() {
            return Ok(Vec::new());
        }
        if !self.lexical.is_built() {
            tracing::debug!("lexical index not built, using semantic search only");
            return self.semantic_search(query, top_k).await;
        }
        if self.lexical.len() != self.store.len() {
            return Err(IndexError::Consistency(format!(
                "lexical index covers {} chunks, store holds {}",
                self.lexical.len(),
                self.store.len()
            )));
        }

        let lexical = self.lexical.normalized_scores(query);
        let semantic: HashMap<usize, f32> = self
            .store
            .semantic_search(query, top_k.saturating_mul(SEMANTIC_OVERFETCH))
            .await?
            .into_iter()
            .map(|SemanticHit { slot, similarity }| (slot, similarity))
            .collect();

        let alpha = self.alpha;
        let mut ranked: Vec<(usize, f32)> = lexical
            .iter()
            .enumerate()
            .map(|(slot, &lex)| {
                let sem = semantic.get(&slot).copied().unwrap_or(0.0);
                (slot, (1.0 - alpha) * lex + alpha * sem)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(top_k);

        tracing::debug!(
            query_len = query.len(),
            semantic_candidates = semantic.len(),
            returned = ranked.len(),
            alpha,
            "hybrid search"
        );
        Ok(self.resolve(ranked))
    }

    fn resolve(&self, ranked: impl IntoIterator<Item = (usize, f32)>) -> Vec<ScoredChunk> {
        ranked
            .into_iter()
            .filter_map(|(slot, score)| {
                let Some(chunk) = self.store.chunk_at(slot) else {
                    tracing::warn!(slot, "ranked slot has no stored chunk, dropping");
                    return None;
                };
                Some(ScoredChunk {
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect()
    }

    #[must_use]
    pub fn store(&self) -> &DocumentStore<P> {
        &self.store
    }

    #[must_use]
    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }
}
