//! Canonical chunk storage plus the embedding index it feeds.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use repodoc_llm::{EmbedMode, LlmProvider, with_timeout};
use serde::Serialize;

use crate::chunk::Chunk;
use crate::embedding::{DistanceMetric, EmbeddingIndex, similarity};
use crate::error::{IndexError, Result};
use crate::persist::{self, Snapshot};

/// Store construction settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Embedding model name, recorded in stats and persisted manifests.
    pub model: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    /// Upper bound for each embedding call.
    pub embed_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            model: "voyage-3".into(),
            dimension: 1024,
            metric: DistanceMetric::Euclidean,
            embed_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_documents: usize,
    pub index_size: usize,
    pub dimension: usize,
    pub model: String,
}

/// A slot in the embedding index with its distance-derived similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemanticHit {
    pub slot: usize,
    pub similarity: f32,
}

/// Owns every chunk, the id to slot mapping and the embedding index.
///
/// Slots are handed out in insertion order and never reused until [`clear`](Self::clear).
pub struct DocumentStore<P: LlmProvider> {
    provider: Arc<P>,
    config: StoreConfig,
    chunks: HashMap<String, Chunk>,
    slots: Vec<String>,
    id_to_slot: HashMap<String, usize>,
    vectors: EmbeddingIndex,
}

impl<P: LlmProvider> DocumentStore<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, config: StoreConfig) -> Self {
        let vectors = EmbeddingIndex::new(config.dimension, config.metric);
        Self {
            provider,
            config,
            chunks: HashMap::new(),
            slots: Vec::new(),
            id_to_slot: HashMap::new(),
            vectors,
        }
    }

    /// Embed `chunks` in one batch call and store them.
    ///
    /// Nothing is stored unless the whole batch embeds successfully.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the provider cannot embed (no credential or model).
    /// - `Validation` on duplicate ids or wrong-dimension vectors.
    /// - `Consistency` if the provider returns the wrong number of vectors.
    /// - `Llm` if the embedding call fails or times out.
    pub async fn put(&mut self, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        if !self.provider.supports_embeddings() {
            return Err(IndexError::Configuration(format!(
                "embedding provider {} has no credential or model configured",
                self.provider.name()
            )));
        }
        self.check_new_ids(&chunks)?;

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        tracing::info!(count = texts.len(), model = %self.config.model, "embedding chunks");
        let embeddings = with_timeout(
            "embed",
            self.config.embed_timeout,
            self.provider.embed_batch(&texts, EmbedMode::Document),
        )
        .await?;

        if embeddings.len() != chunks.len() {
            return Err(IndexError::Consistency(format!(
                "embedding provider returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        self.vectors.check_dimensions(&embeddings)?;

        let slots = self.vectors.add(&embeddings)?;
        for ((mut chunk, embedding), slot) in chunks.into_iter().zip(embeddings).zip(slots) {
            chunk.embedding = Some(embedding);
            self.slots.push(chunk.id.clone());
            self.id_to_slot.insert(chunk.id.clone(), slot);
            self.chunks.insert(chunk.id.clone(), chunk);
        }

        let added = texts.len();
        tracing::info!(added, total = self.len(), "chunks stored");
        Ok(added)
    }

    fn check_new_ids(&self, chunks: &[Chunk]) -> Result<()> {
        let mut seen = HashSet::with_capacity(chunks.len());
        for chunk in chunks {
            if self.chunks.contains_key(&chunk.id) {
                return Err(IndexError::Validation(format!(
                    "chunk id {:?} is already stored",
                    chunk.id
                )));
            }
            if !seen.insert(chunk.id.as_str()) {
                return Err(IndexError::Validation(format!(
                    "chunk id {:?} appears twice in the batch",
                    chunk.id
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    #[must_use]
    pub fn slot_of(&self, id: &str) -> Option<usize> {
        self.id_to_slot.get(id).copied()
    }

    #[must_use]
    pub fn id_at(&self, slot: usize) -> Option<&str> {
        self.slots.get(slot).map(String::as_str)
    }

    #[must_use]
    pub fn chunk_at(&self, slot: usize) -> Option<&Chunk> {
        self.id_at(slot).and_then(|id| self.chunks.get(id))
    }

    /// Stored chunks, oldest first.
    pub fn chunks_in_slot_order(&self) -> impl Iterator<Item = &Chunk> {
        self.slots.iter().filter_map(|id| self.chunks.get(id))
    }

    /// Drop every chunk, the slot mapping and all vectors together.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.slots.clear();
        self.id_to_slot.clear();
        self.vectors.reset();
        tracing::info!("document store cleared");
    }

    /// Embed `query` in query mode.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the provider cannot embed, or `Llm` on failure.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if !self.provider.supports_embeddings() {
            return Err(IndexError::Configuration(format!(
                "embedding provider {} has no credential or model configured",
                self.provider.name()
            )));
        }
        let texts = [query.to_owned()];
        let mut vectors = with_timeout(
            "embed",
            self.config.embed_timeout,
            self.provider.embed_batch(&texts, EmbedMode::Query),
        )
        .await?;
        vectors.pop().ok_or_else(|| {
            IndexError::Consistency("embedding provider returned no query vector".into())
        })
    }

    /// The `k` slots nearest to `query`. An empty store answers without calling the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query fails or its dimension is wrong.
    pub async fn semantic_search(&self, query: &str, k: usize) -> Result<Vec<SemanticHit>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embed_query(query).await?;
        let hits = self.vectors.search(&query_vector, k)?;
        Ok(hits
            .into_iter()
            .map(|n| SemanticHit {
                slot: n.position,
                similarity: similarity(n.distance),
            })
            .collect())
    }

    /// Write the vector blob, the chunk mapping and a manifest into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if any artifact cannot be written.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        let mut documents = std::collections::BTreeMap::new();
        for (id, chunk) in &self.chunks {
            let mut stripped = chunk.clone();
            stripped.embedding = None;
            documents.insert(id.clone(), stripped);
        }
        let id_to_slot = self
            .id_to_slot
            .iter()
            .map(|(id, slot)| (id.clone(), *slot))
            .collect();
        persist::write(
            dir,
            &self.config.model,
            &self.vectors,
            &persist::Mapping {
                documents,
                id_to_slot,
            },
        )?;
        tracing::info!(path = %dir.display(), documents = self.len(), "index persisted");
        Ok(())
    }

    /// Replace the current state with the index saved in `dir`.
    ///
    /// The current state is untouched if anything fails to load or verify.
    ///
    /// # Errors
    ///
    /// Returns `Consistency` if the manifest is missing, an artifact does not match
    /// its digest, the dimension differs from this store's, or the mapping and the
    /// vectors disagree.
    pub fn restore(&mut self, dir: &Path) -> Result<()> {
        let Snapshot {
            model,
            vectors,
            slots,
            mut documents,
        } = persist::read(dir, self.config.dimension)?;

        if model != self.config.model {
            tracing::warn!(
                saved = %model,
                configured = %self.config.model,
                "restored index was embedded with a different model"
            );
        }
        if vectors.metric() != self.config.metric {
            tracing::warn!(
                saved = ?vectors.metric(),
                configured = ?self.config.metric,
                "using the distance metric recorded in the manifest"
            );
        }

        let mut chunks = HashMap::with_capacity(slots.len());
        let mut id_to_slot = HashMap::with_capacity(slots.len());
        for (slot, id) in slots.iter().enumerate() {
            let mut chunk = documents.remove(id).ok_or_else(|| {
                IndexError::Consistency(format!("slot {slot} refers to unknown chunk {id:?}"))
            })?;
            chunk.embedding = vectors.vector(slot).map(<[f32]>::to_vec);
            id_to_slot.insert(id.clone(), slot);
            chunks.insert(id.clone(), chunk);
        }

        self.config.metric = vectors.metric();
        self.chunks = chunks;
        self.slots = slots;
        self.id_to_slot = id_to_slot;
        self.vectors = vectors;
        tracing::info!(path = %dir.display(), documents = self.len(), "index restored");
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            total_documents: self.chunks.len(),
            index_size: self.vectors.len(),
            dimension: self.config.dimension,
            model: self.config.model.clone(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }
}
