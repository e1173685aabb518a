//! Chunk storage and hybrid retrieval over a parsed repository.
//!
//! Parsed files become [`Chunk`]s via [`document::DocumentBuilder`]. The
//! [`HybridRetriever`] owns a [`DocumentStore`] (chunks, slot mapping and the exact
//! embedding index) together with a BM25 [`LexicalIndex`] over the same corpus, and
//! ranks chunks by a weighted blend of both normalized scores.

pub mod chunk;
pub mod document;
pub mod embedding;
pub mod error;
pub mod lexical;
pub(crate) mod persist;
pub mod retriever;
pub mod store;

pub use chunk::{Chunk, ScoredChunk};
pub use embedding::{DistanceMetric, EmbeddingIndex};
pub use error::{IndexError, Result};
pub use lexical::{Bm25Params, LexicalIndex};
pub use retriever::HybridRetriever;
pub use store::{DocumentStore, StoreConfig, StoreStats};
