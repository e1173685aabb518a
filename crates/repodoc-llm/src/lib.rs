//! Embedding and text-generation collaborators.
//!
//! Everything the retrieval core needs from a language model goes through
//! [`LlmProvider`]: batched embedding in document or query mode, and single-prompt
//! generation. Remote backends classify failures into [`LlmError`] so callers can
//! tell credential problems from transient ones.

pub mod any;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub(crate) mod retry;
pub mod voyage;

pub use error::{LlmError, Result};
pub use provider::{EmbedMode, GenerationParams, LlmProvider, with_timeout};
