//! Configuration, secret resolution, provider bootstrap and the question-answering
//! orchestrator for repodoc.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod qa;
pub mod vault;

pub use config::Config;
pub use error::QaError;
pub use qa::{QaAnswer, QaBot, Source};
