mod env;
mod types;


pub use types::*;

use std::fmt::Write;
use std::path::Path;

use anyhow::Context;
use repodoc_index::document::DocumentBuilder;

use crate::vault::{Secret, VaultProvider};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Resolve API keys through the vault. The `REPODOC_`-prefixed name wins over the plain one.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        self.secrets.openai_api_key = lookup(vault, "OPENAI_API_KEY").await?;
        self.secrets.voyage_api_key = lookup(vault, "VOYAGE_API_KEY").await?;
        Ok(())
    }

    /// Problems that would make indexing or querying fail. Empty means usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (role, kind) in [
            ("llm", self.llm.provider),
            ("embedding", self.embedding.provider),
        ] {
            if let Some(env) = kind.api_key_env()
                && self.secrets.for_provider(kind).is_none()
            {
                problems.push(format!("{role} provider {kind} requires {env} to be set"));
            }
        }
        if self.llm.provider == ProviderKind::Voyage {
            problems.push("llm provider voyage cannot generate text".into());
        }
        if self.retrieval.alpha.is_nan() || !(0.0..=1.0).contains(&self.retrieval.alpha) {
            problems.push(format!(
                "retrieval.alpha must be within [0, 1], got {}",
                self.retrieval.alpha
            ));
        }
        if self.retrieval.top_k == 0 {
            problems.push("retrieval.top_k must be at least 1".into());
        }
        if self.embedding.dimension == 0 {
            problems.push("embedding.dimension must be positive".into());
        }
        let patterns = &self.index.exclude_patterns;
        if let Err(e) = DocumentBuilder::default().with_exclude_patterns(patterns) {
            problems.push(format!("index.exclude_patterns: {e}"));
        }
        problems
    }

    /// Human-readable configuration with secrets shown only as present or absent.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let present = |s: Option<&Secret>| if s.is_some() { "set" } else { "missing" };

        let _ = writeln!(
            out,
            "LLM:        {} {} at {} (temperature {}, max_tokens {})",
            self.llm.provider,
            self.llm.model,
            self.llm.base_url,
            self.llm.temperature,
            self.llm.max_tokens
        );
        let _ = writeln!(
            out,
            "Embedding:  {} {} at {} (dimension {}, metric {:?})",
            self.embedding.provider,
            self.embedding.model,
            self.embedding.base_url,
            self.embedding.dimension,
            self.embedding.metric
        );
        let _ = writeln!(
            out,
            "Retrieval:  top_k {}, alpha {}",
            self.retrieval.top_k, self.retrieval.alpha
        );
        let _ = writeln!(
            out,
            "Index:      {} (max body {} chars, max file {} MB)",
            self.index.path, self.index.max_body_chars, self.index.max_file_size_mb
        );
        let _ = writeln!(
            out,
            "Timeouts:   llm {}s, embedding {}s",
            self.timeouts.llm_seconds, self.timeouts.embedding_seconds
        );
        let _ = writeln!(
            out,
            "Secrets:    OPENAI_API_KEY {}, VOYAGE_API_KEY {}",
            present(self.secrets.openai_api_key.as_ref()),
            present(self.secrets.voyage_api_key.as_ref())
        );
        out
    }
}

async fn lookup(vault: &dyn VaultProvider, name: &str) -> anyhow::Result<Option<Secret>> {
    if let Some(val) = vault.get_secret(&format!("REPODOC_{name}")).await? {
        return Ok(Some(Secret::new(val)));
    }
    Ok(vault.get_secret(name).await?.map(Secret::new))
}
