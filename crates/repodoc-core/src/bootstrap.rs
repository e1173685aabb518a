//! Application bootstrap: config resolution and provider, retriever and QA construction.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use repodoc_index::document::DocumentBuilder;
use repodoc_index::{DocumentStore, HybridRetriever, StoreConfig};
use repodoc_llm::GenerationParams;
use repodoc_llm::any::AnyProvider;
use repodoc_llm::openai::OpenAiProvider;
use repodoc_llm::voyage::VoyageProvider;

use crate::config::{Config, ProviderKind};
use crate::qa::{QaBot, QaSettings};
use crate::vault::{EnvVaultProvider, VaultProvider};

/// Load the config file, apply env overrides and resolve secrets from the environment.
///
/// # Errors
///
/// Returns an error if the file cannot be parsed or the vault fails.
pub async fn load_config(path: &Path) -> anyhow::Result<Config> {
    load_config_with_vault(path, &EnvVaultProvider).await
}

/// # Errors
///
/// Returns an error if the file cannot be parsed or the vault fails.
pub async fn load_config_with_vault(
    path: &Path,
    vault: &dyn VaultProvider,
) -> anyhow::Result<Config> {
    let mut config = Config::load(path)?;
    config.resolve_secrets(vault).await?;
    Ok(config)
}

fn api_key(config: &Config, kind: ProviderKind) -> anyhow::Result<String> {
    match kind.api_key_env() {
        Some(env) => config
            .secrets
            .for_provider(kind)
            .map(|s| s.expose().to_owned())
            .with_context(|| format!("{env} (or REPODOC_{env}) must be set for the {kind} provider")),
        None => Ok(String::new()),
    }
}

/// Provider used to embed chunks and queries.
///
/// # Errors
///
/// Returns an error if the required API key is missing, or `mock` is selected in a
/// build without the `mock` feature.
pub fn create_embedding_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    let cfg = &config.embedding;
    let key = api_key(config, cfg.provider)?;
    let provider = match cfg.provider {
        ProviderKind::OpenAi => AnyProvider::OpenAi(
            OpenAiProvider::new(
                key,
                cfg.base_url.clone(),
                config.llm.model.clone(),
                Some(cfg.model.clone()),
            )
            .with_max_retries(cfg.max_retries),
        ),
        ProviderKind::Voyage => AnyProvider::Voyage(
            VoyageProvider::new(key, cfg.base_url.clone(), cfg.model.clone())
                .with_max_retries(cfg.max_retries),
        ),
        ProviderKind::Mock => mock_provider(config)?,
    };
    tracing::debug!(provider = %cfg.provider, model = %cfg.model, "embedding provider ready");
    Ok(provider)
}

/// Provider used to generate answers.
///
/// # Errors
///
/// Returns an error if the required API key is missing or the backend cannot generate.
pub fn create_generation_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    let cfg = &config.llm;
    let provider = match cfg.provider {
        ProviderKind::OpenAi => AnyProvider::OpenAi(
            OpenAiProvider::new(
                api_key(config, cfg.provider)?,
                cfg.base_url.clone(),
                cfg.model.clone(),
                None,
            )
            .with_max_retries(cfg.max_retries),
        ),
        ProviderKind::Voyage => bail!("voyage provider cannot generate text; set llm.provider"),
        ProviderKind::Mock => mock_provider(config)?,
    };
    tracing::debug!(provider = %cfg.provider, model = %cfg.model, "generation provider ready");
    Ok(provider)
}

#[cfg(feature = "mock")]
#[allow(clippy::unnecessary_wraps)]
fn mock_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    Ok(AnyProvider::Mock(
        repodoc_llm::mock::MockProvider::default().with_dimension(config.embedding.dimension),
    ))
}

#[cfg(not(feature = "mock"))]
fn mock_provider(_config: &Config) -> anyhow::Result<AnyProvider> {
    bail!("mock provider requires a build with the `mock` feature")
}

#[must_use]
pub fn store_config(config: &Config) -> StoreConfig {
    StoreConfig {
        model: config.embedding.model.clone(),
        dimension: config.embedding.dimension,
        metric: config.embedding.metric,
        embed_timeout: Duration::from_secs(config.timeouts.embedding_seconds),
    }
}

/// # Errors
///
/// Returns an error if an exclusion pattern is not a valid glob.
pub fn document_builder(config: &Config) -> anyhow::Result<DocumentBuilder> {
    DocumentBuilder::new(
        config.index.max_body_chars,
        config.index.max_file_size_mb.saturating_mul(1024 * 1024),
    )
    .with_exclude_patterns(&config.index.exclude_patterns)
    .context("invalid index.exclude_patterns")
}

#[must_use]
pub fn qa_settings(config: &Config) -> QaSettings {
    QaSettings {
        top_k: config.retrieval.top_k,
        generation: GenerationParams {
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        },
        generation_timeout: Duration::from_secs(config.timeouts.llm_seconds),
    }
}

/// Empty retriever wired to the configured embedding provider.
///
/// # Errors
///
/// Returns an error if the provider cannot be built or `retrieval.alpha` is invalid.
pub fn build_retriever(config: &Config) -> anyhow::Result<HybridRetriever<AnyProvider>> {
    let provider = Arc::new(create_embedding_provider(config)?);
    let store = DocumentStore::new(provider, store_config(config));
    HybridRetriever::new(store, config.retrieval.alpha).context("invalid retrieval.alpha")
}

/// Retriever restored from a saved index directory.
///
/// # Errors
///
/// Returns an error if the provider cannot be built or the index fails to restore.
pub fn open_retriever(config: &Config, dir: &Path) -> anyhow::Result<HybridRetriever<AnyProvider>> {
    let mut retriever = build_retriever(config)?;
    retriever
        .restore(dir)
        .with_context(|| format!("failed to load index from {}", dir.display()))?;
    tracing::info!(
        path = %dir.display(),
        documents = retriever.store().len(),
        "index loaded"
    );
    Ok(retriever)
}

/// # Errors
///
/// Returns an error if the generation provider cannot be built.
pub fn build_qa_bot(
    config: &Config,
    retriever: HybridRetriever<AnyProvider>,
) -> anyhow::Result<QaBot<AnyProvider, AnyProvider>> {
    let generator = Arc::new(create_generation_provider(config)?);
    Ok(QaBot::new(retriever, generator, qa_settings(config)))
}
