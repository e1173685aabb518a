use std::str::FromStr;

use super::{Config, DistanceMetric, ProviderKind};

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    if let Ok(parsed) = v.trim().parse::<T>() {
        Some(parsed)
    } else {
        tracing::warn!("ignoring invalid {key} value: {v}");
        None
    }
}

fn env_enum<T: serde::de::DeserializeOwned>(key: &str) -> Option<T> {
    let v = std::env::var(key).ok()?;
    if let Ok(parsed) = serde_json::from_value(serde_json::Value::String(v.trim().to_owned())) {
        Some(parsed)
    } else {
        tracing::warn!("ignoring invalid {key} value: {v}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_providers();
        self.apply_env_overrides_index();
    }

    fn apply_env_overrides_providers(&mut self) {
        if let Some(kind) = env_enum::<ProviderKind>("REPODOC_LLM_PROVIDER") {
            self.llm.provider = kind;
        }
        if let Ok(v) = std::env::var("REPODOC_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("REPODOC_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(t) = env_parse::<f32>("REPODOC_LLM_TEMPERATURE") {
            self.llm.temperature = t;
        }
        if let Some(n) = env_parse::<u32>("REPODOC_LLM_MAX_TOKENS") {
            self.llm.max_tokens = n;
        }
        if let Some(n) = env_parse::<u32>("REPODOC_LLM_MAX_RETRIES") {
            self.llm.max_retries = n;
        }

        if let Some(kind) = env_enum::<ProviderKind>("REPODOC_EMBEDDING_PROVIDER") {
            self.embedding.provider = kind;
        }
        if let Ok(v) = std::env::var("REPODOC_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("REPODOC_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(n) = env_parse::<usize>("REPODOC_EMBEDDING_DIMENSION") {
            self.embedding.dimension = n;
        }
        if let Some(metric) = env_enum::<DistanceMetric>("REPODOC_EMBEDDING_METRIC") {
            self.embedding.metric = metric;
        }
        if let Some(n) = env_parse::<u32>("REPODOC_EMBEDDING_MAX_RETRIES") {
            self.embedding.max_retries = n;
        }

        if let Some(secs) = env_parse::<u64>("REPODOC_TIMEOUT_LLM") {
            self.timeouts.llm_seconds = secs;
        }
        if let Some(secs) = env_parse::<u64>("REPODOC_TIMEOUT_EMBEDDING") {
            self.timeouts.embedding_seconds = secs;
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Some(k) = env_parse::<usize>("REPODOC_RETRIEVAL_TOP_K") {
            self.retrieval.top_k = k;
        }
        if let Some(alpha) = env_parse::<f32>("REPODOC_RETRIEVAL_ALPHA") {
            self.retrieval.alpha = alpha;
        }
        if let Ok(v) = std::env::var("REPODOC_INDEX_PATH") {
            self.index.path = v;
        }
        if let Some(n) = env_parse::<usize>("REPODOC_INDEX_MAX_BODY_CHARS") {
            self.index.max_body_chars = n;
        }
        if let Some(n) = env_parse::<usize>("REPODOC_INDEX_MAX_FILE_SIZE_MB") {
            self.index.max_file_size_mb = n;
        }
        if let Ok(v) = std::env::var("REPODOC_INDEX_EXCLUDE_PATTERNS") {
            self.index.exclude_patterns = v
                .split(',')
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
}
