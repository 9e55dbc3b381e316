// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tally expense pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Tally configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    /// HTTP listener and access settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Analysis model endpoint settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Embedding endpoint settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector memory settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Relational storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Orchestrator behavior.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// HTTP server configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the server to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind the server to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required on `/v1/*` routes. `None` disables the check.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Chat-completions endpoint used for expense analysis.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// API key. `None` falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier.
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Sampling temperature. Kept low so the tool arguments stay well-formed.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on generated tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP timeout for one streaming call.
    #[serde(default = "default_model_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries of the initial request on 429/5xx, before any byte is streamed.
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key: None,
            model: default_chat_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_model_timeout_secs(),
            max_retries: 0,
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    512
}

fn default_model_timeout_secs() -> u64 {
    60
}

/// Embeddings endpoint configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible API (without `/embeddings`).
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// API key. `None` falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Embedding model identifier.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Expected vector dimension; responses of another size are rejected.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// HTTP timeout for one embedding call.
    #[serde(default = "default_embedding_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key: None,
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            request_timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_embedding_timeout_secs() -> u64 {
    10
}

/// Vector memory configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Collection that partitions memory entries inside the store.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Number of similar past expenses fed to the model.
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: usize,

    /// Minimum cosine similarity for a match. `None` relies on the limit only.
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            retrieval_limit: default_retrieval_limit(),
            similarity_threshold: None,
        }
    }
}

fn default_collection() -> String {
    "expenses".to_string()
}

fn default_retrieval_limit() -> usize {
    3
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tally").join("tally.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("tally.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// What to do when embedding or memory search fails before streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalFailurePolicy {
    /// Fail the request before any fragment is produced.
    #[default]
    Abort,
    /// Log a warning and continue with empty history.
    Degrade,
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Closed category vocabulary offered to the model.
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// Roast mode when a request does not say otherwise.
    #[serde(default = "default_roast")]
    pub roast_default: bool,

    /// Retrieval failure handling.
    #[serde(default)]
    pub retrieval_failure: RetrievalFailurePolicy,

    /// Capacity of the fragment channel between model and transport.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Upper bound on the streaming phase of one request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deadline for persisting a parsed analysis.
    #[serde(default = "default_commit_timeout_secs")]
    pub commit_timeout_secs: u64,

    /// Deadline for the detached re-embedding and memory delete tasks.
    #[serde(default = "default_reindex_timeout_secs")]
    pub reindex_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_secs(self.commit_timeout_secs)
    }

    pub fn reindex_timeout(&self) -> Duration {
        Duration::from_secs(self.reindex_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            roast_default: default_roast(),
            retrieval_failure: RetrievalFailurePolicy::default(),
            channel_capacity: default_channel_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
            commit_timeout_secs: default_commit_timeout_secs(),
            reindex_timeout_secs: default_reindex_timeout_secs(),
        }
    }
}

fn default_categories() -> Vec<String> {
    [
        "Food & Dining",
        "Transport",
        "Home & Living",
        "Clothing & Beauty",
        "Entertainment",
        "Electronics",
        "Health & Medical",
        "Gifts & Social",
        "Education",
        "Finance & Insurance",
        "Other",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_roast() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    16
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_commit_timeout_secs() -> u64 {
    10
}

fn default_reindex_timeout_secs() -> u64 {
    10
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = TallyConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.memory.retrieval_limit, 3);
        assert!(config.memory.similarity_threshold.is_none());
        assert_eq!(config.pipeline.retrieval_failure, RetrievalFailurePolicy::Abort);
        assert!(config.pipeline.roast_default);
        assert_eq!(config.pipeline.categories.len(), 11);
        assert_eq!(config.pipeline.reindex_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn retrieval_policy_parses_lowercase() {
        let toml_str = r#"
[pipeline]
retrieval_failure = "degrade"
"#;
        let config: TallyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.pipeline.retrieval_failure,
            RetrievalFailurePolicy::Degrade
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = TallyConfig::default();
        config.server.bearer_token = Some("srv-secret".into());
        config.model.api_key = Some("sk-model".into());
        config.embedding.api_key = Some("sk-embed".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("srv-secret"));
        assert!(!debug.contains("sk-model"));
        assert!(!debug.contains("sk-embed"));
        assert!(debug.contains("[redacted]"));
    }
}
