//! Configuration parsing and validation.
//!
//! emdx is configured via a TOML file (default: `$XDG_CONFIG_HOME/emdx/config.toml`).
//! The config defines database and log paths, chunking parameters, embedding
//! provider settings, retrieval tuning, enrichment toggles, and the execution
//! subsystem's limits. Every field has a default, so a missing config file is
//! equivalent to an empty one.
//!
//! # Environment overrides
//!
//! - `EMDX_CONFIG_DIR` — directory holding `config.toml` (and the database by default)
//! - `EMDX_DB_PATH` — database file location (used by test runs for isolation)
//! - `EMDX_LOG_DIR` — execution log directory

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DbConfig {
    /// Database file path. `EMDX_DB_PATH` wins over this.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Directory for dated backup copies. Defaults to `{config-dir}/backups`.
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    /// Directory for execution logs. `EMDX_LOG_DIR` wins over this.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

fn default_max_tokens() -> usize {
    512
}
fn default_overlap() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Reciprocal Rank Fusion constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: i64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k_keyword: i64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k_vector: i64,
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
    /// Top-K chunks handed to the LLM by `--ask`.
    #[serde(default = "default_ask_context_chunks")]
    pub ask_context_chunks: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            candidate_k_keyword: default_candidate_k(),
            candidate_k_vector: default_candidate_k(),
            final_limit: default_final_limit(),
            ask_context_chunks: default_ask_context_chunks(),
        }
    }
}

fn default_rrf_k() -> i64 {
    60
}
fn default_candidate_k() -> i64 {
    80
}
fn default_final_limit() -> i64 {
    12
}
fn default_ask_context_chunks() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `disabled`, `openai`, or `ollama`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_embedding_dim")]
    pub dim: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dim: default_embedding_dim(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_dim() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_true")]
    pub auto_link_on_save: bool,
    #[serde(default = "default_true")]
    pub title_match: bool,
    #[serde(default = "default_true")]
    pub entities: bool,
    #[serde(default = "default_true")]
    pub semantic: bool,
    #[serde(default = "default_semantic_threshold")]
    pub semantic_link_threshold: f32,
    /// Docs at or below this size are enriched inline; larger ones go to the worker.
    #[serde(default = "default_inline_max_bytes")]
    pub inline_max_bytes: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            auto_link_on_save: true,
            title_match: true,
            entities: true,
            semantic: true,
            semantic_link_threshold: default_semantic_threshold(),
            inline_max_bytes: default_inline_max_bytes(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_semantic_threshold() -> f32 {
    0.78
}
fn default_inline_max_bytes() -> usize {
    2048
}
fn default_queue_capacity() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_seconds: i64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Command invoked for ask/synthesize/wiki. Split on whitespace.
    #[serde(default = "default_llm_command")]
    pub llm_command: String,
    /// Command invoked per delegated agent. Split on whitespace.
    #[serde(default = "default_agent_command")]
    pub agent_command: String,
    #[serde(default = "default_doc_type")]
    pub default_doc_type: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            stale_threshold_seconds: default_stale_threshold(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            llm_command: default_llm_command(),
            agent_command: default_agent_command(),
            default_doc_type: default_doc_type(),
        }
    }
}

fn default_max_concurrency() -> usize {
    5
}
fn default_stale_threshold() -> i64 {
    1800
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_llm_command() -> String {
    "claude --print".to_string()
}
fn default_agent_command() -> String {
    "claude --print".to_string()
}
fn default_doc_type() -> String {
    "user".to_string()
}

impl Config {
    /// Directory holding `config.toml`, the database, and backups.
    pub fn config_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("EMDX_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("emdx")
    }

    /// Resolved database file path (`EMDX_DB_PATH` > config > default).
    pub fn db_path(&self) -> PathBuf {
        if let Ok(p) = std::env::var("EMDX_DB_PATH") {
            return PathBuf::from(p);
        }
        self.db
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("knowledge.db"))
    }

    /// Directory for per-execution log files.
    pub fn log_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var("EMDX_LOG_DIR") {
            return PathBuf::from(dir);
        }
        self.db
            .log_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("logs"))
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.db
            .backup_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("backups"))
    }
}

/// Load config from the default location, falling back to defaults when the
/// file does not exist.
pub fn load_default() -> Result<Config> {
    let path = Config::config_dir().join("config.toml");
    if path.exists() {
        load_config(&path)
    } else {
        Ok(Config::default())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::input(format!("failed to read config {}: {e}", path.display())))?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| Error::input(format!("failed to parse config {}: {e}", path.display())))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        return Err(Error::input("chunking.max_tokens must be > 0"));
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        return Err(Error::input(
            "chunking.overlap_tokens must be smaller than chunking.max_tokens",
        ));
    }
    if config.retrieval.final_limit < 1 {
        return Err(Error::input("retrieval.final_limit must be >= 1"));
    }
    if config.retrieval.rrf_k < 1 {
        return Err(Error::input("retrieval.rrf_k must be >= 1"));
    }
    if !(0.0..=1.0).contains(&config.enrichment.semantic_link_threshold) {
        return Err(Error::input(
            "enrichment.semantic_link_threshold must be in [0.0, 1.0]",
        ));
    }
    if config.execution.max_concurrency == 0 {
        return Err(Error::input("execution.max_concurrency must be >= 1"));
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => {
            return Err(Error::input(format!(
                "unknown embedding provider '{other}'; must be disabled, openai, or ollama"
            )))
        }
    }
    if config.embedding.is_enabled() {
        if config.embedding.dim == 0 {
            return Err(Error::input("embedding.dim must be > 0 when enabled"));
        }
        if config.embedding.model.is_none() {
            return Err(Error::input(format!(
                "embedding.model must be set when provider is '{}'",
                config.embedding.provider
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chunking.max_tokens, 512);
        assert_eq!(config.chunking.overlap_tokens, 64);
        assert_eq!(config.retrieval.rrf_k, 60);
        assert_eq!(config.execution.max_concurrency, 5);
        assert_eq!(config.execution.stale_threshold_seconds, 1800);
        assert_eq!(config.execution.llm_command, "claude --print");
        assert!((config.enrichment.semantic_link_threshold - 0.78).abs() < 1e-6);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [execution]
            max_concurrency = 2

            [retrieval]
            rrf_k = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.execution.max_concurrency, 2);
        assert_eq!(config.retrieval.rrf_k, 10);
        // Untouched sections keep their defaults
        assert_eq!(config.chunking.max_tokens, 512);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::default();
        config.enrichment.semantic_link_threshold = 1.5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let mut config = Config::default();
        config.embedding.provider = "cohere".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_enabled_provider_requires_model() {
        let mut config = Config::default();
        config.embedding.provider = "ollama".to_string();
        assert!(validate(&config).is_err());
        config.embedding.model = Some("nomic-embed-text".to_string());
        assert!(validate(&config).is_ok());
    }
}
