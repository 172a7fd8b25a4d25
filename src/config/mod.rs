
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::chunking::ChunkingConfig;
use crate::database::lancedb::DistanceMetric;
use crate::pipeline::PipelineConfig;
use crate::{BriefcastError, Result};

pub const DEFAULT_WORDS_PER_MINUTE: usize = 150;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub chunking: ChunkingConfig,
    pub pipeline: PipelineConfig,
    pub script: ScriptConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            chunking: ChunkingConfig::default(),
            pipeline: PipelineConfig::default(),
            script: ScriptConfig::default(),
            base_dir: PathBuf::from(".briefcast"),
        }
    }
}

/// Embedding backend connection settings. The distance metric lives here
/// because it must match the metric the vector index was created with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub dimension: usize,
    pub metric: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            dimension: 768,
            metric: "cosine".to_string(),
        }
    }
}

/// Text generation backend (OpenAI-compatible chat completions endpoint).
/// The API key is read from the environment, never stored in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScriptConfig {
    /// Narration pace used to convert a duration target into a word budget.
    pub words_per_minute: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid distance metric: {0} (must be 'cosine' or 'l2')")]
    InvalidMetric(String),
    #[error("Invalid max chunk size: {0} (must be between 50 and 8192)")]
    InvalidMaxChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than max chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid parallelism limit: {0} (must be between 1 and 64)")]
    InvalidConcurrency(usize),
    #[error("Invalid words per minute: {0} (must be between 1 and 1000)")]
    InvalidWordsPerMinute(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl From<ConfigError> for BriefcastError {
    fn from(e: ConfigError) -> Self {
        BriefcastError::Config(e.to_string())
    }
}

impl Config {
    /// Load `config.toml` from `base_dir`, falling back to defaults when the
    /// file does not exist yet.
    pub fn load<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let config_path = base_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: base_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| BriefcastError::Config(format!("failed to parse config: {e}")))?;
        config.base_dir = base_dir.as_ref().to_path_buf();

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.validate()?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!("Failed to create config directory: {}", self.base_dir.display())
        })?;

        let content = toml::to_string_pretty(self)
            .map_err(|e| BriefcastError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(self.config_file_path(), content)
            .context("Failed to write config file")?;

        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.embedding.validate()?;

        if !(50..=8192).contains(&self.chunking.max_chunk_size) {
            return Err(ConfigError::InvalidMaxChunkSize(self.chunking.max_chunk_size));
        }
        if self.chunking.overlap >= self.chunking.max_chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                self.chunking.overlap,
                self.chunking.max_chunk_size,
            ));
        }

        if !(1..=64).contains(&self.pipeline.max_concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.pipeline.max_concurrency));
        }

        if !(1..=1000).contains(&self.script.words_per_minute) {
            return Err(ConfigError::InvalidWordsPerMinute(self.script.words_per_minute));
        }

        Ok(())
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Path of the SQLite metadata store.
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("metadata.db")
    }

    /// Directory of the LanceDB vector index.
    pub fn vector_index_path(&self) -> PathBuf {
        self.base_dir.join("vectors")
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if DistanceMetric::parse(&self.metric).is_none() {
            return Err(ConfigError::InvalidMetric(self.metric.clone()));
        }

        Ok(())
    }

    pub fn base_url(&self) -> std::result::Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn distance_metric(&self) -> std::result::Result<DistanceMetric, ConfigError> {
        DistanceMetric::parse(&self.metric)
            .ok_or_else(|| ConfigError::InvalidMetric(self.metric.clone()))
    }
}
