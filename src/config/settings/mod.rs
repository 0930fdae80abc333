
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::{ChunkingConfig, DEFAULT_MAX_CHUNK_LENGTH};

const CONFIG_DIR_NAME: &str = ".course-rag";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub dimension: usize,
    pub task_type: String,
    pub timeout_secs: u64,
    /// Total attempts per embedding call; 1 disables retrying
    pub retry_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-atlas.nomic.ai/v1".to_string(),
            model: "nomic-embed-text-v1.5".to_string(),
            api_key: None,
            dimension: 768,
            task_type: "search_document".to_string(),
            timeout_secs: 30,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Remote Chroma server
    #[default]
    Chroma,
    /// Embedded LanceDB under the config directory
    #[serde(rename = "lancedb")]
    LanceDb,
}

impl std::fmt::Display for VectorBackend {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            VectorBackend::Chroma => write!(f, "chroma"),
            VectorBackend::LanceDb => write!(f, "lancedb"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorBackend,
    pub base_url: String,
    pub tenant: String,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Chroma,
            base_url: "http://localhost:8000".to_string(),
            tenant: "default_tenant".to_string(),
            database: "default_database".to_string(),
            auth_token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "deepseek-r1-distill-llama-70b".to_string(),
            api_key: None,
            temperature: 0.3,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestionConfig {
    pub max_chunk_length: usize,
    pub batch_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: DEFAULT_MAX_CHUNK_LENGTH,
            batch_size: crate::indexer::DEFAULT_BATCH_SIZE,
        }
    }
}

impl IngestionConfig {
    #[inline]
    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig {
            max_chunk_length: self.max_chunk_length,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: crate::assistant::DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL for {0}: {1}")]
    InvalidUrl(&'static str, String),
    #[error("Invalid model name for {0} (cannot be empty)")]
    InvalidModel(&'static str),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid {0} timeout: {1} (must be between 1 and 600 seconds)")]
    InvalidTimeout(&'static str, u64),
    #[error("Invalid {0}: cannot be empty")]
    EmptyValue(&'static str),
    #[error("Invalid temperature: {0} (must be between 0 and 2)")]
    InvalidTemperature(f32),
    #[error("Invalid max chunk length: {0} (must be between 50 and 8000)")]
    InvalidChunkLength(usize),
    #[error("Invalid batch size: {0} (must be between 1 and 100)")]
    InvalidBatchSize(usize),
    #[error("Invalid top_k: {0} (must be between 1 and 50)")]
    InvalidTopK(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Environment variables that override values from the config file
pub const ENV_OVERRIDES: [&str; 6] = [
    "NOMIC_API_KEY",
    "GROQ_API_KEY",
    "CHROMA_BASE_URL",
    "CHROMA_TENANT",
    "CHROMA_DATABASE",
    "CHROMA_AUTH_TOKEN",
];

impl Config {
    /// Default configuration directory, `~/.course-rag`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load the file (or defaults), apply environment overrides once, then validate
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let mut config = Self::load_file(config_dir)?;
        config.apply_overrides(|key| std::env::var(key).ok());

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load only what is written in the config file, without environment overrides
    #[inline]
    pub fn load_file<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        Ok(config)
    }

    /// Apply overrides from a variable lookup; blank values are ignored
    #[inline]
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("NOMIC_API_KEY") {
            self.embedding.api_key = Some(key);
        }
        if let Some(key) = get("GROQ_API_KEY") {
            self.completion.api_key = Some(key);
        }
        if let Some(url) = get("CHROMA_BASE_URL") {
            self.vector_store.base_url = url;
        }
        if let Some(tenant) = get("CHROMA_TENANT") {
            self.vector_store.tenant = tenant;
        }
        if let Some(database) = get("CHROMA_DATABASE") {
            self.vector_store.database = database;
        }
        if let Some(token) = get("CHROMA_AUTH_TOKEN") {
            self.vector_store.auth_token = Some(token);
        }
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.vector_store.validate()?;
        self.completion.validate()?;
        self.ingestion.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// SQLite course ledger
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("metadata.db")
    }

    /// Directory of the embedded LanceDB backend
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }
}

fn validate_url(owner: &'static str, raw: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(raw.trim()).map_err(|_| ConfigError::InvalidUrl(owner, raw.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(owner, raw.to_string()));
    }
    Ok(())
}

fn validate_timeout(owner: &'static str, secs: u64) -> Result<(), ConfigError> {
    if (1..=600).contains(&secs) {
        Ok(())
    } else {
        Err(ConfigError::InvalidTimeout(owner, secs))
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("embedding", &self.base_url)?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel("embedding"));
        }

        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        if self.task_type.trim().is_empty() {
            return Err(ConfigError::EmptyValue("embedding task type"));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        validate_timeout("embedding", self.timeout_secs)
    }
}

impl VectorStoreConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == VectorBackend::Chroma {
            validate_url("vector store", &self.base_url)?;

            if self.tenant.trim().is_empty() {
                return Err(ConfigError::EmptyValue("tenant"));
            }
            if self.database.trim().is_empty() {
                return Err(ConfigError::EmptyValue("database"));
            }
        }

        validate_timeout("vector store", self.timeout_secs)
    }
}

impl CompletionConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("completion", &self.base_url)?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel("completion"));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        validate_timeout("completion", self.timeout_secs)
    }
}

impl IngestionConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(50..=8000).contains(&self.max_chunk_length) {
            return Err(ConfigError::InvalidChunkLength(self.max_chunk_length));
        }

        if !(1..=100).contains(&self.batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        Ok(())
    }
}

impl RetrievalConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=50).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }
        Ok(())
    }
}
