#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::agents::reading::SummaryConfig;
use crate::documents::chunking::ChunkingConfig;
use crate::memory::StoreBackend;

/// Environment variable that relocates the application directory
pub const HOME_ENV_VAR: &str = "AURORA_HOME";
const ENV_PREFIX: &str = "AURORA_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Model used for `/api/embed`
    pub embedding_model: String,
    /// Model used for `/api/chat`; must support tool calling for chat mode
    pub chat_model: String,
    pub batch_size: u32,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "nomic-embed-text:latest".to_string(),
            chat_model: "llama3.1:8b".to_string(),
            batch_size: 16,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Temperature for question answering and chat
    pub reasoning_temperature: f32,
    /// Temperature for summaries and insight extraction
    pub summarization_temperature: f32,
}

impl Default for GenerationConfig {
    #[inline]
    fn default() -> Self {
        Self {
            reasoning_temperature: 0.7,
            summarization_temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory holding the vector data; defaults to `<base_dir>/vectors`
    pub path: Option<PathBuf>,
    pub collection: String,
}

impl Default for StoreConfig {
    #[inline]
    fn default() -> Self {
        Self {
            backend: StoreBackend::LanceDb,
            path: None,
            collection: "aurora_memory".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid request timeout: {0} (must be between 1 and 3600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid top-k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid chunk size: {0} (must be between 50 and 20000 characters)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid map group size: {0} (must be between 1 and 64)")]
    InvalidMapGroupSize(usize),
    #[error("Invalid collapse budget: {0} (must be between 500 and 200000 characters)")]
    InvalidCollapseBudget(usize),
    #[error(
        "Invalid collection name: '{0}' (use letters, digits, '_' or '-', at most 64 characters)"
    )]
    InvalidCollection(String),
    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnvValue { var: String, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            chunking: ChunkingConfig::default(),
            summary: SummaryConfig::default(),
            store: StoreConfig::default(),
            base_dir: Self::config_dir().unwrap_or_else(|_| PathBuf::from(".aurora")),
        }
    }
}

impl Config {
    /// Application directory: `$AURORA_HOME`, else `~/.aurora`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        if let Some(home) = std::env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(home));
        }

        dirs::home_dir()
            .map(|home| home.join(".aurora"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("aurora"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load the config file from the application directory and apply
    /// `AURORA_*` environment overrides
    #[inline]
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;
        let mut config = Self::load(&config_dir)?;
        config
            .apply_env_overrides(std::env::vars())
            .context("Invalid environment override")?;
        config
            .validate()
            .context("Configuration validation failed after environment overrides")?;
        Ok(config)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            debug!("No config file at {}, using defaults", config_path.display());
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

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
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

    /// Overlay `AURORA_<SECTION>_<FIELD>` variables onto this config.
    /// Unknown `AURORA_` variables are ignored with a warning.
    #[inline]
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if key == HOME_ENV_VAR {
                continue;
            }

            let invalid = || ConfigError::InvalidEnvValue {
                var: key.clone(),
                value: value.clone(),
            };

            match name {
                "OLLAMA_PROTOCOL" => self.ollama.protocol = value.clone(),
                "OLLAMA_HOST" => self.ollama.host = value.clone(),
                "OLLAMA_PORT" => self.ollama.port = value.parse().map_err(|_| invalid())?,
                "OLLAMA_EMBEDDING_MODEL" => self.ollama.embedding_model = value.clone(),
                "OLLAMA_CHAT_MODEL" => self.ollama.chat_model = value.clone(),
                "OLLAMA_BATCH_SIZE" => {
                    self.ollama.batch_size = value.parse().map_err(|_| invalid())?;
                }
                "OLLAMA_TIMEOUT_SECS" => {
                    self.ollama.timeout_secs = value.parse().map_err(|_| invalid())?;
                }
                "GENERATION_REASONING_TEMPERATURE" => {
                    self.generation.reasoning_temperature =
                        value.parse().map_err(|_| invalid())?;
                }
                "GENERATION_SUMMARIZATION_TEMPERATURE" => {
                    self.generation.summarization_temperature =
                        value.parse().map_err(|_| invalid())?;
                }
                "RETRIEVAL_TOP_K" => self.retrieval.top_k = value.parse().map_err(|_| invalid())?,
                "CHUNKING_CHUNK_SIZE" => {
                    self.chunking.chunk_size = value.parse().map_err(|_| invalid())?;
                }
                "CHUNKING_CHUNK_OVERLAP" => {
                    self.chunking.chunk_overlap = value.parse().map_err(|_| invalid())?;
                }
                "SUMMARY_MAP_GROUP_SIZE" => {
                    self.summary.map_group_size = value.parse().map_err(|_| invalid())?;
                }
                "SUMMARY_COLLAPSE_MAX_CHARS" => {
                    self.summary.collapse_max_chars = value.parse().map_err(|_| invalid())?;
                }
                "STORE_BACKEND" => self.store.backend = value.parse().map_err(|_| invalid())?,
                "STORE_PATH" => self.store.path = Some(PathBuf::from(&value)),
                "STORE_COLLECTION" => self.store.collection = value.clone(),
                _ => warn!("Ignoring unknown environment variable {}", key),
            }
            debug!("Applied environment override {}", key);
        }
        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.validate_generation_config()?;
        self.validate_chunking_config()?;
        self.validate_summary_config()?;
        self.validate_store_config()?;

        if !(1..=100).contains(&self.retrieval.top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }

        Ok(())
    }

    fn validate_generation_config(&self) -> Result<(), ConfigError> {
        for temperature in [
            self.generation.reasoning_temperature,
            self.generation.summarization_temperature,
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidTemperature(temperature));
            }
        }
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(50..=20_000).contains(&config.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.chunk_overlap,
                config.chunk_size,
            ));
        }

        Ok(())
    }

    fn validate_summary_config(&self) -> Result<(), ConfigError> {
        let config = &self.summary;

        if !(1..=64).contains(&config.map_group_size) {
            return Err(ConfigError::InvalidMapGroupSize(config.map_group_size));
        }

        if !(500..=200_000).contains(&config.collapse_max_chars) {
            return Err(ConfigError::InvalidCollapseBudget(
                config.collapse_max_chars,
            ));
        }

        Ok(())
    }

    fn validate_store_config(&self) -> Result<(), ConfigError> {
        let name = &self.store.collection;
        let valid = !name.is_empty()
            && name.len() <= 64
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(ConfigError::InvalidCollection(name.clone()))
        }
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Directory holding the vector store; relative `store.path` values are
    /// resolved against the application directory
    #[inline]
    pub fn vector_store_path(&self) -> PathBuf {
        match &self.store.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.get_base_dir().join(path),
            None => self.get_base_dir().join("vectors"),
        }
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.timeout_secs)
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=3600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }
}
