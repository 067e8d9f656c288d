
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::analysis::Thresholds;
use crate::embeddings::hashing::DEFAULT_HASHING_DIMENSION;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;
use crate::report::Category;
use crate::retry::RetryPolicy;

/// Environment variables consulted, in order, when `llm.api_key` is unset
pub const API_KEY_ENV_VARS: [&str; 2] = ["PATTERN_REVIEW_API_KEY", "GROQ_API_KEY"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Ollama,
    /// Local feature hashing, no network
    Hashing,
}

impl EmbeddingProvider {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            EmbeddingProvider::Ollama => "ollama",
            EmbeddingProvider::Hashing => "hashing",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Vector length of the hashing provider
    pub dimension: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            dimension: DEFAULT_HASHING_DIMENSION,
        }
    }
}

/// OpenAI-compatible chat completions backend used for the qualitative pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key: None,
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexingConfig {
    /// File extensions to index, without the leading dot
    pub extensions: Vec<String>,
    pub ignore_dirs: Vec<String>,
    pub max_file_bytes: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: ["py", "js", "rs", "go"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            ignore_dirs: [".git", "node_modules", "venv", "__pycache__", ".venv", "target"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            max_file_bytes: 512 * 1024,
        }
    }
}

/// Per-category switches for reported findings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CategoryToggles {
    pub style: bool,
    pub structure: bool,
    pub best_practice: bool,
    pub maintainability: bool,
}

impl Default for CategoryToggles {
    fn default() -> Self {
        Self {
            style: true,
            structure: true,
            best_practice: true,
            maintainability: true,
        }
    }
}

impl CategoryToggles {
    #[inline]
    pub fn is_enabled(&self, category: Category) -> bool {
        match category {
            Category::Style => self.style,
            Category::Structure => self.structure,
            Category::BestPractice => self.best_practice,
            Category::Maintainability => self.maintainability,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReviewConfig {
    /// Neighbors retrieved per candidate unit
    pub top_k: usize,
    /// Files or units processed concurrently
    pub workers: usize,
    pub std_multiplier: f64,
    pub complexity_floor: f64,
    pub nesting_floor: f64,
    pub documentation_floor: f64,
    /// Characters a line may exceed the neighbors' longest lines by
    pub line_length_floor: f64,
    pub error_handling_consensus: f64,
    pub categories: CategoryToggles,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            top_k: 5,
            workers: 4,
            std_multiplier: thresholds.std_multiplier,
            complexity_floor: thresholds.complexity_floor,
            nesting_floor: thresholds.nesting_floor,
            documentation_floor: thresholds.documentation_floor,
            line_length_floor: thresholds.line_length_floor,
            error_handling_consensus: thresholds.error_handling_consensus,
            categories: CategoryToggles::default(),
        }
    }
}

impl ReviewConfig {
    #[inline]
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            std_multiplier: self.std_multiplier,
            complexity_floor: self.complexity_floor,
            nesting_floor: self.nesting_floor,
            documentation_floor: self.documentation_floor,
            line_length_floor: self.line_length_floor,
            error_handling_consensus: self.error_handling_consensus,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl RetryConfig {
    #[inline]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.timeout_secs),
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
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
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid max tokens: {0} (must be between 64 and 32768)")]
    InvalidMaxTokens(u32),
    #[error("Invalid extension list (must name at least one extension)")]
    NoExtensions,
    #[error("Invalid max file size: {0} (must be between 1 KiB and 64 MiB)")]
    InvalidMaxFileBytes(u64),
    #[error("Invalid top_k: {0} (must be between 1 and 50)")]
    InvalidTopK(usize),
    #[error("Invalid worker count: {0} (must be between 1 and 64)")]
    InvalidWorkers(usize),
    #[error("Invalid threshold {name}: {value} (must be between {min} and {max})")]
    InvalidThreshold {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Initial backoff ({0} ms) must not exceed max backoff ({1} ms)")]
    BackoffOrder(u64, u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration rooted at `base_dir`
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// `~/.pattern-review`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".pattern-review"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir));
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

        let config_path = self.config_file_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

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
        self.embedding.validate()?;
        self.llm.validate()?;
        self.indexing.validate()?;
        self.review.validate()?;
        self.retry.validate()?;
        Ok(())
    }

    /// Ollama endpoint derived from the `[ollama]` section
    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }

    #[inline]
    pub fn config_file_path(&self) -> Result<PathBuf> {
        Ok(self.get_base_dir().join("config.toml"))
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.get_base_dir().join("metadata.db"))
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> Result<PathBuf> {
        Ok(self.get_base_dir().join("vectors"))
    }

    /// Where remote repositories are cloned while they are indexed
    #[inline]
    pub fn checkouts_path(&self) -> Result<PathBuf> {
        Ok(self.get_base_dir().join("checkouts"))
    }

    /// Where rebuild lock files live
    #[inline]
    pub fn staging_path(&self) -> Result<PathBuf> {
        Ok(self.get_base_dir().join("staging"))
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

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
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

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }
        Ok(())
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|_| ConfigError::InvalidUrl(self.endpoint.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if !(64..=32768).contains(&self.max_tokens) {
            return Err(ConfigError::InvalidMaxTokens(self.max_tokens));
        }

        Ok(())
    }

    /// The configured key, or the first non-empty key from the environment
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .filter_map(|name| std::env::var(name).ok())
                    .find(|key| !key.trim().is_empty())
            })
    }
}

impl IndexingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(ConfigError::NoExtensions);
        }

        if !(1024..=64 * 1024 * 1024).contains(&self.max_file_bytes) {
            return Err(ConfigError::InvalidMaxFileBytes(self.max_file_bytes));
        }

        Ok(())
    }

    /// Extensions lowercased with any leading dot removed
    pub fn normalized_extensions(&self) -> Vec<String> {
        normalize_extensions(&self.extensions)
    }
}

/// Lowercase, strip leading dots, drop blanks and duplicates
#[inline]
pub fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

fn check_threshold(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold {
            name,
            value,
            min,
            max,
        })
    }
}

impl ReviewConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=50).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        if !(1..=64).contains(&self.workers) {
            return Err(ConfigError::InvalidWorkers(self.workers));
        }

        check_threshold("std_multiplier", self.std_multiplier, 0.0, 10.0)?;
        check_threshold("complexity_floor", self.complexity_floor, 0.0, 100.0)?;
        check_threshold("nesting_floor", self.nesting_floor, 0.0, 100.0)?;
        check_threshold("documentation_floor", self.documentation_floor, 0.0, 1.0)?;
        check_threshold("line_length_floor", self.line_length_floor, 0.0, 1000.0)?;
        check_threshold(
            "error_handling_consensus",
            self.error_handling_consensus,
            0.0,
            1.0,
        )?;

        Ok(())
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10).contains(&self.max_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.max_attempts));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::BackoffOrder(
                self.initial_backoff_ms,
                self.max_backoff_ms,
            ));
        }

        Ok(())
    }
}
