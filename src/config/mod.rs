// Configuration management: TOML settings under the application directory

pub mod settings;

#[cfg(test)]
mod tests;

pub use settings::{
    API_KEY_ENV_VARS, CategoryToggles, Config, ConfigError, EmbeddingConfig, EmbeddingProvider,
    IndexingConfig, LlmConfig, OllamaConfig, RetryConfig, ReviewConfig, normalize_extensions,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
