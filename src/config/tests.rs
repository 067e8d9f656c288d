use super::*;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");

        let config = Config::load(temp_dir.path()).expect("defaults should load");
        assert_eq!(config.get_base_dir(), temp_dir.path());
        assert_eq!(config.ollama, OllamaConfig::default());
        assert!(!temp_dir.path().join("config.toml").exists());
    }

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let base_dir = temp_dir.path().join(".pattern-review");

        let mut original_config = Config::with_base_dir(&base_dir);
        original_config.ollama.host = "test-host".to_string();
        original_config.embedding.provider = EmbeddingProvider::Hashing;
        original_config.review.top_k = 7;
        original_config.indexing.extensions = vec!["py".to_string()];

        original_config.save().expect("config should save");
        assert!(base_dir.join("config.toml").exists());

        let loaded_config = Config::load(&base_dir).expect("config should load");
        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn invalid_values_fail_to_load() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        fs::write(
            temp_dir.path().join("config.toml"),
            "[review]\ntop_k = 0\n",
        )
        .expect("should write config file");

        let result = Config::load(temp_dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [ollama
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn save_refuses_invalid_config() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let mut config = Config::with_base_dir(temp_dir.path());
        config.retry.max_attempts = 0;

        assert!(config.save().is_err());
        assert!(!temp_dir.path().join("config.toml").exists());
    }

    #[test]
    fn error_display_messages() {
        let errors = vec![
            ConfigError::InvalidProtocol("ftp".to_string()),
            ConfigError::InvalidPort(0),
            ConfigError::InvalidBatchSize(0),
            ConfigError::InvalidModel(String::new()),
            ConfigError::InvalidUrl("invalid-url".to_string()),
            ConfigError::InvalidTopK(0),
            ConfigError::NoExtensions,
        ];

        for error in errors {
            let message = format!("{error}");
            assert!(message.len() > 10);
        }
    }
}
