use crate::config::{Config, MAX_CONNECTIONS, SCHEMA_VERSION};
use crate::error::{DocuMindError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_corpus(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_server(config, &mut errors);
        Self::validate_llm(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DocuMindError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_corpus(config: &Config, errors: &mut Vec<ValidationError>) {
        // The corpus file may not exist yet; the builder reports that.
        if config.corpus.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "corpus.path",
                "Corpus path cannot be empty",
            ));
        }

        if config.corpus.id_field.is_empty() {
            errors.push(ValidationError::new(
                "corpus.id_field",
                "Id field name cannot be empty",
            ));
        }

        if config.corpus.text_field.is_empty() {
            errors.push(ValidationError::new(
                "corpus.text_field",
                "Text field name cannot be empty",
            ));
        }

        if config.corpus.id_field == config.corpus.text_field {
            errors.push(ValidationError::new(
                "corpus.text_field",
                "Id and text fields must differ",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.index.dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "index.dir",
                "Index directory cannot be empty",
            ));
        }

        if config.index.retain_generations == 0 {
            errors.push(ValidationError::new(
                "index.retain_generations",
                "At least one generation must be retained",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.default_top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.default_top_k",
                "Default top_k must be greater than 0",
            ));
        }

        if config.retrieval.max_top_k < config.retrieval.default_top_k {
            errors.push(ValidationError::new(
                "retrieval.max_top_k",
                format!(
                    "max_top_k ({}) must be at least default_top_k ({})",
                    config.retrieval.max_top_k, config.retrieval.default_top_k
                ),
            ));
        }
    }

    fn validate_server(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.server.socket_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "server.socket_path",
                "Socket path cannot be empty",
            ));
        }

        if config.server.max_connections == 0 {
            errors.push(ValidationError::new(
                "server.max_connections",
                "Max connections must be greater than 0",
            ));
        } else if config.server.max_connections > MAX_CONNECTIONS {
            errors.push(ValidationError::new(
                "server.max_connections",
                format!(
                    "Max connections ({}) cannot exceed {}",
                    config.server.max_connections, MAX_CONNECTIONS
                ),
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        // If LLM is enabled, validate API key environment variable is set
        if config.llm.enabled {
            let env_var = &config.llm.api_key_env;
            match std::env::var(env_var) {
                Ok(key) if key.is_empty() => {
                    errors.push(ValidationError::new(
                        "llm.api_key_env",
                        format!("Environment variable {} is empty", env_var),
                    ));
                }
                Ok(_) => {}
                Err(_) => {
                    errors.push(ValidationError::new(
                        "llm.api_key_env",
                        format!("Environment variable {} is not set", env_var),
                    ));
                }
            }
        }

        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        if config.llm.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "llm.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }

        let provider = &config.llm.provider;
        let valid_providers = ["gemini"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_empty_index_dir() {
        let mut config = Config::default();
        config.index.dir = PathBuf::new();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.embedding.batch_size = 0;
        config.retrieval.default_top_k = 0;
        config.server.max_connections = 0;

        match ConfigValidator::validate(&config) {
            Err(DocuMindError::ConfigValidation { errors }) => {
                assert_eq!(errors.len(), 3);
                assert!(errors.iter().any(|e| e.path == "embedding.batch_size"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_max_top_k_below_default() {
        let mut config = Config::default();
        config.retrieval.default_top_k = 10;
        config.retrieval.max_top_k = 5;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_max_connections_upper_bound() {
        let mut config = Config::default();
        config.server.max_connections = MAX_CONNECTIONS;
        assert!(ConfigValidator::validate(&config).is_ok());

        config.server.max_connections = MAX_CONNECTIONS + 1;
        match ConfigValidator::validate(&config) {
            Err(DocuMindError::ConfigValidation { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].path, "server.max_connections");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_provider() {
        let mut config = Config::default();
        config.llm.provider = "invalid".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
