//! Configuration management for DocuMind
//!
//! Handles loading, validation, profile application and environment overrides
//! for the builder, the query engine and the serving process.

use crate::error::{DocuMindError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Current configuration schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Upper bound for `server.max_connections`
pub const MAX_CONNECTIONS: usize = 4096;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub corpus: CorpusConfig,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Corpus input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// JSON Lines corpus file
    pub path: PathBuf,
    /// Field holding the chunk identifier
    pub id_field: String,
    /// Field holding the chunk text
    pub text_field: String,
}

/// Persisted index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding the generations and the CURRENT pointer
    pub dir: PathBuf,
    /// Number of generations kept on disk after a build (including the live one)
    pub retain_generations: usize,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// top_k used when the caller does not specify one
    pub default_top_k: usize,
    /// Upper bound applied to caller-supplied top_k
    pub max_top_k: usize,
}

/// Serving process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub max_connections: usize,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub system_prompt: String,
    /// Send retrieved chunks along with the question
    pub include_context: bool,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_top_k: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DocuMindError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| DocuMindError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| DocuMindError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| DocuMindError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(enabled) = overrides.llm_enabled {
            self.llm.enabled = enabled;
        }
        if let Some(top_k) = overrides.default_top_k {
            self.retrieval.default_top_k = top_k;
        }

        ConfigValidator::validate(self)
    }

    /// Apply environment variable overrides
    /// Environment variables in format: DOCUMIND_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("DOCUMIND_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "CORPUS__PATH" => self.corpus.path = PathBuf::from(value),
            "INDEX__DIR" => self.index.dir = PathBuf::from(value),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse_env(path, value)?,
            "RETRIEVAL__DEFAULT_TOP_K" => {
                self.retrieval.default_top_k = parse_env(path, value)?;
            }
            "SERVER__SOCKET_PATH" => self.server.socket_path = PathBuf::from(value),
            "LLM__ENABLED" => self.llm.enabled = parse_env(path, value)?,
            "LLM__MODEL" => self.llm.model = value.to_string(),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DocuMindError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("documind").join("config.toml"))
    }
}

/// Load `KEY=value` lines from a dotenv file into the process environment.
///
/// Variables already set are left alone. Returns `false` when the file does
/// not exist.
pub fn load_env_file(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }

    dotenvy::from_path(path).map_err(|e| {
        DocuMindError::Config(format!("Failed to load {}: {}", path.display(), e))
    })?;
    Ok(true)
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| DocuMindError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| DocuMindError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| DocuMindError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.documind");

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            corpus: CorpusConfig {
                path: PathBuf::from("1corpus.jsonl"),
                id_field: "_id".to_string(),
                text_field: "text".to_string(),
            },
            index: IndexConfig {
                dir: data_dir.join("index"),
                retain_generations: 2,
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
            },
            retrieval: RetrievalConfig {
                default_top_k: 5,
                max_top_k: 100,
            },
            server: ServerConfig {
                socket_path: data_dir.join("documind.sock"),
                max_connections: 32,
            },
            llm: LlmConfig {
                enabled: false,
                provider: "gemini".to_string(),
                api_key_env: "GOOGLE_API_KEY".to_string(),
                model: "gemini-1.5-flash".to_string(),
                temperature: 0.2,
                timeout_secs: 30,
                system_prompt: "You are an AI assistant for DocuMind, specializing in OpManager and \
                                related IT infrastructure topics. Answer the user's question based on \
                                your general knowledge."
                    .to_string(),
                include_context: false,
            },
            profiles: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.retrieval.default_top_k = 7;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.retrieval.default_top_k, 7);
        assert_eq!(loaded.corpus.id_field, "_id");
    }

    #[test]
    fn test_missing_config() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(&temp.path().join("missing.toml"));
        assert!(matches!(result, Err(DocuMindError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.profiles.insert(
            "wide".to_string(),
            ProfileOverrides {
                embedding_model: None,
                llm_enabled: None,
                default_top_k: Some(20),
            },
        );

        config.apply_profile("wide").unwrap();
        assert_eq!(config.retrieval.default_top_k, 20);

        assert!(config.apply_profile("missing").is_err());
    }

    #[test]
    fn test_load_env_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".env");
        assert!(!load_env_file(&path).unwrap());

        std::fs::write(
            &path,
            "DOCUMIND_TEST_DOTENV_KEY=from-file\nDOCUMIND_TEST_DOTENV_SET=from-file\n",
        )
        .unwrap();
        std::env::set_var("DOCUMIND_TEST_DOTENV_SET", "from-process");

        assert!(load_env_file(&path).unwrap());
        assert_eq!(std::env::var("DOCUMIND_TEST_DOTENV_KEY").unwrap(), "from-file");
        assert_eq!(std::env::var("DOCUMIND_TEST_DOTENV_SET").unwrap(), "from-process");
    }

    #[test]
    fn test_expand_path() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(
            expand_path(Path::new("~/.documind")).unwrap(),
            home.join(".documind")
        );
        assert_eq!(
            expand_path(Path::new("/tmp/documind")).unwrap(),
            PathBuf::from("/tmp/documind")
        );
    }
}
