//! Remote answer generation
//!
//! The assistant only depends on [`TextGenerator`]; [`GeminiGenerator`] is the
//! implementation selected by `llm.provider = "gemini"`.

mod gemini;

pub use gemini::GeminiGenerator;

use crate::config::LlmConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Response contained no text")]
    EmptyResponse,
}

/// Fallible prompt → text function
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}

/// Build the generator described by `llm`, or `None` when generation is disabled
pub fn from_config(llm: &LlmConfig) -> Result<Option<Arc<dyn TextGenerator>>, GenerationError> {
    if !llm.enabled {
        return Ok(None);
    }

    match llm.provider.as_str() {
        "gemini" => {
            let api_key = std::env::var(&llm.api_key_env)
                .ok()
                .filter(|key| !key.is_empty())
                .ok_or_else(|| GenerationError::MissingApiKey(llm.api_key_env.clone()))?;

            let generator = GeminiGenerator::new(
                api_key,
                llm.model.clone(),
                llm.temperature,
                Duration::from_secs(llm.timeout_secs),
            )?;
            tracing::info!("Generation enabled: {} via {}", llm.model, llm.provider);
            Ok(Some(Arc::new(generator)))
        }
        other => Err(GenerationError::UnsupportedProvider(other.to_string())),
    }
}
