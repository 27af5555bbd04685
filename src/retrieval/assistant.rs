use super::{PromptTemplate, RetrievedChunk, Retriever, SearchError};
use crate::generation::TextGenerator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of a chat turn.
///
/// Retrieval and generation fail independently, each into its own field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub relevant_chunks: Vec<RetrievedChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
}

/// Retrieval plus optional answer generation
pub struct Assistant {
    retriever: Arc<Retriever>,
    generator: Option<Arc<dyn TextGenerator>>,
    prompt: PromptTemplate,
}

impl Assistant {
    pub fn new(
        retriever: Arc<Retriever>,
        generator: Option<Arc<dyn TextGenerator>>,
        prompt: PromptTemplate,
    ) -> Self {
        Self {
            retriever,
            generator,
            prompt,
        }
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    pub fn generation_enabled(&self) -> bool {
        self.generator.is_some()
    }

    /// Search off the async runtime; embedding is CPU bound
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        let retriever = Arc::clone(&self.retriever);
        let query = query.to_string();

        run_blocking(move || retriever.search_relevant_chunks(&query, top_k)).await
    }

    /// Answer `prompt`, returning the chunks retrieved for it
    pub async fn chat(&self, prompt: &str, top_k: usize) -> Result<ChatResponse, SearchError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SearchError::InvalidQuery("A prompt is required.".to_string()));
        }

        let mut response = ChatResponse::default();

        match self.search(prompt, top_k).await {
            Ok(chunks) => response.relevant_chunks = chunks,
            Err(e) => {
                tracing::warn!("Retrieval failed: {}", e);
                response.retrieval_error = Some(e.to_string());
            }
        }

        if let Some(generator) = &self.generator {
            let full_prompt = self.prompt.render(prompt, &response.relevant_chunks);
            match generator.generate(&full_prompt).await {
                Ok(text) => response.llm_response = Some(text),
                Err(e) => {
                    tracing::warn!("Generation with {} failed: {}", generator.model_name(), e);
                    response.generation_error = Some(e.to_string());
                }
            }
        }

        Ok(response)
    }
}

/// Run `f` on the blocking pool; a panicked or cancelled task is a `Task` error
async fn run_blocking<T, F>(f: F) -> Result<T, SearchError>
where
    F: FnOnce() -> Result<T, SearchError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SearchError::Task(e.to_string()))?
}
