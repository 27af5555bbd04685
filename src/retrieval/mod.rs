//! Retrieval service and chat assistant
//!
//! [`Retriever`] embeds a query and runs the exact search against the shared
//! [`IndexStore`]. [`Assistant`] adds optional answer generation on top,
//! keeping retrieval and generation failures independent.

mod assistant;
mod prompt;

pub use assistant::{Assistant, ChatResponse};
pub use prompt::PromptTemplate;

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::index::{IndexError, IndexStore, QueryResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Search task failed: {0}")]
    Task(String),
}

/// A chunk returned for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub distance: f32,
}

impl RetrievedChunk {
    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((end, _)) => format!("{}...", &self.text[..end]),
            None => self.text.clone(),
        }
    }
}

impl From<QueryResult> for RetrievedChunk {
    fn from(result: QueryResult) -> Self {
        Self {
            id: result.id,
            text: result.text,
            distance: result.distance,
        }
    }
}

/// Embeds queries and searches the loaded index
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<IndexStore>,
    max_top_k: usize,
}

impl Retriever {
    /// Create a retriever; `max_top_k` caps caller-supplied `top_k`
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<IndexStore>,
        max_top_k: usize,
    ) -> Self {
        if provider.model_name() != store.model() {
            tracing::warn!(
                "Query model {} differs from index model {}",
                provider.model_name(),
                store.model()
            );
        }

        Self {
            provider,
            store,
            max_top_k: max_top_k.max(1),
        }
    }

    /// Return the `top_k` chunks nearest to `query`, nearest first
    pub fn search_relevant_chunks(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }

        let top_k = if top_k > self.max_top_k {
            tracing::debug!("Clamping top_k {} to {}", top_k, self.max_top_k);
            self.max_top_k
        } else {
            top_k
        };

        let embedding = self.provider.embed(query)?;
        let results = self.store.search(&embedding, top_k)?;

        tracing::debug!("Query matched {} chunks", results.len());

        Ok(results.into_iter().map(RetrievedChunk::from).collect())
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }
}
