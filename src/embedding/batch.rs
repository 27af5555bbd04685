/// Batched embedding generation for corpus builds
use super::{EmbeddingError, EmbeddingProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Summary of a batched embedding run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub processed: usize,
    pub batches: usize,
    pub duration_ms: u64,
}

/// Splits a text sequence into fixed-size batches and embeds them in order.
///
/// Each batch is handed to a sink together with the position of its first
/// text, so callers can append vectors without buffering the whole corpus.
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl BatchEmbedder {
    /// Create a new batch embedder
    ///
    /// A `batch_size` of 0 is treated as 1.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed `texts` batch by batch, passing `(offset, embeddings)` to `sink`.
    ///
    /// Stops at the first failure. A provider returning a different number of
    /// vectors than it was given is reported as a generation error.
    pub fn embed_all<F, E>(&self, texts: &[String], mut sink: F) -> Result<BatchResult, E>
    where
        F: FnMut(usize, Vec<Vec<f32>>) -> Result<(), E>,
        E: From<EmbeddingError>,
    {
        let start = Instant::now();
        let total = texts.len();
        let mut processed = 0;
        let mut batches = 0;

        info!(
            "Embedding {} texts with {} (batch size {})",
            total,
            self.provider.model_name(),
            self.batch_size
        );

        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.provider.embed_batch(batch)?;

            if embeddings.len() != batch.len() {
                return Err(EmbeddingError::GenerationError(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    batch.len(),
                    embeddings.len()
                ))
                .into());
            }

            sink(processed, embeddings)?;

            processed += batch.len();
            batches += 1;
            debug!("Embedded {}/{} texts", processed, total);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Embedding complete: {} texts in {} batches, {}ms",
            processed, batches, duration_ms
        );

        Ok(BatchResult {
            processed,
            batches,
            duration_ms,
        })
    }
}
