//! Offline index build: corpus → embeddings → flat index → persisted generation

use super::{artifacts, FlatIndex, IndexError, IndexStore};
use crate::corpus::{read_corpus, Chunk, CorpusFields};
use crate::embedding::{BatchEmbedder, EmbeddingError, EmbeddingProvider};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Summary of a completed build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub chunks: usize,
    pub dimension: usize,
    pub model: String,
    pub generation: String,
    pub reused: bool,
    pub duration_ms: u64,
}

/// Builds a flat index from chunks, assigning positions in input order
pub struct IndexBuilder {
    embedder: BatchEmbedder,
}

impl IndexBuilder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            embedder: BatchEmbedder::new(provider, batch_size),
        }
    }

    /// Embed `chunks` and assemble an in-memory store.
    ///
    /// The index dimension is that of the first embedding; any later
    /// embedding of another dimension aborts the build. An empty corpus
    /// yields an empty index of the provider's declared dimension.
    pub fn build(&self, chunks: Vec<Chunk>) -> Result<IndexStore, IndexError> {
        let provider = self.embedder.provider();
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let mut dimension: Option<usize> = None;
        let mut data: Vec<f32> = Vec::new();

        self.embedder.embed_all(&texts, |offset, embeddings| {
            for (i, embedding) in embeddings.into_iter().enumerate() {
                let position = offset + i;
                let expected = match dimension {
                    Some(d) => d,
                    None => {
                        if embedding.is_empty() {
                            return Err(IndexError::from(EmbeddingError::GenerationError(
                                "provider returned an empty embedding".to_string(),
                            )));
                        }
                        data.reserve(embedding.len() * texts.len());
                        *dimension.insert(embedding.len())
                    }
                };

                if embedding.len() != expected {
                    return Err(IndexError::EmbeddingDimensionMismatch {
                        position,
                        expected,
                        actual: embedding.len(),
                    });
                }

                data.extend_from_slice(&embedding);
            }
            Ok(())
        })?;

        let index = match dimension {
            Some(d) => FlatIndex::from_flat(d, data)?,
            None => FlatIndex::new(provider.dimension()),
        };

        IndexStore::from_parts(chunks, index, provider.model_name(), None)
    }

    /// Read a corpus file, build its index and publish it under `index_dir`
    pub fn build_from_corpus(
        &self,
        corpus_path: &Path,
        fields: &CorpusFields,
        index_dir: &Path,
        retain_generations: usize,
    ) -> Result<BuildReport, IndexError> {
        let start = Instant::now();

        let chunks = read_corpus(corpus_path, fields)?;
        let mut store = self.build(chunks)?;
        let outcome = artifacts::persist(&store, index_dir, retain_generations)?;
        store.set_generation(outcome.generation.clone());

        Ok(BuildReport {
            chunks: store.len(),
            dimension: store.dimension(),
            model: store.model().to_string(),
            generation: outcome.generation,
            reused: outcome.reused,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Persist an already built store under `index_dir`
    pub fn persist(
        store: &mut IndexStore,
        index_dir: &Path,
        retain_generations: usize,
    ) -> Result<String, IndexError> {
        let outcome = artifacts::persist(store, index_dir, retain_generations)?;
        store.set_generation(outcome.generation.clone());
        Ok(outcome.generation)
    }
}
