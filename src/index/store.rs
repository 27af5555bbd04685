//! Loaded index: chunks and their vectors, immutable for the process lifetime

use super::{artifacts, FlatIndex, IndexError, QueryResult};
use crate::corpus::Chunk;
use std::path::Path;

/// Chunks plus the flat index over their embeddings
///
/// `chunks[p]` is described by row `p` of the index. The only constructor
/// checks that both have the same length, and nothing mutates either
/// afterwards, so a store can be shared behind an `Arc` and searched from any
/// number of threads without locking.
#[derive(Debug)]
pub struct IndexStore {
    chunks: Vec<Chunk>,
    index: FlatIndex,
    model: String,
    generation: Option<String>,
}

impl IndexStore {
    /// Assemble a store, rejecting chunks and vectors of different lengths
    pub fn from_parts(
        chunks: Vec<Chunk>,
        index: FlatIndex,
        model: impl Into<String>,
        generation: Option<String>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != index.ntotal() {
            return Err(IndexError::CorpusAlignment {
                vectors: index.ntotal(),
                ids: chunks.len(),
                texts: chunks.len(),
            });
        }

        Ok(Self {
            chunks,
            index,
            model: model.into(),
            generation,
        })
    }

    /// Load the generation `index_dir/CURRENT` points at
    pub fn open(index_dir: &Path) -> Result<Self, IndexError> {
        let store = artifacts::load_current(index_dir)?;
        tracing::info!(
            "Loaded index generation {} from {}: {} chunks, {}D ({})",
            store.generation.as_deref().unwrap_or("-"),
            index_dir.display(),
            store.len(),
            store.dimension(),
            store.model
        );
        Ok(store)
    }

    /// Load one generation directory directly
    pub fn open_generation(dir: &Path) -> Result<Self, IndexError> {
        artifacts::load_generation(dir)
    }

    /// Exact top-k search, nearest first
    ///
    /// Fails with `DimensionMismatch` if `query` does not have the index
    /// dimension and with `InvalidArgument` if `k` is 0. Returns
    /// `min(k, len())` results; ties are ordered by corpus position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<QueryResult>, IndexError> {
        let neighbors = self.index.search(query, k)?;

        Ok(neighbors
            .into_iter()
            .enumerate()
            .map(|(rank, neighbor)| {
                let chunk = &self.chunks[neighbor.position];
                QueryResult {
                    id: chunk.id.clone(),
                    text: chunk.text.clone(),
                    distance: neighbor.distance,
                    rank,
                }
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn chunk(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    /// Embedding model the vectors were produced with
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generation directory name, when loaded from or persisted to disk
    pub fn generation(&self) -> Option<&str> {
        self.generation.as_deref()
    }

    pub(crate) fn set_generation(&mut self, generation: String) {
        self.generation = Some(generation);
    }
}
