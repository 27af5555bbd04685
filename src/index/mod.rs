//! Exact nearest-neighbor index over chunk embeddings
//!
//! - [`FlatIndex`]: contiguous `n × d` matrix searched by brute force
//! - [`IndexBuilder`]: embeds a corpus in file order and persists it
//! - [`IndexStore`]: the loaded, immutable chunks + vectors, shared across callers
//!
//! Position `p` is the only key joining a vector to its chunk. The store keeps
//! chunks and vectors in one value whose constructor checks they line up, so
//! they cannot drift apart after load.

mod artifacts;
mod builder;
mod flat;
mod format;
mod store;

pub use artifacts::{
    current_generation, Checksums, Manifest, PersistOutcome, CURRENT_FILE, FORMAT_VERSION,
    IDS_FILE, INDEX_FILE, MANIFEST_FILE, TEXTS_FILE,
};
pub use builder::{BuildReport, IndexBuilder};
pub use flat::{squared_l2, FlatIndex, Neighbor};
pub use format::{decode_index, encode_index, FormatError, HEADER_SIZE, MAGIC};
pub use store::IndexStore;

use crate::embedding::EmbeddingError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Corpus format error at line {line}: {message}")]
    CorpusFormat { line: usize, message: String },

    #[error(
        "Embedding dimension mismatch at position {position}: expected {expected}, got {actual}"
    )]
    EmbeddingDimensionMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Index not found: {}", path.display())]
    IndexNotFound { path: PathBuf },

    #[error("Corrupt index at {}: {message}", path.display())]
    CorruptIndex { path: PathBuf, message: String },

    #[error("Corpus alignment error: {vectors} vectors, {ids} ids, {texts} texts")]
    CorpusAlignment {
        vectors: usize,
        ids: usize,
        texts: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// One ranked hit of a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    pub text: String,
    /// Squared Euclidean distance to the query (not normalized)
    pub distance: f32,
    /// 0-based position in the ascending-distance ordering
    pub rank: usize,
}
