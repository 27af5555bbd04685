/// Embedding adapter
///
/// - EmbeddingProvider trait for abstraction over embedding backends
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - BatchEmbedder for ordered, batched corpus embedding
mod batch;
mod provider;

pub use batch::{BatchEmbedder, BatchResult};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
