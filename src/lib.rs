//! DocuMind - exact semantic retrieval over a pre-indexed document corpus
//!
//! A corpus of text chunks is embedded once into a flat vector index and
//! persisted as an immutable, checksummed generation. Queries are embedded
//! with the same model and answered by exhaustive squared-L2 search, with an
//! optional LLM turning the retrieved chunks into an answer.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod retrieval;
pub mod server;

pub use error::{DocuMindError, Result};
