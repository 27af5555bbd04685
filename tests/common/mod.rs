#![allow(dead_code)]

use documind::corpus::Chunk;
use documind::embedding::{EmbeddingError, EmbeddingProvider};
use std::path::{Path, PathBuf};

pub const DIM: usize = 3;

/// Deterministic embeddings without a model download.
///
/// A few words have fixed coordinates ("car" sits near "cat", "dog" far from
/// both); anything else is placed by its BLAKE3 hash. Text containing "fail"
/// makes the provider error.
pub struct FixtureProvider {
    model: String,
}

impl FixtureProvider {
    pub fn new() -> Self {
        Self::named("fixture-v1")
    }

    pub fn named(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }
}

impl EmbeddingProvider for FixtureProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.contains("fail") {
            return Err(EmbeddingError::GenerationError(format!(
                "refusing to embed {:?}",
                text
            )));
        }

        Ok(match text {
            "cat" => vec![1.0, 0.0, 0.0],
            "kitten" => vec![0.95, 0.05, 0.0],
            "car" => vec![0.8, 0.4, 0.0],
            "dog" => vec![-1.0, 0.0, 0.0],
            _ => {
                let hash = blake3::hash(text.as_bytes());
                hash.as_bytes()[..DIM]
                    .iter()
                    .map(|b| *b as f32 / 127.5 - 1.0)
                    .collect()
            }
        })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

pub fn animal_chunks() -> Vec<Chunk> {
    vec![
        Chunk::new("a", "cat"),
        Chunk::new("b", "dog"),
        Chunk::new("c", "car"),
    ]
}

/// Write `lines` as a JSONL corpus and return its path
pub fn write_corpus(dir: &Path, lines: &[&str]) -> PathBuf {
    let path = dir.join("corpus.jsonl");
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(&path, content).unwrap();
    path
}

/// `count` records `{"_id": "doc-i", "text": "passage number i"}`
pub fn numbered_corpus(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            serde_json::json!({
                "_id": format!("doc-{}", i),
                "text": format!("passage number {}", i),
            })
            .to_string()
        })
        .collect()
}
