//! Corpus input: JSON Lines records read into ordered chunks
//!
//! Record order in the file is the position order of the index built from it.

use crate::index::IndexError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One retrievable unit of corpus text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Names of the record fields holding the id and the text
#[derive(Debug, Clone)]
pub struct CorpusFields {
    pub id_field: String,
    pub text_field: String,
}

impl Default for CorpusFields {
    fn default() -> Self {
        Self {
            id_field: "_id".to_string(),
            text_field: "text".to_string(),
        }
    }
}

/// Read every record of a JSON Lines corpus file, in file order
pub fn read_corpus(path: &Path, fields: &CorpusFields) -> Result<Vec<Chunk>, IndexError> {
    let file = File::open(path).map_err(|e| IndexError::Io {
        source: e,
        context: format!("Failed to open corpus file: {}", path.display()),
    })?;

    let mut chunks = Vec::new();
    for (i, raw) in BufReader::new(file).split(b'\n').enumerate() {
        let raw = raw.map_err(|e| IndexError::Io {
            source: e,
            context: format!("Failed to read corpus line {}", i + 1),
        })?;
        let line = String::from_utf8(raw).map_err(|_| IndexError::CorpusFormat {
            line: i + 1,
            message: "invalid UTF-8".to_string(),
        })?;
        let line = line.strip_suffix('\r').unwrap_or(&line);

        if line.trim().is_empty() {
            tracing::debug!("Skipping blank corpus line {}", i + 1);
            continue;
        }

        chunks.push(parse_record(i + 1, line, fields)?);
    }

    let duplicates = count_duplicate_ids(&chunks);
    if duplicates > 0 {
        tracing::warn!(
            "Corpus {} contains {} duplicate ids; they are indexed as separate chunks",
            path.display(),
            duplicates
        );
    }

    tracing::info!("Loaded {} chunks from {}", chunks.len(), path.display());

    Ok(chunks)
}

/// Parse one corpus line (1-based `line` used for error reporting)
pub fn parse_record(line: usize, raw: &str, fields: &CorpusFields) -> Result<Chunk, IndexError> {
    let format_error = |message: String| IndexError::CorpusFormat { line, message };

    let value: Value =
        serde_json::from_str(raw).map_err(|e| format_error(format!("invalid JSON: {}", e)))?;

    let record = value
        .as_object()
        .ok_or_else(|| format_error("record is not a JSON object".to_string()))?;

    let id = match record.get(&fields.id_field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(format_error(format!(
                "field '{}' must be a string or number, got {}",
                fields.id_field,
                json_type(other)
            )))
        }
        None => return Err(format_error(format!("missing field '{}'", fields.id_field))),
    };

    let text = match record.get(&fields.text_field) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(format_error(format!(
                "field '{}' must be a string, got {}",
                fields.text_field,
                json_type(other)
            )))
        }
        None => {
            return Err(format_error(format!(
                "missing field '{}'",
                fields.text_field
            )))
        }
    };

    Ok(Chunk { id, text })
}

fn count_duplicate_ids(chunks: &[Chunk]) -> usize {
    let mut seen = HashSet::with_capacity(chunks.len());
    chunks.iter().filter(|c| !seen.insert(c.id.as_str())).count()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
