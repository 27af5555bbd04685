//! Persisted index generations
//!
//! ```text
//! <index_dir>/CURRENT                    name of the live generation
//! <index_dir>/gen-<hash>/corpus.index    binary flat index
//! <index_dir>/gen-<hash>/chunk_ids.json  ids, position order
//! <index_dir>/gen-<hash>/chunks.json     texts, position order
//! <index_dir>/gen-<hash>/manifest.json   model, shape and BLAKE3 checksums
//! ```
//!
//! A generation is written into a staging directory, renamed into place, and
//! only then published by atomically replacing `CURRENT`. The three artifacts
//! are therefore always swapped together; a failed build leaves the previous
//! generation live.

use super::format::{decode_index, encode_index};
use super::{IndexError, IndexStore};
use crate::corpus::Chunk;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const CURRENT_FILE: &str = "CURRENT";
pub const INDEX_FILE: &str = "corpus.index";
pub const IDS_FILE: &str = "chunk_ids.json";
pub const TEXTS_FILE: &str = "chunks.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Version of the generation layout and manifest
pub const FORMAT_VERSION: u32 = 1;

const GENERATION_PREFIX: &str = "gen-";
const STAGING_PREFIX: &str = ".staging-";

/// Description of one generation, stored next to its artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub model: String,
    pub dimension: usize,
    pub count: usize,
    pub checksums: Checksums,
}

/// BLAKE3 hex digests of the artifact files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    pub index: String,
    pub ids: String,
    pub texts: String,
}

/// Result of persisting a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    pub generation: String,
    /// An identical generation already existed and was published as-is
    pub reused: bool,
    pub pruned: usize,
}

/// Serialized artifacts of one store
struct Encoded {
    index: Vec<u8>,
    ids: Vec<u8>,
    texts: Vec<u8>,
    manifest: Vec<u8>,
    generation: String,
}

impl Encoded {
    fn files(&self) -> [(&'static str, &[u8]); 4] {
        [
            (INDEX_FILE, &self.index),
            (IDS_FILE, &self.ids),
            (TEXTS_FILE, &self.texts),
            (MANIFEST_FILE, &self.manifest),
        ]
    }
}

fn encode(store: &IndexStore) -> Result<Encoded, IndexError> {
    let index = encode_index(store.index());

    let ids: Vec<&str> = store.chunks().iter().map(|c| c.id.as_str()).collect();
    let ids = serde_json::to_vec(&ids).map_err(|e| json_error(e, "Failed to serialize ids"))?;

    let texts: Vec<&str> = store.chunks().iter().map(|c| c.text.as_str()).collect();
    let texts =
        serde_json::to_vec(&texts).map_err(|e| json_error(e, "Failed to serialize texts"))?;

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        model: store.model().to_string(),
        dimension: store.dimension(),
        count: store.len(),
        checksums: Checksums {
            index: hash_hex(&index),
            ids: hash_hex(&ids),
            texts: hash_hex(&texts),
        },
    };
    let manifest = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| json_error(e, "Failed to serialize manifest"))?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(store.model().as_bytes());
    hasher.update(&index);
    hasher.update(&ids);
    hasher.update(&texts);
    let generation = format!("{}{:.32}", GENERATION_PREFIX, hasher.finalize().to_hex());

    Ok(Encoded {
        index,
        ids,
        texts,
        manifest,
        generation,
    })
}

/// Write `store` as a new generation of `index_dir` and make it current.
///
/// Generations are content addressed, so persisting identical content twice
/// publishes the existing directory again. Afterwards at most `retain`
/// generations (the current one included) are kept.
pub(crate) fn persist(
    store: &IndexStore,
    index_dir: &Path,
    retain: usize,
) -> Result<PersistOutcome, IndexError> {
    fs::create_dir_all(index_dir).map_err(|e| IndexError::Io {
        source: e,
        context: format!("Failed to create index directory: {}", index_dir.display()),
    })?;

    let encoded = encode(store)?;
    let generation_dir = index_dir.join(&encoded.generation);

    let reused = generation_matches(&generation_dir, &encoded);
    if !reused {
        if generation_dir.exists() {
            tracing::warn!(
                "Replacing inconsistent generation directory {}",
                generation_dir.display()
            );
            remove_dir(&generation_dir)?;
        }

        let staging = index_dir.join(format!(
            "{}{}",
            STAGING_PREFIX,
            &encoded.generation[GENERATION_PREFIX.len()..]
        ));
        if let Err(e) = stage_generation(&staging, &generation_dir, &encoded) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
    }

    if let Err(e) = publish(index_dir, &encoded.generation) {
        if !reused {
            let _ = fs::remove_dir_all(&generation_dir);
        }
        return Err(e);
    }

    let pruned = prune_generations(index_dir, &encoded.generation, retain);

    tracing::info!(
        "Published index generation {} ({} chunks{})",
        encoded.generation,
        store.len(),
        if reused { ", reused" } else { "" }
    );

    Ok(PersistOutcome {
        generation: encoded.generation,
        reused,
        pruned,
    })
}

/// An existing generation is reused only if every artifact is byte-identical
fn generation_matches(dir: &Path, encoded: &Encoded) -> bool {
    encoded.files().iter().all(|(name, bytes)| match fs::read(dir.join(name)) {
        Ok(existing) => existing.as_slice() == *bytes,
        Err(_) => false,
    })
}

fn stage_generation(staging: &Path, target: &Path, encoded: &Encoded) -> Result<(), IndexError> {
    if staging.exists() {
        remove_dir(staging)?;
    }
    fs::create_dir_all(staging).map_err(|e| IndexError::Io {
        source: e,
        context: format!("Failed to create staging directory: {}", staging.display()),
    })?;

    for (name, bytes) in encoded.files() {
        write_synced(&staging.join(name), bytes)?;
    }
    sync_dir(staging)?;

    fs::rename(staging, target).map_err(|e| IndexError::Io {
        source: e,
        context: format!(
            "Failed to move staged generation into place: {} -> {}",
            staging.display(),
            target.display()
        ),
    })?;

    if let Some(parent) = target.parent() {
        sync_dir(parent)?;
    }

    Ok(())
}

/// Atomically point CURRENT at `generation`
fn publish(index_dir: &Path, generation: &str) -> Result<(), IndexError> {
    let tmp = index_dir.join(format!("{}.tmp", CURRENT_FILE));
    let current = index_dir.join(CURRENT_FILE);

    let result = write_synced(&tmp, format!("{}\n", generation).as_bytes()).and_then(|_| {
        fs::rename(&tmp, &current).map_err(|e| IndexError::Io {
            source: e,
            context: format!("Failed to publish {}", current.display()),
        })
    });

    if result.is_err() && tmp.is_file() {
        let _ = fs::remove_file(&tmp);
    }
    result?;

    sync_dir(index_dir)
}

/// Remove the oldest generations beyond `retain`, never the current one.
/// Failures are logged; they do not affect the published index.
fn prune_generations(index_dir: &Path, current: &str, retain: usize) -> usize {
    let entries = match fs::read_dir(index_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to list {} for pruning: {}", index_dir.display(), e);
            return 0;
        }
    };

    let mut others: Vec<(std::time::SystemTime, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(GENERATION_PREFIX) && name != current
        })
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, entry.path()))
        })
        .collect();

    // newest first
    others.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let keep = retain.saturating_sub(1);
    let mut pruned = 0;
    for (_, path) in others.into_iter().skip(keep) {
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                tracing::debug!("Pruned old generation {}", path.display());
                pruned += 1;
            }
            Err(e) => tracing::warn!("Failed to prune {}: {}", path.display(), e),
        }
    }
    pruned
}

/// Name of the generation `index_dir/CURRENT` points at
pub fn current_generation(index_dir: &Path) -> Result<String, IndexError> {
    let current = index_dir.join(CURRENT_FILE);
    let content = read_artifact(&current)?;
    let name = String::from_utf8(content)
        .map_err(|_| corrupt(&current, "pointer is not valid UTF-8"))?
        .trim()
        .to_string();

    if !name.starts_with(GENERATION_PREFIX) || name.contains(['/', '\\']) {
        return Err(corrupt(
            &current,
            &format!("invalid generation name '{}'", name),
        ));
    }

    Ok(name)
}

pub(crate) fn load_current(index_dir: &Path) -> Result<IndexStore, IndexError> {
    let generation = current_generation(index_dir)?;
    load_generation(&index_dir.join(generation))
}

pub(crate) fn load_generation(dir: &Path) -> Result<IndexStore, IndexError> {
    if !dir.is_dir() {
        return Err(IndexError::IndexNotFound {
            path: dir.to_path_buf(),
        });
    }

    let paths = [INDEX_FILE, IDS_FILE, TEXTS_FILE, MANIFEST_FILE].map(|name| dir.join(name));
    if let Some(missing) = paths.iter().find(|p| !p.is_file()) {
        return Err(IndexError::IndexNotFound {
            path: missing.clone(),
        });
    }
    let [index_path, ids_path, texts_path, manifest_path] = paths;

    let manifest_bytes = read_artifact(&manifest_path)?;
    let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| corrupt(&manifest_path, &e.to_string()))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(corrupt(
            &manifest_path,
            &format!("unsupported format version {}", manifest.format_version),
        ));
    }

    let index_bytes = read_artifact(&index_path)?;
    let index = decode_index(&index_bytes).map_err(|e| corrupt(&index_path, &e.to_string()))?;

    let ids_bytes = read_artifact(&ids_path)?;
    let ids: Vec<String> =
        serde_json::from_slice(&ids_bytes).map_err(|e| corrupt(&ids_path, &e.to_string()))?;

    let texts_bytes = read_artifact(&texts_path)?;
    let texts: Vec<String> =
        serde_json::from_slice(&texts_bytes).map_err(|e| corrupt(&texts_path, &e.to_string()))?;

    if ids.len() != index.ntotal() || texts.len() != index.ntotal() {
        return Err(IndexError::CorpusAlignment {
            vectors: index.ntotal(),
            ids: ids.len(),
            texts: texts.len(),
        });
    }

    verify_checksum(&index_path, &index_bytes, &manifest.checksums.index)?;
    verify_checksum(&ids_path, &ids_bytes, &manifest.checksums.ids)?;
    verify_checksum(&texts_path, &texts_bytes, &manifest.checksums.texts)?;

    if manifest.dimension != index.dimension() || manifest.count != index.ntotal() {
        return Err(corrupt(
            &manifest_path,
            &format!(
                "manifest describes {} vectors of dimension {}, index holds {} of dimension {}",
                manifest.count,
                manifest.dimension,
                index.ntotal(),
                index.dimension()
            ),
        ));
    }

    let chunks: Vec<Chunk> = ids
        .into_iter()
        .zip(texts)
        .map(|(id, text)| Chunk { id, text })
        .collect();

    let generation = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    IndexStore::from_parts(chunks, index, manifest.model, generation)
}

fn verify_checksum(path: &Path, bytes: &[u8], expected: &str) -> Result<(), IndexError> {
    let actual = hash_hex(bytes);
    if actual != expected {
        return Err(corrupt(
            path,
            &format!("checksum mismatch: expected {}, got {}", expected, actual),
        ));
    }
    Ok(())
}

fn read_artifact(path: &Path) -> Result<Vec<u8>, IndexError> {
    fs::read(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            IndexError::IndexNotFound {
                path: path.to_path_buf(),
            }
        } else {
            IndexError::Io {
                source: e,
                context: format!("Failed to read {}", path.display()),
            }
        }
    })
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let io_error = |e| IndexError::Io {
        source: e,
        context: format!("Failed to write {}", path.display()),
    };

    let mut file = fs::File::create(path).map_err(io_error)?;
    file.write_all(bytes).map_err(io_error)?;
    file.sync_all().map_err(io_error)?;
    Ok(())
}

fn sync_dir(dir: &Path) -> Result<(), IndexError> {
    #[cfg(unix)]
    {
        fs::File::open(dir)
            .and_then(|f| f.sync_all())
            .map_err(|e| IndexError::Io {
                source: e,
                context: format!("Failed to sync directory {}", dir.display()),
            })?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

fn remove_dir(dir: &Path) -> Result<(), IndexError> {
    fs::remove_dir_all(dir).map_err(|e| IndexError::Io {
        source: e,
        context: format!("Failed to remove {}", dir.display()),
    })
}

fn hash_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn corrupt(path: &Path, message: &str) -> IndexError {
    IndexError::CorruptIndex {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn json_error(e: serde_json::Error, context: &str) -> IndexError {
    IndexError::Io {
        source: e.into(),
        context: context.to_string(),
    }
}
