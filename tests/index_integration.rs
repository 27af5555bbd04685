//! Build, persist, reload and search an index end to end

mod common;

use common::{animal_chunks, numbered_corpus, write_corpus, FixtureProvider, DIM};
use documind::corpus::CorpusFields;
use documind::embedding::EmbeddingProvider;
use documind::index::{
    current_generation, FlatIndex, IndexBuilder, IndexError, IndexStore, IDS_FILE, INDEX_FILE,
    MANIFEST_FILE, TEXTS_FILE,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn builder() -> IndexBuilder {
    IndexBuilder::new(Arc::new(FixtureProvider::new()), 4)
}

fn build_numbered(dir: &Path, count: usize) -> String {
    let lines = numbered_corpus(count);
    let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
    let corpus = write_corpus(dir, &refs);
    builder()
        .build_from_corpus(&corpus, &CorpusFields::default(), &dir.join("index"), 2)
        .unwrap()
        .generation
}

fn generation_dir(index_dir: &Path) -> std::path::PathBuf {
    index_dir.join(current_generation(index_dir).unwrap())
}

#[test]
fn test_end_to_end_animals() {
    let temp = TempDir::new().unwrap();
    let corpus = write_corpus(
        temp.path(),
        &[
            r#"{"_id": "a", "text": "cat"}"#,
            r#"{"_id": "b", "text": "dog"}"#,
            r#"{"_id": "c", "text": "car"}"#,
        ],
    );
    let index_dir = temp.path().join("index");

    let report = builder()
        .build_from_corpus(&corpus, &CorpusFields::default(), &index_dir, 2)
        .unwrap();
    assert_eq!(report.chunks, 3);
    assert_eq!(report.dimension, DIM);
    assert!(!report.reused);

    let store = IndexStore::open(&index_dir).unwrap();
    assert_eq!(store.generation(), Some(report.generation.as_str()));
    assert_eq!(store.model(), "fixture-v1");

    let query = FixtureProvider::new().embed("kitten").unwrap();
    let results = store.search(&query, 2).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].id, "a");
    assert_eq!(results[0].text, "cat");
    assert_eq!(results[1].id, "c");
    assert!(results[0].distance < results[1].distance);
    assert_eq!(results[0].rank, 0);
    assert_eq!(results[1].rank, 1);
}

#[test]
fn test_loaded_store_matches_built_store() {
    let temp = TempDir::new().unwrap();
    let index_dir = temp.path().join("index");

    let mut built = builder().build(animal_chunks()).unwrap();
    IndexBuilder::persist(&mut built, &index_dir, 2).unwrap();
    let loaded = IndexStore::open(&index_dir).unwrap();

    assert_eq!(loaded.chunks(), built.chunks());
    assert_eq!(loaded.generation(), built.generation());
    for p in 0..built.len() {
        assert_eq!(loaded.index().row(p), built.index().row(p));
    }
}

#[test]
fn test_alignment_after_reload() {
    let temp = TempDir::new().unwrap();
    build_numbered(temp.path(), 25);

    let store = IndexStore::open(&temp.path().join("index")).unwrap();
    assert_eq!(store.len(), 25);
    assert_eq!(store.index().ntotal(), store.chunks().len());

    // every chunk is its own nearest neighbour
    let provider = FixtureProvider::new();
    for (p, chunk) in store.chunks().iter().enumerate() {
        let query = provider.embed(&chunk.text).unwrap();
        let hit = &store.search(&query, 1).unwrap()[0];
        assert_eq!(hit.distance, 0.0);
        assert_eq!(hit.id, chunk.id, "position {}", p);
    }
}

#[test]
fn test_search_is_deterministic() {
    let temp = TempDir::new().unwrap();
    build_numbered(temp.path(), 40);
    let store = IndexStore::open(&temp.path().join("index")).unwrap();

    let query = FixtureProvider::new().embed("an unrelated question").unwrap();
    let first = store.search(&query, 10).unwrap();
    for _ in 0..5 {
        assert_eq!(store.search(&query, 10).unwrap(), first);
    }

    for pair in first.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[test]
fn test_k_larger_than_corpus_truncates() {
    let store = builder().build(animal_chunks()).unwrap();
    let query = FixtureProvider::new().embed("dog").unwrap();

    let results = store.search(&query, 50).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].id, "b");
}

#[test]
fn test_query_dimension_guard() {
    let store = builder().build(animal_chunks()).unwrap();
    assert!(matches!(
        store.search(&[1.0, 0.0], 2),
        Err(IndexError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
}

#[test]
fn test_empty_corpus_round_trip() {
    let temp = TempDir::new().unwrap();
    let corpus = write_corpus(temp.path(), &[]);
    let index_dir = temp.path().join("index");

    let report = builder()
        .build_from_corpus(&corpus, &CorpusFields::default(), &index_dir, 2)
        .unwrap();
    assert_eq!(report.chunks, 0);

    let store = IndexStore::open(&index_dir).unwrap();
    assert!(store.is_empty());
    assert_eq!(store.dimension(), DIM);
    assert!(store.search(&[0.0, 0.0, 0.0], 5).unwrap().is_empty());
}

#[test]
fn test_rebuild_is_byte_identical() {
    let temp = TempDir::new().unwrap();
    let first = build_numbered(temp.path(), 12);
    let index_dir = temp.path().join("index");
    let dir = generation_dir(&index_dir);

    let snapshot: Vec<Vec<u8>> = [INDEX_FILE, IDS_FILE, TEXTS_FILE, MANIFEST_FILE]
        .iter()
        .map(|name| std::fs::read(dir.join(name)).unwrap())
        .collect();

    let second = build_numbered(temp.path(), 12);
    assert_eq!(first, second);

    let dir = generation_dir(&index_dir);
    for (name, before) in [INDEX_FILE, IDS_FILE, TEXTS_FILE, MANIFEST_FILE]
        .iter()
        .zip(&snapshot)
    {
        assert_eq!(&std::fs::read(dir.join(name)).unwrap(), before, "{}", name);
    }
}

#[test]
fn test_new_build_replaces_all_artifacts_together() {
    let temp = TempDir::new().unwrap();
    let old = build_numbered(temp.path(), 5);
    let new = build_numbered(temp.path(), 8);
    assert_ne!(old, new);

    let index_dir = temp.path().join("index");
    let store = IndexStore::open(&index_dir).unwrap();
    assert_eq!(store.len(), 8);
    assert_eq!(store.generation(), Some(new.as_str()));

    // the previous generation is retained and still loads on its own
    let previous = IndexStore::open_generation(&index_dir.join(&old)).unwrap();
    assert_eq!(previous.len(), 5);
}

#[test]
fn test_failed_build_leaves_published_index() {
    let temp = TempDir::new().unwrap();
    let good = build_numbered(temp.path(), 6);
    let index_dir = temp.path().join("index");

    let corpus = write_corpus(
        temp.path(),
        &[
            r#"{"_id": "x", "text": "fine"}"#,
            r#"{"_id": "y", "text": "this one will fail"}"#,
        ],
    );
    let result = builder().build_from_corpus(&corpus, &CorpusFields::default(), &index_dir, 2);
    assert!(matches!(result, Err(IndexError::Embedding(_))));

    assert_eq!(current_generation(&index_dir).unwrap(), good);
    assert_eq!(IndexStore::open(&index_dir).unwrap().len(), 6);
}

#[test]
fn test_malformed_corpus_line_reported() {
    let temp = TempDir::new().unwrap();
    let corpus = write_corpus(
        temp.path(),
        &[
            r#"{"_id": "a", "text": "cat"}"#,
            r#"{"_id": "b"}"#,
        ],
    );

    match builder().build_from_corpus(
        &corpus,
        &CorpusFields::default(),
        &temp.path().join("index"),
        2,
    ) {
        Err(IndexError::CorpusFormat { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected corpus format error, got {:?}", other),
    }
    assert!(!temp.path().join("index").join("CURRENT").exists());
}

#[test]
fn test_missing_index_directory() {
    let temp = TempDir::new().unwrap();
    assert!(matches!(
        IndexStore::open(&temp.path().join("nowhere")),
        Err(IndexError::IndexNotFound { .. })
    ));
}

#[test]
fn test_missing_artifact() {
    let temp = TempDir::new().unwrap();
    build_numbered(temp.path(), 3);
    let index_dir = temp.path().join("index");
    std::fs::remove_file(generation_dir(&index_dir).join(TEXTS_FILE)).unwrap();

    match IndexStore::open(&index_dir) {
        Err(IndexError::IndexNotFound { path }) => assert!(path.ends_with(TEXTS_FILE)),
        other => panic!("expected IndexNotFound, got {:?}", other),
    }
}

#[test]
fn test_truncated_index_file() {
    let temp = TempDir::new().unwrap();
    build_numbered(temp.path(), 3);
    let index_dir = temp.path().join("index");
    let path = generation_dir(&index_dir).join(INDEX_FILE);

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

    assert!(matches!(
        IndexStore::open(&index_dir),
        Err(IndexError::CorruptIndex { .. })
    ));
}

#[test]
fn test_misaligned_ids_rejected() {
    let temp = TempDir::new().unwrap();
    build_numbered(temp.path(), 4);
    let index_dir = temp.path().join("index");

    std::fs::write(
        generation_dir(&index_dir).join(IDS_FILE),
        r#"["doc-0","doc-1","doc-2"]"#,
    )
    .unwrap();

    match IndexStore::open(&index_dir) {
        Err(IndexError::CorpusAlignment {
            vectors,
            ids,
            texts,
        }) => {
            assert_eq!((vectors, ids, texts), (4, 3, 4));
        }
        other => panic!("expected CorpusAlignment, got {:?}", other),
    }
}

#[test]
fn test_swapped_ids_fail_checksum() {
    let temp = TempDir::new().unwrap();
    build_numbered(temp.path(), 2);
    let index_dir = temp.path().join("index");

    std::fs::write(
        generation_dir(&index_dir).join(IDS_FILE),
        r#"["doc-1","doc-0"]"#,
    )
    .unwrap();

    assert!(matches!(
        IndexStore::open(&index_dir),
        Err(IndexError::CorruptIndex { .. })
    ));
}

#[test]
fn test_store_shared_across_threads() {
    let store = Arc::new(builder().build(animal_chunks()).unwrap());
    let provider = Arc::new(FixtureProvider::new());

    let handles: Vec<_> = ["cat", "dog", "car", "kitten"]
        .into_iter()
        .map(|word| {
            let store = Arc::clone(&store);
            let provider = Arc::clone(&provider);
            std::thread::spawn(move || {
                let query = provider.embed(word).unwrap();
                store.search(&query, 1).unwrap()[0].id.clone()
            })
        })
        .collect();

    let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "a"]);
}

#[test]
fn test_from_parts_rejects_misalignment() {
    let index = FlatIndex::from_rows(DIM, &[vec![0.0; DIM], vec![1.0; DIM]]).unwrap();
    assert!(matches!(
        IndexStore::from_parts(animal_chunks(), index, "fixture-v1", None),
        Err(IndexError::CorpusAlignment { vectors: 2, ids: 3, .. })
    ));
}
