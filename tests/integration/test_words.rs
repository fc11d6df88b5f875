//! Word-vector models trained from the sample sentences.

use std::path::{Path, PathBuf};

use crate::common::{self, DATA, top_id};
use embedsql::{Embeddings, EmbeddingsConfig, ReadMode, ScoringMethod, WordVectors};
use serde_json::json;

fn build_vectors(dir: &Path, dimensions: usize) -> PathBuf {
    let tokens = dir.join("tokens.txt");
    std::fs::write(&tokens, DATA.join("\n")).unwrap();
    WordVectors::build(&tokens, dimensions, 1, dir.join("vectors")).unwrap()
}

fn words_config(path: &Path) -> EmbeddingsConfig {
    EmbeddingsConfig {
        path: path.to_string_lossy().into_owned(),
        content: true,
        scoring: ScoringMethod::Bm25,
        quantize: true,
        ..EmbeddingsConfig::default()
    }
}

fn words_index(config: EmbeddingsConfig) -> Embeddings {
    let mut embeddings = Embeddings::new(config).unwrap();
    embeddings.score(common::documents()).unwrap();
    embeddings.index(common::documents()).unwrap();
    embeddings
}

#[test]
fn test_build_and_open_vectors() {
    let temp_dir = common::temp_dir();
    let path = build_vectors(temp_dir.path(), 64);
    assert_eq!(path.extension().unwrap(), "wvec");

    let vectors = WordVectors::open(&path, ReadMode::Full).unwrap();
    assert_eq!(vectors.dimension().get(), 64);
    assert!(vectors.contains("iceberg"));
    assert!(vectors.contains("lottery"));
    assert!(!vectors.contains("the"));

    let full = vectors.lookup("iceberg").unwrap();
    let norm: f32 = full.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4);

    let quantized = WordVectors::open(&path, ReadMode::Quantized).unwrap();
    let approx = quantized.lookup("iceberg").unwrap();
    for (a, b) in full.iter().zip(&approx) {
        assert!((a - b).abs() < 0.05);
    }
    assert_eq!(quantized.lookup("unseen"), None);
}

#[test]
fn test_keyword_search() {
    let temp_dir = common::temp_dir();
    let path = build_vectors(temp_dir.path(), 64);
    let embeddings = words_index(words_config(&path));

    for (query, expected) in [("iceberg", 1), ("taiwan", 2), ("lottery", 4)] {
        let rows = embeddings.search(query, 1).unwrap();
        assert_eq!(top_id(&rows), Some(json!(expected)), "query {query}");
    }
}

#[test]
fn test_keyword_search_with_pca() {
    let temp_dir = common::temp_dir();
    let path = build_vectors(temp_dir.path(), 64);

    let mut config = words_config(&path);
    config.pca = 3;
    config.storevectors = true;
    let embeddings = words_index(config);

    for (query, expected) in [("iceberg", 1), ("taiwan", 2), ("lottery", 4), ("bear", 3)] {
        let rows = embeddings.search(query, 1).unwrap();
        assert_eq!(top_id(&rows), Some(json!(expected)), "query {query}");
    }
}

#[test]
fn test_unknown_words_match_nothing() {
    let temp_dir = common::temp_dir();
    let path = build_vectors(temp_dir.path(), 64);
    let embeddings = words_index(words_config(&path));

    assert!(embeddings.search("zyzzyva", 3).unwrap().is_empty());
}

#[test]
fn test_words_save_and_load() {
    let temp_dir = common::temp_dir();
    let path = build_vectors(temp_dir.path(), 64);
    let index = temp_dir.path().join("index");

    let embeddings = words_index(words_config(&path));
    embeddings.save(&index).unwrap();
    assert!(index.join(embedsql::embeddings::MODEL_FILE).exists());

    // Loading into an index built on a different model switches to the saved one
    let mut loaded = common::embeddings(true);
    loaded.load(&index).unwrap();
    assert_eq!(loaded.dimension(), 64);
    assert_eq!(loaded.config().scoring, ScoringMethod::Bm25);

    let rows = loaded.search("iceberg", 1).unwrap();
    assert_eq!(top_id(&rows), Some(json!(1)));
}

#[test]
fn test_pca_round_trip() {
    let temp_dir = common::temp_dir();
    let path = build_vectors(temp_dir.path(), 64);
    let index = temp_dir.path().join("index");

    let mut config = words_config(&path);
    config.pca = 3;
    let embeddings = words_index(config.clone());
    let before = embeddings.search("lottery ticket", 3).unwrap();
    assert!(!before.is_empty());
    embeddings.save(&index).unwrap();

    let mut loaded = Embeddings::new(config).unwrap();
    loaded.load(&index).unwrap();
    let after = loaded.search("lottery ticket", 3).unwrap();
    assert_eq!(before, after);
}
