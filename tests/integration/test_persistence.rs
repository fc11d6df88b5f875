//! Save and load round trips of whole indexes.

use crate::common::{self, DATA, top_id};
use embedsql::ann::AnnBackend;
use embedsql::embeddings::{IDS_FILE, MANIFEST_FILE, Manifest};
use embedsql::{DocId, Document, Embeddings};
use serde_json::json;

#[test]
fn test_save_and_load() {
    let temp_dir = common::temp_dir();
    let path = temp_dir.path().join("index");

    let mut embeddings = common::indexed();
    embeddings.delete(&[DocId::from(2)]).unwrap();
    embeddings.save(&path).unwrap();

    let mut loaded = common::embeddings(true);
    loaded.load(&path).unwrap();
    assert_eq!(loaded.count(), 5);
    assert_eq!(loaded.config(), embeddings.config());

    let rows = loaded.search("feel good story", 1).unwrap();
    assert_eq!(top_id(&rows), Some(json!(4)));
    assert_eq!(rows[0]["text"], json!(DATA[4]));

    let count = loaded.search("select count(*) from txtai", 1).unwrap();
    assert_eq!(count[0].values().next(), Some(&json!(5)));
    assert_eq!(loaded.document(&DocId::from(2)).unwrap(), None);
}

#[test]
fn test_row_counter_survives_reload() {
    let temp_dir = common::temp_dir();
    let path = temp_dir.path().join("index");

    let mut embeddings = common::indexed();
    embeddings.delete(&[DocId::from(5)]).unwrap();
    embeddings.save(&path).unwrap();

    let mut loaded = common::embeddings(true);
    loaded.load(&path).unwrap();
    loaded.upsert([Document::new("late", "Baby panda")]).unwrap();
    loaded.save(&path).unwrap();

    // Rows 0..=5 were assigned before the save, so the new document takes row 6
    let manifest = Manifest::read(&path).unwrap();
    assert_eq!(manifest.next_row, 7);
    assert_eq!(manifest.count, 6);
    assert_eq!(manifest.dimension, common::DIMENSION);

    let rows = loaded.search("feel good story", 1).unwrap();
    assert_eq!(top_id(&rows), Some(json!("late")));
}

#[test]
fn test_upsert_after_deleting_everything_keeps_row_counter() {
    let temp_dir = common::temp_dir();
    let path = temp_dir.path().join("index");

    let mut embeddings = common::indexed();
    let all: Vec<DocId> = (0..DATA.len()).map(DocId::from).collect();
    embeddings.delete(&all).unwrap();
    assert_eq!(embeddings.count(), 0);

    embeddings.upsert([Document::new("x", "Baby panda")]).unwrap();
    embeddings.save(&path).unwrap();

    // Rows 0..=5 stay retired, the new document takes row 6
    let manifest = Manifest::read(&path).unwrap();
    assert_eq!(manifest.next_row, 7);
    assert_eq!(manifest.count, 1);

    let rows = embeddings.search("feel good story", 1).unwrap();
    assert_eq!(top_id(&rows), Some(json!("x")));
}

#[test]
fn test_save_without_content() {
    let temp_dir = common::temp_dir();
    let path = temp_dir.path().join("index");

    let mut embeddings = common::embeddings(false);
    embeddings.index(common::documents()).unwrap();
    embeddings.save(&path).unwrap();
    assert!(!path.join(embedsql::database::DOCUMENTS_FILE).exists());

    let mut loaded = common::embeddings(false);
    loaded.load(&path).unwrap();
    let rows = loaded.search("feel good story", 2).unwrap();
    assert_eq!(top_id(&rows), Some(json!(4)));
    assert!(rows[0].get("text").is_none());
}

#[test]
fn test_quantized_ivf_round_trip() {
    let temp_dir = common::temp_dir();
    let path = temp_dir.path().join("index");

    let mut config = common::config(true);
    config.backend = AnnBackend::Ivf;
    config.quantize = true;
    let mut embeddings = Embeddings::with_generator(config.clone(), common::generator()).unwrap();
    embeddings.index(common::documents()).unwrap();
    let before = embeddings.search("feel good story", 3).unwrap();
    embeddings.save(&path).unwrap();

    let mut loaded = Embeddings::with_generator(config, common::generator()).unwrap();
    loaded.load(&path).unwrap();
    let after = loaded.search("feel good story", 3).unwrap();

    assert_eq!(top_id(&after), Some(json!(4)));
    let ids = |rows: &[embedsql::ResultRow]| -> Vec<_> { rows.iter().map(|row| row["id"].clone()).collect() };
    assert_eq!(ids(&before), ids(&after));
}

#[test]
fn test_load_missing_directory_keeps_state() {
    let temp_dir = common::temp_dir();
    let mut embeddings = common::indexed();

    let err = embeddings.load(temp_dir.path().join("missing")).unwrap_err();
    assert!(matches!(err.status_code().as_str(), "LOAD_ERROR" | "FILE_READ_ERROR"));

    assert_eq!(embeddings.count(), 6);
    let rows = embeddings.search("feel good story", 1).unwrap();
    assert_eq!(top_id(&rows), Some(json!(4)));
}

#[test]
fn test_load_corrupt_ids_keeps_state() {
    let temp_dir = common::temp_dir();
    let path = temp_dir.path().join("index");

    let mut saved = common::indexed();
    saved.delete(&[DocId::from(0)]).unwrap();
    saved.save(&path).unwrap();
    std::fs::write(path.join(IDS_FILE), b"not an id map").unwrap();

    let mut embeddings = common::indexed();
    assert!(embeddings.load(&path).is_err());
    assert_eq!(embeddings.count(), 6);
    assert!(embeddings.document(&DocId::from(0)).unwrap().is_some());
}

#[test]
fn test_load_rejects_newer_format() {
    let temp_dir = common::temp_dir();
    let path = temp_dir.path().join("index");
    common::indexed().save(&path).unwrap();

    let manifest_path = path.join(MANIFEST_FILE);
    let mut manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&manifest_path).unwrap()).unwrap();
    manifest["version"] = json!(99);
    std::fs::write(&manifest_path, manifest.to_string()).unwrap();

    let mut embeddings = common::embeddings(true);
    let err = embeddings.load(&path).unwrap_err();
    assert_eq!(err.status_code(), "LOAD_ERROR");
    assert_eq!(embeddings.count(), 0);
}
