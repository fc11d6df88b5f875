//! Index, search, upsert and delete through the public `Embeddings` API.

use crate::common::{self, DATA, top_id};
use embedsql::ann::AnnBackend;
use embedsql::{DocId, Document, Embeddings};
use serde_json::json;

#[test]
fn test_index_and_search() {
    let embeddings = common::indexed();
    assert_eq!(embeddings.count(), 6);
    assert_eq!(embeddings.dimension(), common::DIMENSION);

    let rows = embeddings.search("feel good story", 1).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(top_id(&rows), Some(json!(4)));
    assert_eq!(rows[0]["text"], json!(DATA[4]));
    assert!(rows[0]["score"].as_f64().unwrap() > 0.5);
}

#[test]
fn test_search_without_content_returns_ids_and_scores() {
    let mut embeddings = common::embeddings(false);
    embeddings.index(common::documents()).unwrap();

    let rows = embeddings.search("feel good story", 3).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(top_id(&rows), Some(json!(4)));
    let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&"id") && keys.contains(&"score"));

    let scores: Vec<f64> = rows.iter().map(|row| row["score"].as_f64().unwrap()).collect();
    assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[test]
fn test_sql_without_content_is_unsupported() {
    let mut embeddings = common::embeddings(false);
    embeddings.index(common::documents()).unwrap();

    let err = embeddings.search("select id from txtai", 1).unwrap_err();
    assert_eq!(err.status_code(), "UNSUPPORTED");
    assert!(embeddings.document(&DocId::from(0)).is_err());
}

#[test]
fn test_ivf_backend_matches_flat() {
    let mut config = common::config(true);
    config.backend = AnnBackend::Ivf;
    let mut embeddings = Embeddings::with_generator(config, common::generator()).unwrap();
    embeddings.index(common::documents()).unwrap();

    let rows = embeddings.search("feel good story", 1).unwrap();
    assert_eq!(top_id(&rows), Some(json!(4)));
}

#[test]
fn test_delete() {
    let mut embeddings = common::indexed();

    assert_eq!(embeddings.delete(&[DocId::from(4)]).unwrap(), 1);
    assert_eq!(embeddings.count(), 5);

    let rows = embeddings.search("feel good story", 1).unwrap();
    assert_eq!(top_id(&rows), Some(json!(5)));
    assert_eq!(embeddings.document(&DocId::from(4)).unwrap(), None);

    // Unknown and repeated ids are ignored
    assert_eq!(embeddings.delete(&[DocId::from(4), DocId::from("missing")]).unwrap(), 0);
    assert_eq!(embeddings.count(), 5);
}

#[test]
fn test_upsert_replaces_and_inserts() {
    let mut embeddings = common::indexed();

    let written = embeddings
        .upsert([Document::new(0, "Feel good story: baby panda born")])
        .unwrap();
    assert_eq!(written, 1);
    assert_eq!(embeddings.count(), 6);

    let rows = embeddings.search("feel good story", 1).unwrap();
    assert_eq!(top_id(&rows), Some(json!(0)));
    assert_eq!(rows[0]["text"], json!("Feel good story: baby panda born"));

    embeddings.upsert([Document::new("new", "US tops 5 million")]).unwrap();
    assert_eq!(embeddings.count(), 7);
}

#[test]
fn test_upsert_into_empty_index_builds_it() {
    let mut embeddings = common::embeddings(true);
    assert_eq!(embeddings.upsert(common::documents()).unwrap(), 6);

    let rows = embeddings.search("feel good story", 1).unwrap();
    assert_eq!(top_id(&rows), Some(json!(4)));
}

#[test]
fn test_duplicate_ids_keep_last_document() {
    let mut embeddings = common::embeddings(true);
    let written = embeddings
        .index([
            Document::new(1, "US tops 5 million confirmed virus cases"),
            Document::new(2, "Beijing mobilises invasion craft"),
            Document::new(1, "Baby panda"),
        ])
        .unwrap();
    assert_eq!(written, 2);
    assert_eq!(embeddings.count(), 2);

    let document = embeddings.document(&DocId::from(1)).unwrap().unwrap();
    assert_eq!(document["text"], json!("Baby panda"));
}

#[test]
fn test_index_resets_previous_rows() {
    let mut embeddings = common::indexed();
    embeddings.index([common::panda()]).unwrap();

    assert_eq!(embeddings.count(), 1);
    assert_eq!(embeddings.document(&DocId::from(0)).unwrap(), None);
    let rows = embeddings.search("feel good story", 10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(top_id(&rows), Some(json!(6)));
}

#[test]
fn test_object_documents_keep_data() {
    let mut embeddings = common::indexed();
    embeddings.upsert([common::panda()]).unwrap();

    let rows = embeddings.search("feel good story", 1).unwrap();
    assert_eq!(top_id(&rows), Some(json!(6)));
    assert_eq!(rows[0]["text"], json!("Baby panda"));
    assert!((rows[0]["score"].as_f64().unwrap() - 1.0).abs() < 1e-5);

    let document = embeddings.document(&DocId::from(6)).unwrap().unwrap();
    assert_eq!(document["data"]["flag"], json!(1));
    assert_eq!(document["data"]["date"], json!("2021-01-01"));
}

#[test]
fn test_similarity_ranks_texts() {
    let embeddings = common::embeddings(false);
    let ranked = embeddings.similarity("feel good story", &DATA).unwrap();

    assert_eq!(ranked.len(), DATA.len());
    assert_eq!(ranked[0].0, 4);
    assert_eq!(ranked[1].0, 5);
}

#[test]
fn test_transform_is_normalized() {
    let embeddings = common::embeddings(false);
    let vector = embeddings.transform("feel good story").unwrap();

    assert_eq!(vector.len(), common::DIMENSION);
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[test]
fn test_stored_vectors() {
    let mut config = common::config(true);
    config.storevectors = true;
    let mut embeddings = Embeddings::with_generator(config, common::generator()).unwrap();
    embeddings.index(common::documents()).unwrap();

    let vector = embeddings.vector(&DocId::from(4)).unwrap().unwrap();
    let expected = common::ConceptEmbedder::vector(DATA[4]);
    for (actual, expected) in vector.iter().zip(&expected) {
        assert!((actual - expected).abs() < 1e-6);
    }

    // Without vector storage nothing is kept
    let embeddings = common::indexed();
    assert_eq!(embeddings.vector(&DocId::from(4)).unwrap(), None);
}

#[test]
fn test_empty_query_matches_nothing() {
    let embeddings = common::indexed();
    assert!(embeddings.search("", 3).unwrap().is_empty());
}
