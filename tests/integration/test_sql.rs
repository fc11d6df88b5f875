//! SQL queries against a content-enabled index.

use crate::common::{self, DATA, top_id};
use embedsql::Document;
use serde_json::json;

#[test]
fn test_similar_with_group_by_and_having() {
    let embeddings = common::indexed();
    let rows = embeddings
        .search(
            "select id, text, score from txtai where similar('feel good story') \
             group by text having count(*) > 0 order by score desc",
            1,
        )
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["text"], json!(DATA[4]));
}

#[test]
fn test_like_filter() {
    let embeddings = common::indexed();
    let rows = embeddings
        .search("select id, text from txtai where text like '%iceberg%'", 1)
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["text"], json!(DATA[1]));
}

#[test]
fn test_count() {
    let embeddings = common::indexed();
    let rows = embeddings.search("select count(*) from txtai", 1).unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values().next(), Some(&json!(6)));
}

#[test]
fn test_builtin_columns() {
    let embeddings = common::indexed();
    let rows = embeddings
        .search("select id, text, data, entry from txtai", 1)
        .unwrap();

    assert_eq!(rows.len(), 1);
    let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(keys.len(), 4);
    for key in ["id", "text", "data", "entry"] {
        assert!(keys.contains(&key), "missing column {key}");
    }
}

#[test]
fn test_wildcard_with_similar() {
    let embeddings = common::indexed();
    let rows = embeddings
        .search("select * from txtai where similar('feel good story')", 1)
        .unwrap();

    assert_eq!(top_id(&rows), Some(json!(4)));
    let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(keys.len(), 3);
    assert!(keys.contains(&"score"));
}

#[test]
fn test_score_filter() {
    let embeddings = common::indexed();
    let rows = embeddings
        .search(
            "select id, score from txtai where similar('feel good story') and score >= 0.5",
            10,
        )
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(top_id(&rows), Some(json!(4)));
}

#[test]
fn test_similar_candidate_count() {
    let embeddings = common::indexed();
    let rows = embeddings
        .search("select id from txtai where similar('feel good story', 2)", 10)
        .unwrap();

    let ids: Vec<_> = rows.iter().map(|row| row["id"].clone()).collect();
    assert_eq!(ids, vec![json!(4), json!(5)]);
}

#[test]
fn test_order_limit_offset() {
    let embeddings = common::indexed();
    let rows = embeddings
        .search("select id from txtai order by id desc limit 2 offset 1", 10)
        .unwrap();

    let ids: Vec<_> = rows.iter().map(|row| row["id"].clone()).collect();
    assert_eq!(ids, vec![json!(4), json!(3)]);
}

#[test]
fn test_data_fields() {
    let mut embeddings = common::indexed();
    embeddings.upsert([common::panda()]).unwrap();

    let rows = embeddings
        .search("select text, flag, date from txtai where flag = 1", 10)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["text"], json!("Baby panda"));
    assert_eq!(rows[0]["flag"], json!(1));
    assert_eq!(rows[0]["date"], json!("2021-01-01"));

    let rows = embeddings
        .search(
            "select id, text, score from txtai where similar('feel good story') and date >= '2021-01-01'",
            10,
        )
        .unwrap();
    assert_eq!(top_id(&rows), Some(json!(6)));
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_entry_tracks_updates() {
    let mut embeddings = common::indexed();
    embeddings
        .upsert([common::panda(), Document::new(0, "Baby panda born")])
        .unwrap();

    let rows = embeddings
        .search("select id from txtai order by entry desc, id limit 2", 10)
        .unwrap();
    let ids: Vec<_> = rows.iter().map(|row| row["id"].clone()).collect();
    assert_eq!(ids, vec![json!(0), json!(6)]);
}

#[test]
fn test_syntax_error() {
    let embeddings = common::indexed();
    let err = embeddings
        .search("select * from txtai where bad,query", 1)
        .unwrap_err();

    assert_eq!(err.status_code(), "QUERY_SYNTAX_ERROR");
}

#[test]
fn test_unknown_table() {
    let embeddings = common::indexed();
    let err = embeddings.search("select id from documents", 1).unwrap_err();

    assert_eq!(err.status_code(), "UNSUPPORTED");
}
