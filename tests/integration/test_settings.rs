//! Settings files driving index construction.

use crate::common::{self, top_id};
use embedsql::ann::AnnBackend;
use embedsql::{Embeddings, ScoringMethod, Settings};
use serde_json::json;

#[test]
fn test_settings_round_trip_through_toml() {
    let temp_dir = common::temp_dir();
    let path = temp_dir.path().join(".embedsql").join("settings.toml");

    let mut settings = Settings::default();
    settings.index_path = temp_dir.path().join("index");
    settings.embeddings.content = true;
    settings.embeddings.backend = AnnBackend::Ivf;
    settings.embeddings.scoring = ScoringMethod::Tfidf;
    settings.save(&path).unwrap();

    let loaded = Settings::load_from(&path).unwrap();
    assert_eq!(loaded.index_path, settings.index_path);
    assert_eq!(loaded.embeddings, settings.embeddings);
}

#[test]
fn test_index_from_settings() {
    let temp_dir = common::temp_dir();
    let path = temp_dir.path().join("settings.toml");
    std::fs::write(
        &path,
        r#"
[embeddings]
content = true
backend = "ivf"
nprobe = 4
"#,
    )
    .unwrap();

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.embeddings.nprobe, 4);

    let mut embeddings = Embeddings::with_generator(settings.embeddings, common::generator()).unwrap();
    embeddings.index(common::documents()).unwrap();
    let rows = embeddings.search("feel good story", 1).unwrap();
    assert_eq!(top_id(&rows), Some(json!(4)));
}
