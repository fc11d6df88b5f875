use std::sync::Arc;

use embedsql::vector::{EmbeddingGenerator, VectorDimension, VectorError};
use embedsql::{Document, Embeddings, EmbeddingsConfig};
use serde_json::{Value, json};
use tempfile::TempDir;

pub const DIMENSION: usize = 16;

pub const DATA: [&str; 6] = [
    "US tops 5 million confirmed virus cases",
    "Canada's last fully intact ice shelf has suddenly collapsed, forming a Manhattan-sized iceberg",
    "Beijing mobilises invasion craft along coast as Taiwan tensions escalate",
    "The National Park Service warns against sacrificing slower friends in a bear attack",
    "Maine man wins $1M from $25 lottery ticket",
    "Make huge profits without work, earn up to $100,000 a day",
];

/// Deterministic embedder with two concept axes.
///
/// Axis 0 carries "good news" words and axis 1 money words. Every other word
/// adds a small weight to one of the remaining dimensions, picked by its bytes.
#[derive(Debug, Default)]
pub struct ConceptEmbedder;

impl ConceptEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSION];
        let lower = text.to_lowercase();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            match word {
                "feel" | "good" | "story" | "wins" | "baby" | "panda" => vector[0] += 1.0,
                "lottery" => {
                    vector[0] += 1.0;
                    vector[1] += 1.0;
                }
                "profits" => {
                    vector[0] += 0.5;
                    vector[1] += 1.0;
                }
                "ticket" => vector[1] += 0.5,
                "earn" => vector[1] += 1.0,
                other => {
                    let bucket = other.bytes().map(usize::from).sum::<usize>() % (DIMENSION - 6);
                    vector[6 + bucket] += 0.1;
                }
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in vector.iter_mut() {
                *value /= norm;
            }
        }
        vector
    }
}

impl EmbeddingGenerator for ConceptEmbedder {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts.iter().map(|text| Self::vector(text)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        VectorDimension::new(DIMENSION).expect("Invalid dimension")
    }
}

pub fn generator() -> Arc<dyn EmbeddingGenerator> {
    Arc::new(ConceptEmbedder)
}

/// Config backed by the concept embedder, with content storage as requested.
pub fn config(content: bool) -> EmbeddingsConfig {
    EmbeddingsConfig {
        content,
        ..EmbeddingsConfig::default()
    }
}

pub fn embeddings(content: bool) -> Embeddings {
    Embeddings::with_generator(config(content), generator()).expect("Failed to create embeddings")
}

/// The sample sentences with their positions as ids.
pub fn documents() -> Vec<Document> {
    DATA.iter()
        .enumerate()
        .map(|(id, text)| Document::new(id, *text))
        .collect()
}

/// The structured document indexed after the sample sentences.
pub fn panda() -> Document {
    Document::new(
        DATA.len(),
        json!({"date": "2021-01-01", "text": "Baby panda", "flag": 1}),
    )
}

/// Content-enabled index over the sample sentences.
pub fn indexed() -> Embeddings {
    let mut embeddings = embeddings(true);
    embeddings.index(documents()).expect("Failed to index");
    embeddings
}

pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// Id of the top result.
pub fn top_id(rows: &[embedsql::ResultRow]) -> Option<Value> {
    rows.first().and_then(|row| row.get("id")).cloned()
}
