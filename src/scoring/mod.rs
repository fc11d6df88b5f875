//! Term weighting from corpus statistics.
//!
//! The scoring model records document frequencies, the document count and the
//! average document length of a corpus, then weights a term occurrence with
//! BM25 or TF-IDF. Word-vector embeddings use these weights to average token
//! vectors; an unfit model yields no weight and callers fall back to uniform
//! weighting.

use crate::config::Bm25Config;
use crate::vector::tokenize;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Term weighting method.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    /// No term weighting
    #[default]
    None,
    Tfidf,
    Bm25,
}

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Scoring is disabled\nSuggestion: Set 'scoring' to \"bm25\" or \"tfidf\" before calling score")]
    Disabled,

    #[error("Invalid scoring parameter {name}={value}\nSuggestion: Use k1 >= 0 and 0 <= b <= 1")]
    InvalidParameter { name: &'static str, value: f32 },
}

/// Corpus statistics plus the weighting parameters.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct ScoringModel {
    method: ScoringMethod,
    k1: f32,
    b: f32,
    documents: usize,
    tokens: usize,
    frequencies: HashMap<String, u32>,
}

impl ScoringModel {
    pub fn new(method: ScoringMethod, bm25: Bm25Config) -> Result<Self, ScoringError> {
        if bm25.k1.is_nan() || bm25.k1 < 0.0 {
            return Err(ScoringError::InvalidParameter {
                name: "k1",
                value: bm25.k1,
            });
        }
        if !(0.0..=1.0).contains(&bm25.b) {
            return Err(ScoringError::InvalidParameter {
                name: "b",
                value: bm25.b,
            });
        }

        Ok(Self {
            method,
            k1: bm25.k1,
            b: bm25.b,
            documents: 0,
            tokens: 0,
            frequencies: HashMap::new(),
        })
    }

    /// Rebuilds statistics from scratch over `texts`.
    pub fn fit<'a>(&mut self, texts: impl IntoIterator<Item = &'a str>) -> Result<(), ScoringError> {
        if self.method == ScoringMethod::None {
            return Err(ScoringError::Disabled);
        }

        self.clear();
        for text in texts {
            let tokens = tokenize(text);
            self.documents += 1;
            self.tokens += tokens.len();

            let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
            for token in unique {
                *self.frequencies.entry(token.to_string()).or_default() += 1;
            }
        }

        tracing::debug!(
            "fit {:?} scoring over {} documents, {} terms",
            self.method,
            self.documents,
            self.frequencies.len()
        );
        Ok(())
    }

    /// Drops all corpus statistics; the method and parameters are kept.
    pub fn clear(&mut self) {
        self.documents = 0;
        self.tokens = 0;
        self.frequencies.clear();
    }

    #[must_use]
    pub fn is_fit(&self) -> bool {
        self.method != ScoringMethod::None && self.documents > 0
    }

    /// Weight of a term occurring `tf` times in a document of `doc_len` tokens.
    ///
    /// Returns `None` when the model is not fit.
    #[must_use]
    pub fn weight(&self, term: &str, tf: usize, doc_len: usize) -> Option<f32> {
        if !self.is_fit() || tf == 0 {
            return None;
        }

        let n = self.documents as f32;
        let df = self.frequencies.get(term).copied().unwrap_or(0) as f32;
        let tf = tf as f32;

        let weight = match self.method {
            ScoringMethod::Bm25 => {
                let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                let avgdl = self.average_length().max(f32::EPSILON);
                let norm = 1.0 - self.b + self.b * doc_len as f32 / avgdl;
                idf * tf * (self.k1 + 1.0) / (tf + self.k1 * norm)
            }
            ScoringMethod::Tfidf => {
                let idf = ((n + 1.0) / (df + 1.0)).ln() + 1.0;
                (1.0 + tf.ln()) * idf
            }
            ScoringMethod::None => return None,
        };

        Some(weight)
    }

    #[must_use]
    pub fn average_length(&self) -> f32 {
        if self.documents == 0 {
            0.0
        } else {
            self.tokens as f32 / self.documents as f32
        }
    }

    #[must_use]
    pub fn method(&self) -> ScoringMethod {
        self.method
    }

    #[must_use]
    pub fn documents(&self) -> usize {
        self.documents
    }

    #[must_use]
    pub fn document_frequency(&self, term: &str) -> u32 {
        self.frequencies.get(term).copied().unwrap_or(0)
    }
}
