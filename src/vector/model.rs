//! The vector model: text to unit-normalized vectors.
//!
//! Two backends produce the raw vectors. The transformer backend delegates to an
//! [`EmbeddingGenerator`]; the words backend averages word vectors, weighted by
//! the scoring model once it is fit. Both then pass through optional principal
//! component removal and normalization.

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::config::EmbeddingsConfig;
use crate::scoring::ScoringModel;
use crate::vector::pca::Pca;
use crate::vector::{
    EmbeddingFallback, EmbeddingGenerator, FastEmbedGenerator, ReadMode, VectorDimension,
    VectorError, WordVectors, normalize, tokenize,
};

/// Source of raw vectors.
pub enum ModelBackend {
    Transformer(Arc<dyn EmbeddingGenerator>),
    Words(WordVectors),
}

impl std::fmt::Debug for ModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transformer(generator) => f
                .debug_tuple("Transformer")
                .field(&generator.dimension())
                .finish(),
            Self::Words(words) => f.debug_tuple("Words").field(&words.path()).finish(),
        }
    }
}

#[derive(Debug)]
pub struct VectorModel {
    backend: ModelBackend,
    dimension: VectorDimension,
    scoring: ScoringModel,
    pca: Option<Pca>,
    fallback: EmbeddingFallback,
    batch: usize,
}

/// Per-text outcome of a batch embedding call.
pub type EmbeddingOutcome = Result<Vec<f32>, VectorError>;

impl VectorModel {
    /// Loads the backend named by `config.path`.
    ///
    /// Paths ending in `.wvec` open a word-vector container; anything else is
    /// resolved as a fastembed model name.
    pub fn load(config: &EmbeddingsConfig, scoring: ScoringModel) -> Result<Self, VectorError> {
        let backend = if config.is_words() {
            let mode = if config.quantize {
                ReadMode::Quantized
            } else {
                ReadMode::Full
            };
            ModelBackend::Words(WordVectors::open(&config.path, mode)?)
        } else {
            ModelBackend::Transformer(Arc::new(FastEmbedGenerator::new(&config.path)?))
        };
        Ok(Self::new(backend, config, scoring))
    }

    pub fn new(backend: ModelBackend, config: &EmbeddingsConfig, scoring: ScoringModel) -> Self {
        let dimension = match &backend {
            ModelBackend::Transformer(generator) => generator.dimension(),
            ModelBackend::Words(words) => words.dimension(),
        };

        Self {
            backend,
            dimension,
            scoring,
            pca: None,
            fallback: config.fallback,
            batch: config.batch.max(1),
        }
    }

    /// Applies the fallback and batch settings of `config`.
    pub fn configure(&mut self, config: &EmbeddingsConfig) {
        self.fallback = config.fallback;
        self.batch = config.batch.max(1);
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn is_words(&self) -> bool {
        matches!(self.backend, ModelBackend::Words(_))
    }

    /// Embeds a single text, applying the fallback policy.
    pub fn embed(&self, text: &str) -> EmbeddingOutcome {
        let mut results = self.embed_batch(&[text])?;
        results
            .pop()
            .unwrap_or_else(|| Err(VectorError::EmbeddingFailed("empty batch result".to_string())))
    }

    /// Embeds `texts`, one outcome per text in input order.
    ///
    /// The outer error is a backend failure; inner errors are per-text
    /// fallback failures that the caller may skip.
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutcome>, VectorError> {
        let mut outcomes = self.embed_raw(texts)?;
        if let Some(pca) = &self.pca {
            for vector in outcomes.iter_mut().flatten() {
                if vector.iter().any(|x| *x != 0.0) {
                    pca.apply(vector);
                }
            }
        }
        Ok(outcomes)
    }

    /// Vectors before principal component removal.
    fn embed_raw(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutcome>, VectorError> {
        match &self.backend {
            ModelBackend::Transformer(generator) => self.embed_transformer(generator.as_ref(), texts),
            ModelBackend::Words(words) => Ok(texts
                .par_iter()
                .map(|text| self.embed_words(words, text))
                .collect()),
        }
    }

    fn embed_transformer(
        &self,
        generator: &dyn EmbeddingGenerator,
        texts: &[&str],
    ) -> Result<Vec<EmbeddingOutcome>, VectorError> {
        let mut outcomes: Vec<Option<EmbeddingOutcome>> = texts
            .iter()
            .map(|text| {
                if text.trim().is_empty() {
                    Some(self.fallback_vector(text))
                } else {
                    None
                }
            })
            .collect();

        let pending: Vec<usize> = (0..texts.len()).filter(|&i| outcomes[i].is_none()).collect();
        for chunk in pending.chunks(self.batch) {
            let batch: Vec<&str> = chunk.iter().map(|&i| texts[i]).collect();
            let vectors = generator.generate_embeddings(&batch)?;
            if vectors.len() != batch.len() {
                return Err(VectorError::EmbeddingFailed(format!(
                    "generator returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            tracing::debug!("embedded batch of {} texts", batch.len());

            for (&index, mut vector) in chunk.iter().zip(vectors) {
                self.dimension.validate_vector(&vector)?;
                normalize(&mut vector);
                outcomes[index] = Some(Ok(vector));
            }
        }

        Ok(outcomes
            .into_iter()
            .map(|outcome| {
                outcome.unwrap_or_else(|| {
                    Err(VectorError::EmbeddingFailed("missing embedding".to_string()))
                })
            })
            .collect())
    }

    fn embed_words(&self, words: &WordVectors, text: &str) -> EmbeddingOutcome {
        let tokens = tokenize(text);
        let doc_len = tokens.len();

        let mut frequencies: HashMap<&str, usize> = HashMap::new();
        for token in &tokens {
            *frequencies.entry(token.as_str()).or_default() += 1;
        }

        let mut vector = vec![0.0f32; self.dimension.get()];
        let mut total = 0.0f32;
        for (token, tf) in frequencies {
            let Some(word) = words.lookup(token) else {
                continue;
            };
            let weight = self
                .scoring
                .weight(token, tf, doc_len)
                .unwrap_or(tf as f32);
            for (value, component) in vector.iter_mut().zip(&word) {
                *value += weight * component;
            }
            total += weight;
        }

        if total <= 0.0 {
            return self.fallback_vector(text);
        }

        for value in vector.iter_mut() {
            *value /= total;
        }
        normalize(&mut vector);
        Ok(vector)
    }

    fn fallback_vector(&self, text: &str) -> EmbeddingOutcome {
        match self.fallback {
            EmbeddingFallback::Zero => Ok(vec![0.0; self.dimension.get()]),
            EmbeddingFallback::Error => Err(VectorError::EmptyEmbedding {
                text: text.chars().take(64).collect(),
            }),
        }
    }

    /// Fits `components` principal components over `vectors` and applies the
    /// projection to them in place. Zero vectors are left as they are.
    pub fn fit_pca(&mut self, vectors: &mut [Vec<f32>], components: usize) {
        let fitted: Vec<Vec<f32>> = vectors
            .iter()
            .filter(|v| v.iter().any(|x| *x != 0.0))
            .cloned()
            .collect();
        self.pca = Pca::fit(&fitted, components);

        if let Some(pca) = &self.pca {
            for vector in vectors.iter_mut() {
                if vector.iter().any(|x| *x != 0.0) {
                    pca.apply(vector);
                }
            }
        }
    }

    pub fn clear_pca(&mut self) {
        self.pca = None;
    }

    #[must_use]
    pub fn pca(&self) -> Option<&Pca> {
        self.pca.as_ref()
    }

    pub fn set_pca(&mut self, pca: Option<Pca>) {
        self.pca = pca;
    }

    #[must_use]
    pub fn scoring(&self) -> &ScoringModel {
        &self.scoring
    }

    pub fn scoring_mut(&mut self) -> &mut ScoringModel {
        &mut self.scoring
    }

    pub fn set_scoring(&mut self, scoring: ScoringModel) {
        self.scoring = scoring;
    }
}
