//! Embedding generation for the transformer backend.
//!
//! This module provides the trait the vector model delegates to and a
//! fastembed-backed implementation selected by model name.

use crate::vector::{VectorDimension, VectorError};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;

/// Trait for generating embeddings from text.
///
/// Implementations of this trait should be thread-safe and
/// capable of handling batch processing efficiently.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts.
    ///
    /// # Arguments
    /// * `texts` - Slice of text strings to generate embeddings for
    ///
    /// # Returns
    /// A vector of embeddings, one for each input text, or an error
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;
}

/// FastEmbed implementation.
///
/// The model is resolved from its name with [`parse_embedding_model`] and
/// downloaded on first use.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
}

impl FastEmbedGenerator {
    /// Create a generator for the named model using fastembed's default cache.
    ///
    /// # Errors
    /// Returns an error if the name is unknown or the model fails to initialize.
    pub fn new(name: &str) -> Result<Self, VectorError> {
        Self::build(name, InitOptions::new(parse_embedding_model(name)?))
    }

    fn build(name: &str, options: InitOptions) -> Result<Self, VectorError> {
        let mut model = TextEmbedding::try_new(options.with_show_download_progress(false))
            .map_err(|e| VectorError::EmbeddingFailed(
                format!("Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download")
            ))?;

        // Embed once so the dimension is known before any document arrives
        let sample = model
            .embed(vec!["dimension check"], None)
            .map_err(|e| VectorError::EmbeddingFailed(format!("Failed to embed sample text: {e}")))?;
        let dimension = VectorDimension::new(sample.first().map_or(0, Vec::len))?;

        tracing::info!("loaded embedding model {name} ({} dimensions)", dimension.get());

        Ok(Self {
            model: Mutex::new(model),
            dimension,
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .lock()
            .embed(texts.to_vec(), None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        // Validate dimensions
        for embedding in embeddings.iter() {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Resolve a model name to a fastembed model.
///
/// Accepts the fastembed variant name (`AllMiniLML6V2`) or the Hugging Face
/// repository name (`sentence-transformers/all-MiniLM-L6-v2`), case-insensitive.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    let key = name.trim().to_lowercase();
    let key = key.rsplit('/').next().unwrap_or(&key).replace(['-', '_', '.'], "");

    let model = match key.as_str() {
        "allminilml6v2" => EmbeddingModel::AllMiniLML6V2,
        "allminilml12v2" => EmbeddingModel::AllMiniLML12V2,
        "bgesmallenv15" => EmbeddingModel::BGESmallENV15,
        "bgebaseenv15" => EmbeddingModel::BGEBaseENV15,
        "bgelargeenv15" => EmbeddingModel::BGELargeENV15,
        "paraphrasemultilingualminilml12v2" | "paraphrasemlminilml12v2" => {
            EmbeddingModel::ParaphraseMLMiniLML12V2
        }
        "nomicembedtextv15" => EmbeddingModel::NomicEmbedTextV15,
        "multilinguale5small" => EmbeddingModel::MultilingualE5Small,
        "multilinguale5base" => EmbeddingModel::MultilingualE5Base,
        "multilinguale5large" => EmbeddingModel::MultilingualE5Large,
        "mxbaiembedlargev1" => EmbeddingModel::MxbaiEmbedLargeV1,
        _ => return Err(VectorError::UnknownModel(name.to_string())),
    };
    Ok(model)
}

/// Mock embedding generator for testing.
///
/// Hashes each token into a bucket so texts sharing words score higher.
#[cfg(test)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
}

#[cfg(test)]
impl Default for MockEmbeddingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MockEmbeddingGenerator {
    /// Create a new mock generator with 32 dimensions.
    #[must_use]
    pub fn new() -> Self {
        Self::with_dimension(VectorDimension::new(32).expect("non-zero"))
    }

    /// Create a generator with custom dimension for testing.
    #[must_use]
    pub fn with_dimension(dimension: VectorDimension) -> Self {
        Self { dimension }
    }
}

#[cfg(test)]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        use std::hash::{DefaultHasher, Hash, Hasher};

        let dim = self.dimension.get();
        Ok(texts
            .iter()
            .map(|text| {
                let mut embedding = vec![0.0; dim];
                for token in crate::vector::tokenize(text) {
                    let mut hasher = DefaultHasher::new();
                    token.hash(&mut hasher);
                    embedding[(hasher.finish() as usize) % dim] += 1.0;
                }
                crate::vector::normalize(&mut embedding);
                embedding
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}
