//! Vector model: text to fixed-length, unit-normalized vectors.
//!
//! # Architecture
//! A [`VectorModel`] wraps one of two backends. The transformer backend calls an
//! [`EmbeddingGenerator`] (fastembed by default); the words backend averages
//! vectors from a memory-mapped [`WordVectors`] container, weighted by the
//! scoring model. Principal component removal and 8-bit quantization live here
//! as well and are applied by the orchestrator and the nearest-neighbor index.

mod embedding;
mod model;
pub mod pca;
pub mod quantize;
mod tokenize;
mod types;
mod words;

// Re-export core types for public API
#[cfg(test)]
pub use embedding::MockEmbeddingGenerator;
pub use embedding::{EmbeddingGenerator, FastEmbedGenerator, parse_embedding_model};
pub use model::{EmbeddingOutcome, ModelBackend, VectorModel};
pub use quantize::{QuantizedVector, StoredVector};
pub use tokenize::{is_stop_word, tokenize};
pub use types::{
    EmbeddingFallback, VECTOR_DIMENSION_384, VectorDimension, VectorError, dot, normalize,
};
pub use words::{ReadMode, WordVectors};
