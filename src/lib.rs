/// The main library module for embedsql
pub mod ann;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod error;
pub mod query;
pub mod scoring;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use config::{EmbeddingsConfig, Settings};
pub use database::{Capabilities, ContentDatabase, Database, DatabaseError, NoopDatabase};
pub use embeddings::Embeddings;
pub use error::{EmbeddingsError, EmbeddingsResult};
pub use query::QueryError;
pub use scoring::{ScoringMethod, ScoringModel};
pub use types::{Content, DocId, Document, ResultRow, RowId};
pub use vector::{EmbeddingGenerator, ReadMode, VectorError, WordVectors};
