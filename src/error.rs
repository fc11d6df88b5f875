//! Error types for the embeddings engine
//!
//! Each layer owns a thiserror enum (`VectorError`, `ScoringError`, `QueryError`,
//! `DatabaseError`); this module wraps them in the top-level error returned by the
//! orchestrator, with stable status codes and actionable recovery suggestions.

use crate::database::DatabaseError;
use crate::query::QueryError;
use crate::scoring::ScoringError;
use crate::vector::VectorError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for orchestrator operations
#[derive(Error, Debug)]
pub enum EmbeddingsError {
    /// Embedding, index and vector storage errors
    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    /// Query parsing and execution errors
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// File system errors
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Missing or corrupt persisted artifacts
    #[error("Failed to load index from '{path}': {reason}")]
    Storage { path: PathBuf, reason: String },

    #[error("Failed to persist index to '{path}': {reason}")]
    Persistence { path: PathBuf, reason: String },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    /// Row id space exhausted
    #[error("Failed to allocate row id: maximum row count reached")]
    RowIdExhausted,

    #[error("{0}")]
    General(String),
}

impl EmbeddingsError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Vector(VectorError::EmptyEmbedding { .. }) => "EMPTY_EMBEDDING",
            Self::Vector(VectorError::DimensionMismatch { .. }) => "DIMENSION_MISMATCH",
            Self::Vector(_) => "VECTOR_ERROR",
            Self::Scoring(_) => "SCORING_ERROR",
            Self::Query(QueryError::Syntax { .. }) => "QUERY_SYNTAX_ERROR",
            Self::Query(QueryError::Unsupported { .. } | QueryError::UnknownTable { .. }) => {
                "UNSUPPORTED"
            }
            Self::Query(_) => "QUERY_ERROR",
            Self::Database(DatabaseError::Unsupported { .. }) => "UNSUPPORTED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::FileWrite { .. } => "FILE_WRITE_ERROR",
            Self::Storage { .. } => "LOAD_ERROR",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::ConfigError { .. } => "CONFIG_ERROR",
            Self::RowIdExhausted => "ROW_ID_EXHAUSTED",
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Vector(VectorError::EmptyEmbedding { .. }) => vec![
                "Set 'fallback = \"zero\"' to index documents without known tokens",
                "Check that the word vectors were built from a corpus covering this text",
            ],
            Self::Vector(VectorError::DimensionMismatch { .. }) => vec![
                "Rebuild the index with the same model used to create it",
            ],
            Self::Query(QueryError::Syntax { .. }) => vec![
                "Check the query against the supported grammar: SELECT ... FROM txtai [WHERE ...]",
                "Quote string literals with single quotes",
            ],
            Self::Query(QueryError::UnknownTable { .. }) => {
                vec!["Queries must select from the virtual table 'txtai'"]
            }
            Self::Database(DatabaseError::Unsupported { .. }) => vec![
                "Enable content storage with 'content = true' to run SQL queries",
                "Free text queries work without content storage",
            ],
            Self::Storage { .. } => vec![
                "Check that the directory was written by 'save' and is complete",
                "Rebuild the index if the artifacts are corrupted",
            ],
            Self::Persistence { .. } | Self::FileWrite { .. } => vec![
                "Check disk space and permissions in the index directory",
            ],
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure the file is not locked by another process",
            ],
            Self::ConfigError { .. } => vec![
                "Review the [embeddings] section of the settings file",
                "Environment overrides use the EMBEDSQL_ prefix with '__' for nesting",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for orchestrator operations
pub type EmbeddingsResult<T> = Result<T, EmbeddingsError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T, EmbeddingsError>;

    /// Mark an error as a load failure for the artifact at `path`
    fn load_context(self, path: &std::path::Path) -> Result<T, EmbeddingsError>;

    /// Mark an error as a save failure for the artifact at `path`
    fn save_context(self, path: &std::path::Path) -> Result<T, EmbeddingsError>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> Result<T, EmbeddingsError> {
        self.map_err(|e| EmbeddingsError::General(format!("{msg}: {e}")))
    }

    fn load_context(self, path: &std::path::Path) -> Result<T, EmbeddingsError> {
        self.map_err(|e| EmbeddingsError::Storage {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn save_context(self, path: &std::path::Path) -> Result<T, EmbeddingsError> {
        self.map_err(|e| EmbeddingsError::Persistence {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
