//! Content storage behind a capability interface.
//!
//! The orchestrator talks to a [`Database`] and checks [`Capabilities`] before
//! relying on content, queries or persistence. [`NoopDatabase`] is used when
//! content storage is disabled; [`ContentDatabase`] keeps rows in memory and
//! answers SQL over the `txtai` virtual table.

mod content;
mod noop;

use std::fmt::Debug;
use std::path::Path;

use bitflags::bitflags;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::query::{self, QueryError, SelectStatement, Similarity};
use crate::types::{DocId, ResultRow, RowId};

pub use content::{ContentDatabase, DOCUMENTS_FILE};
pub use noop::NoopDatabase;

bitflags! {
    /// Operations a database supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Capabilities: u8 {
        /// Stores row text and data
        const CONTENT = 1 << 0;
        /// Executes SQL queries
        const QUERY = 1 << 1;
        /// Saves and loads its rows
        const PERSIST = 1 << 2;
        /// Keeps original full-precision vectors
        const VECTORS = 1 << 3;
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Operation '{operation}' is not supported without content storage")]
    Unsupported { operation: String },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Failed to serialize documents: {0}")]
    Serialization(String),

    #[error("Unsupported documents format version {actual} (expected {expected})")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Documents I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    pub(crate) fn unsupported(operation: &str) -> Self {
        Self::Unsupported {
            operation: operation.to_string(),
        }
    }
}

/// A row to store under an orchestrator-assigned row id.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: DocId,
    pub text: Option<String>,
    pub data: Option<Map<String, Value>>,
    /// Original vector, kept when vector storage is enabled
    pub vector: Option<Vec<f32>>,
}

/// Content store keyed by row id.
pub trait Database: Debug + Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Replaces the current rows with the ones saved under `dir`.
    fn load(&mut self, dir: &Path) -> Result<(), DatabaseError>;

    /// Inserts rows, overwriting any row with the same row id.
    fn insert(&mut self, rows: Vec<(RowId, Row)>) -> Result<(), DatabaseError>;

    /// Deletes rows, returning how many existed.
    fn delete(&mut self, rows: &[RowId]) -> Result<usize, DatabaseError>;

    fn save(&self, dir: &Path) -> Result<(), DatabaseError>;

    /// Row id and external id of every stored row, in row order.
    fn ids(&self) -> Result<Vec<(RowId, DocId)>, DatabaseError>;

    /// The stored row as a result map with `id`, `text`, `data` and `entry`.
    fn resolve(&self, row: RowId) -> Result<Option<ResultRow>, DatabaseError>;

    /// Original vector of `row`, when vectors are stored.
    fn embed(&self, row: RowId) -> Result<Option<Vec<f32>>, DatabaseError>;

    /// Translates and runs a free-text or SQL query.
    fn query(
        &self,
        sql: &str,
        limit: usize,
        similarity: &dyn Similarity,
    ) -> Result<Vec<ResultRow>, DatabaseError> {
        let statement = query::translate(sql, limit)?;
        self.execute(&statement, limit, similarity)
    }

    fn execute(
        &self,
        statement: &SelectStatement,
        limit: usize,
        similarity: &dyn Similarity,
    ) -> Result<Vec<ResultRow>, DatabaseError>;

    fn count(&self) -> Result<usize, DatabaseError>;
}
