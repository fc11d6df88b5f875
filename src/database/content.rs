//! In-memory content store with bincode persistence.
//!
//! Rows live in a `BTreeMap` keyed by row id, so iteration order is insertion
//! order. Every insert, updates included, takes the next `entry` sequence
//! number.

use std::collections::BTreeMap;
use std::path::Path;

use bincode::{Decode, Encode};
use serde_json::{Map, Value as JsonValue};

use super::{Capabilities, Database, DatabaseError, Row};
use crate::query::{
    self, DATA_COLUMN, ENTRY_COLUMN, ID_COLUMN, RowSource, SelectStatement, Similarity,
    TEXT_COLUMN, Value,
};
use crate::types::{DocId, ResultRow, RowId};

/// File holding the rows inside a saved index directory.
pub const DOCUMENTS_FILE: &str = "documents.bin";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
struct StoredRow {
    id: DocId,
    text: Option<String>,
    data: Option<Map<String, JsonValue>>,
    entry: u64,
    vector: Option<Vec<f32>>,
}

/// On-disk row; data is kept as its JSON text.
#[derive(Encode, Decode)]
struct RowRecord {
    row: RowId,
    id: DocId,
    text: Option<String>,
    data: Option<String>,
    entry: u64,
    vector: Option<Vec<f32>>,
}

#[derive(Encode, Decode)]
struct DocumentsFile {
    version: u32,
    entry: u64,
    storevectors: bool,
    rows: Vec<RowRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct ContentDatabase {
    rows: BTreeMap<RowId, StoredRow>,
    entry: u64,
    storevectors: bool,
}

impl ContentDatabase {
    pub fn new(storevectors: bool) -> Self {
        Self {
            rows: BTreeMap::new(),
            entry: 0,
            storevectors,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn decode(bytes: &[u8]) -> Result<(BTreeMap<RowId, StoredRow>, u64, bool), DatabaseError> {
        let (file, _): (DocumentsFile, usize) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        if file.version != FORMAT_VERSION {
            return Err(DatabaseError::VersionMismatch {
                expected: FORMAT_VERSION,
                actual: file.version,
            });
        }

        let mut rows = BTreeMap::new();
        for record in file.rows {
            let data = match record.data {
                None => None,
                Some(json) => match serde_json::from_str::<JsonValue>(&json)
                    .map_err(|e| DatabaseError::Serialization(format!("row {}: {e}", record.row)))?
                {
                    JsonValue::Object(map) => Some(map),
                    _ => {
                        return Err(DatabaseError::Serialization(format!(
                            "row {}: data is not a JSON object",
                            record.row
                        )));
                    }
                },
            };
            rows.insert(
                record.row,
                StoredRow {
                    id: record.id,
                    text: record.text,
                    data,
                    entry: record.entry,
                    vector: record.vector,
                },
            );
        }
        Ok((rows, file.entry, file.storevectors))
    }
}

impl Database for ContentDatabase {
    fn capabilities(&self) -> Capabilities {
        let mut capabilities = Capabilities::CONTENT | Capabilities::QUERY | Capabilities::PERSIST;
        if self.storevectors {
            capabilities |= Capabilities::VECTORS;
        }
        capabilities
    }

    fn load(&mut self, dir: &Path) -> Result<(), DatabaseError> {
        let bytes = std::fs::read(dir.join(DOCUMENTS_FILE))?;
        let (rows, entry, storevectors) = Self::decode(&bytes)?;
        if storevectors != self.storevectors {
            tracing::warn!(
                "documents were saved with storevectors={storevectors}, configured {}",
                self.storevectors
            );
        }
        self.rows = rows;
        self.entry = entry;
        Ok(())
    }

    fn insert(&mut self, rows: Vec<(RowId, Row)>) -> Result<(), DatabaseError> {
        for (row, input) in rows {
            self.entry += 1;
            self.rows.insert(
                row,
                StoredRow {
                    id: input.id,
                    text: input.text,
                    data: input.data,
                    entry: self.entry,
                    vector: if self.storevectors { input.vector } else { None },
                },
            );
        }
        Ok(())
    }

    fn delete(&mut self, rows: &[RowId]) -> Result<usize, DatabaseError> {
        Ok(rows.iter().filter(|row| self.rows.remove(row).is_some()).count())
    }

    fn save(&self, dir: &Path) -> Result<(), DatabaseError> {
        let rows = self
            .rows
            .iter()
            .map(|(row, stored)| {
                Ok(RowRecord {
                    row: *row,
                    id: stored.id.clone(),
                    text: stored.text.clone(),
                    data: stored
                        .data
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()
                        .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
                    entry: stored.entry,
                    vector: stored.vector.clone(),
                })
            })
            .collect::<Result<Vec<_>, DatabaseError>>()?;

        let file = DocumentsFile {
            version: FORMAT_VERSION,
            entry: self.entry,
            storevectors: self.storevectors,
            rows,
        };
        let bytes = bincode::encode_to_vec(&file, bincode::config::standard())
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        std::fs::write(dir.join(DOCUMENTS_FILE), bytes)?;
        Ok(())
    }

    fn ids(&self) -> Result<Vec<(RowId, DocId)>, DatabaseError> {
        Ok(self
            .rows
            .iter()
            .map(|(row, stored)| (*row, stored.id.clone()))
            .collect())
    }

    fn resolve(&self, row: RowId) -> Result<Option<ResultRow>, DatabaseError> {
        Ok(self.rows.get(&row).map(|stored| {
            let mut result = ResultRow::new();
            result.insert(ID_COLUMN.to_string(), stored.id.to_json());
            result.insert(
                TEXT_COLUMN.to_string(),
                stored.text.clone().map_or(JsonValue::Null, JsonValue::String),
            );
            result.insert(
                DATA_COLUMN.to_string(),
                stored.data.clone().map_or(JsonValue::Null, JsonValue::Object),
            );
            result.insert(ENTRY_COLUMN.to_string(), JsonValue::from(stored.entry));
            result
        }))
    }

    fn embed(&self, row: RowId) -> Result<Option<Vec<f32>>, DatabaseError> {
        Ok(self.rows.get(&row).and_then(|stored| stored.vector.clone()))
    }

    fn execute(
        &self,
        statement: &SelectStatement,
        limit: usize,
        similarity: &dyn Similarity,
    ) -> Result<Vec<ResultRow>, DatabaseError> {
        Ok(query::execute(statement, self, similarity, limit)?)
    }

    fn count(&self) -> Result<usize, DatabaseError> {
        Ok(self.rows.len())
    }
}

impl RowSource for ContentDatabase {
    fn row_ids(&self) -> Vec<RowId> {
        self.rows.keys().copied().collect()
    }

    fn contains(&self, row: RowId) -> bool {
        self.rows.contains_key(&row)
    }

    fn column(&self, row: RowId, name: &str) -> Value {
        let Some(stored) = self.rows.get(&row) else {
            return Value::Null;
        };

        if name.eq_ignore_ascii_case(ID_COLUMN) {
            Value::from_json(&stored.id.to_json())
        } else if name.eq_ignore_ascii_case(TEXT_COLUMN) {
            stored.text.clone().map_or(Value::Null, Value::Text)
        } else if name.eq_ignore_ascii_case(DATA_COLUMN) {
            stored
                .data
                .as_ref()
                .map_or(Value::Null, |data| Value::Text(JsonValue::Object(data.clone()).to_string()))
        } else if name.eq_ignore_ascii_case(ENTRY_COLUMN) {
            Value::Integer(i64::try_from(stored.entry).unwrap_or(i64::MAX))
        } else {
            stored
                .data
                .as_ref()
                .map_or(Value::Null, |data| query::lookup_data(data, name))
        }
    }
}
