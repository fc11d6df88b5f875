//! Bidirectional mapping between external document ids and row ids.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use bincode::{Decode, Encode};

use crate::error::{EmbeddingsError, EmbeddingsResult, ErrorContext};
use crate::types::{DocId, RowId};

/// File holding the id map inside a saved index directory.
pub const IDS_FILE: &str = "ids.bin";

/// Row ids are assigned from a monotonic counter and never reused, so the
/// counter is persisted alongside the live mappings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdMap {
    rows: BTreeMap<RowId, DocId>,
    ids: HashMap<DocId, RowId>,
    next: u32,
}

#[derive(Encode, Decode)]
struct IdMapFile {
    next: u32,
    rows: Vec<(RowId, DocId)>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: &DocId) -> Option<RowId> {
        self.ids.get(id).copied()
    }

    #[must_use]
    pub fn id(&self, row: RowId) -> Option<&DocId> {
        self.rows.get(&row)
    }

    /// Returns the row for `id`, allocating the next row id on first sight.
    pub fn assign(&mut self, id: &DocId) -> EmbeddingsResult<RowId> {
        if let Some(row) = self.get(id) {
            return Ok(row);
        }
        if self.next == u32::MAX {
            return Err(EmbeddingsError::RowIdExhausted);
        }

        let row = RowId::new(self.next);
        self.next += 1;
        self.rows.insert(row, id.clone());
        self.ids.insert(id.clone(), row);
        Ok(row)
    }

    pub fn remove(&mut self, id: &DocId) -> Option<RowId> {
        let row = self.ids.remove(id)?;
        self.rows.remove(&row);
        Some(row)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row id the next new document will receive.
    #[must_use]
    pub fn next_row(&self) -> u32 {
        self.next
    }

    /// Live mappings in row order.
    pub fn iter(&self) -> impl Iterator<Item = (RowId, &DocId)> {
        self.rows.iter().map(|(row, id)| (*row, id))
    }

    pub fn save(&self, path: &Path) -> EmbeddingsResult<()> {
        let file = IdMapFile {
            next: self.next,
            rows: self.iter().map(|(row, id)| (row, id.clone())).collect(),
        };
        let bytes = bincode::encode_to_vec(&file, bincode::config::standard()).save_context(path)?;
        std::fs::write(path, bytes).save_context(path)
    }

    pub fn load(path: &Path) -> EmbeddingsResult<Self> {
        let bytes = std::fs::read(path).load_context(path)?;
        let (file, _): (IdMapFile, usize) =
            bincode::decode_from_slice(&bytes, bincode::config::standard()).load_context(path)?;

        let mut map = Self {
            next: file.next,
            ..Self::default()
        };
        for (row, id) in file.rows {
            if row.get() >= file.next {
                return Err(EmbeddingsError::Storage {
                    path: path.to_path_buf(),
                    reason: format!("row {row} is beyond the saved counter {}", file.next),
                });
            }
            if map.ids.insert(id.clone(), row).is_some() || map.rows.insert(row, id).is_some() {
                return Err(EmbeddingsError::Storage {
                    path: path.to_path_buf(),
                    reason: format!("row {row} is mapped more than once"),
                });
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_assign_is_stable() {
        let mut ids = IdMap::new();
        assert_eq!(ids.assign(&DocId::from("a")).unwrap(), RowId::new(0));
        assert_eq!(ids.assign(&DocId::from(7)).unwrap(), RowId::new(1));
        assert_eq!(ids.assign(&DocId::from("a")).unwrap(), RowId::new(0));
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.id(RowId::new(1)), Some(&DocId::Int(7)));
    }

    #[test]
    fn test_rows_are_never_reused() {
        let mut ids = IdMap::new();
        ids.assign(&DocId::from(0)).unwrap();
        assert_eq!(ids.remove(&DocId::from(0)), Some(RowId::new(0)));
        assert_eq!(ids.remove(&DocId::from(0)), None);

        // Re-adding a deleted id allocates a fresh row
        assert_eq!(ids.assign(&DocId::from(0)).unwrap(), RowId::new(1));
        assert_eq!(ids.next_row(), 2);
    }

    #[test]
    fn test_save_and_load_keeps_counter() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(IDS_FILE);

        let mut ids = IdMap::new();
        for id in 0..3 {
            ids.assign(&DocId::from(id)).unwrap();
        }
        ids.remove(&DocId::from(2));
        ids.save(&path).unwrap();

        let mut loaded = IdMap::load(&path).unwrap();
        assert_eq!(loaded, ids);
        assert_eq!(loaded.assign(&DocId::from("new")).unwrap(), RowId::new(3));
        assert_eq!(loaded.assign(&DocId::from(1)).unwrap(), RowId::new(1));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(IDS_FILE);
        std::fs::write(&path, [0xff; 3]).unwrap();

        let err = IdMap::load(&path).unwrap_err();
        assert_eq!(err.status_code(), "LOAD_ERROR");
    }
}
