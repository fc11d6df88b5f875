//! Approximate nearest-neighbor index keyed by row id.
//!
//! Two backends implement [`AnnIndex`]: [`FlatIndex`] scores every live vector
//! (exact) and [`IvfIndex`] scans only the clusters nearest the query. Both
//! tombstone removed rows until [`AnnIndex::compact`] and rank results by score
//! descending, then row id ascending.

mod clustering;
mod flat;
mod ivf;
mod storage;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::RowId;
use crate::vector::{StoredVector, VectorDimension, VectorError};

pub use clustering::{ClusteringError, KMeansResult, kmeans_clustering, nearest_centroid};
pub use flat::FlatIndex;
pub use ivf::IvfIndex;
pub use storage::{MmapVectorStorage, VectorEntry};

/// File holding the index vectors inside a saved index directory.
pub const VECTORS_FILE: &str = "embeddings.vec";

/// File holding IVF centroids and cluster assignments.
pub const IVF_FILE: &str = "ivf.bin";

/// Index backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnBackend {
    /// Exact brute-force search
    #[default]
    Flat,
    /// Inverted file over k-means clusters
    Ivf,
}

/// Nearest-neighbor index over unit vectors.
pub trait AnnIndex: Debug + Send + Sync {
    fn backend(&self) -> AnnBackend;

    fn dimension(&self) -> VectorDimension;

    /// Inserts or replaces the vector for `row`, clearing any tombstone.
    fn add(&mut self, row: RowId, vector: Vec<f32>) -> Result<(), VectorError>;

    /// Tombstones live rows. Unknown or already removed rows are ignored.
    fn remove(&mut self, rows: &[RowId]) -> usize;

    /// Up to `k` live rows ranked by score descending, then row id ascending.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(RowId, f32)>, VectorError>;

    /// Number of live rows.
    fn count(&self) -> usize;

    /// Drops tombstoned rows from storage.
    fn compact(&mut self);

    /// Retrains any search structure over the live rows.
    fn build(&mut self) -> Result<(), VectorError>;

    /// Writes the index files into `dir`.
    fn save(&self, dir: &Path) -> Result<(), VectorError>;
}

/// Creates an empty index.
pub fn create(
    backend: AnnBackend,
    dimension: VectorDimension,
    quantize: bool,
    nprobe: usize,
) -> Box<dyn AnnIndex> {
    match backend {
        AnnBackend::Flat => Box::new(FlatIndex::new(dimension, quantize)),
        AnnBackend::Ivf => Box::new(IvfIndex::new(dimension, quantize, nprobe)),
    }
}

/// Loads an index saved with [`AnnIndex::save`].
pub fn load(backend: AnnBackend, dir: &Path, nprobe: usize) -> Result<Box<dyn AnnIndex>, VectorError> {
    let vectors = VectorSet::load(&dir.join(VECTORS_FILE))?;
    Ok(match backend {
        AnnBackend::Flat => Box::new(FlatIndex::from_vectors(vectors)),
        AnnBackend::Ivf => Box::new(IvfIndex::load(vectors, &dir.join(IVF_FILE), nprobe)?),
    })
}

/// Row-keyed vectors with tombstones, shared by both backends.
#[derive(Debug, Clone)]
pub(crate) struct VectorSet {
    dimension: VectorDimension,
    quantize: bool,
    entries: BTreeMap<RowId, VectorEntry>,
    live: usize,
}

impl VectorSet {
    pub(crate) fn new(dimension: VectorDimension, quantize: bool) -> Self {
        Self {
            dimension,
            quantize,
            entries: BTreeMap::new(),
            live: 0,
        }
    }

    fn load(path: &Path) -> Result<Self, VectorError> {
        let storage = MmapVectorStorage::open(path)?;
        let entries = storage.read_all_vectors();
        let live = entries.values().filter(|entry| !entry.deleted).count();
        Ok(Self {
            dimension: storage.dimension(),
            quantize: storage.is_quantized(),
            entries,
            live,
        })
    }

    fn save(&self, path: &Path) -> Result<(), VectorError> {
        MmapVectorStorage::write(path, self.dimension, self.quantize, &self.entries)
    }

    fn insert(&mut self, row: RowId, vector: Vec<f32>) -> Result<(), VectorError> {
        self.dimension.validate_vector(&vector)?;
        let entry = VectorEntry {
            vector: StoredVector::new(vector, self.quantize),
            deleted: false,
        };
        match self.entries.insert(row, entry) {
            Some(previous) if !previous.deleted => {}
            _ => self.live += 1,
        }
        Ok(())
    }

    fn remove(&mut self, rows: &[RowId]) -> usize {
        let mut removed = 0;
        for row in rows {
            if let Some(entry) = self.entries.get_mut(row) {
                if !entry.deleted {
                    entry.deleted = true;
                    removed += 1;
                }
            }
        }
        self.live -= removed;
        removed
    }

    fn compact(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.deleted);
        before - self.entries.len()
    }

    fn get(&self, row: RowId) -> Option<&StoredVector> {
        self.entries
            .get(&row)
            .filter(|entry| !entry.deleted)
            .map(|entry| &entry.vector)
    }

    fn iter_live(&self) -> impl Iterator<Item = (RowId, &StoredVector)> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.deleted)
            .map(|(row, entry)| (*row, &entry.vector))
    }

    fn is_live(&self, row: RowId) -> bool {
        self.get(row).is_some()
    }
}

/// Sorts by score descending, then row id ascending, and keeps the first `k`.
pub(crate) fn rank(mut scored: Vec<(RowId, f32)>, k: usize) -> Vec<(RowId, f32)> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::normalize;
    use tempfile::TempDir;

    fn unit(values: &[f32]) -> Vec<f32> {
        let mut v = values.to_vec();
        normalize(&mut v);
        v
    }

    #[test]
    fn test_rank_breaks_ties_by_row() {
        let ranked = rank(
            vec![
                (RowId::new(5), 0.5),
                (RowId::new(2), 0.9),
                (RowId::new(1), 0.5),
                (RowId::new(7), 0.1),
            ],
            3,
        );
        assert_eq!(
            ranked,
            vec![(RowId::new(2), 0.9), (RowId::new(1), 0.5), (RowId::new(5), 0.5)]
        );
    }

    #[test]
    fn test_backends_agree_on_small_sets() {
        let dimension = VectorDimension::new(4).unwrap();
        let vectors = [
            unit(&[1.0, 0.0, 0.0, 0.0]),
            unit(&[0.9, 0.1, 0.0, 0.0]),
            unit(&[0.0, 1.0, 0.0, 0.0]),
            unit(&[0.0, 0.0, 1.0, 0.2]),
            unit(&[0.0, 0.0, 0.1, 1.0]),
        ];

        let mut flat = create(AnnBackend::Flat, dimension, false, 4);
        // Probing every cluster makes IVF exact
        let mut ivf = create(AnnBackend::Ivf, dimension, false, 100);
        for (row, vector) in vectors.iter().enumerate() {
            flat.add(RowId::new(row as u32), vector.clone()).unwrap();
            ivf.add(RowId::new(row as u32), vector.clone()).unwrap();
        }
        flat.build().unwrap();
        ivf.build().unwrap();

        let query = unit(&[1.0, 0.05, 0.0, 0.0]);
        assert_eq!(flat.search(&query, 3).unwrap(), ivf.search(&query, 3).unwrap());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let dimension = VectorDimension::new(3).unwrap();

        for backend in [AnnBackend::Flat, AnnBackend::Ivf] {
            let dir = temp_dir.path().join(format!("{backend:?}"));
            std::fs::create_dir_all(&dir).unwrap();

            let mut index = create(backend, dimension, true, 2);
            index.add(RowId::new(0), unit(&[1.0, 0.0, 0.0])).unwrap();
            index.add(RowId::new(1), unit(&[0.0, 1.0, 0.0])).unwrap();
            index.add(RowId::new(2), unit(&[0.7, 0.7, 0.0])).unwrap();
            index.remove(&[RowId::new(1)]);
            index.build().unwrap();
            index.save(&dir).unwrap();

            let loaded = load(backend, &dir, 2).unwrap();
            assert_eq!(loaded.count(), 2);
            let query = unit(&[0.9, 0.3, 0.0]);
            assert_eq!(
                loaded.search(&query, 5).unwrap(),
                index.search(&query, 5).unwrap()
            );
        }
    }

    #[test]
    fn test_zero_k_and_dimension_checks() {
        let dimension = VectorDimension::new(2).unwrap();
        let mut index = create(AnnBackend::Flat, dimension, false, 1);
        index.add(RowId::new(0), vec![1.0, 0.0]).unwrap();

        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
        assert!(index.add(RowId::new(1), vec![1.0, 0.0, 0.0]).is_err());
        assert!(index.search(&[1.0], 1).is_err());
    }
}
