//! Inverted-file index over k-means clusters.
//!
//! Training clusters the live vectors into `sqrt(n)` groups (clamped to
//! [1, 100]); a query scans only the `nprobe` clusters whose centroids are
//! closest. Rows added after training join their nearest centroid. Before
//! the first training every live row is scanned.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use bincode::{Decode, Encode};
use rayon::prelude::*;

use super::clustering::{kmeans_clustering, nearest_centroid, nearest_centroids};
use super::{AnnBackend, AnnIndex, IVF_FILE, VECTORS_FILE, VectorSet, rank};
use crate::types::RowId;
use crate::vector::{VectorDimension, VectorError};

/// Minimum number of clusters for K-means clustering.
const MIN_CLUSTERS: usize = 1;

/// Maximum number of clusters for K-means clustering.
const MAX_CLUSTERS: usize = 100;

#[derive(Debug, Clone)]
pub struct IvfIndex {
    vectors: VectorSet,
    centroids: Vec<Vec<f32>>,
    assignments: BTreeMap<RowId, usize>,
    nprobe: usize,
}

/// Persisted training state.
#[derive(Encode, Decode)]
struct IvfState {
    centroids: Vec<Vec<f32>>,
    assignments: Vec<(RowId, u32)>,
}

impl IvfIndex {
    pub fn new(dimension: VectorDimension, quantize: bool, nprobe: usize) -> Self {
        Self {
            vectors: VectorSet::new(dimension, quantize),
            centroids: Vec::new(),
            assignments: BTreeMap::new(),
            nprobe: nprobe.max(1),
        }
    }

    pub(crate) fn load(vectors: VectorSet, path: &Path, nprobe: usize) -> Result<Self, VectorError> {
        let bytes = std::fs::read(path)?;
        let (state, _): (IvfState, usize) =
            bincode::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| VectorError::Serialization(format!("Failed to decode {}: {e}", path.display())))?;

        for centroid in &state.centroids {
            vectors.dimension.validate_vector(centroid)?;
        }
        let clusters = state.centroids.len();
        let assignments: BTreeMap<RowId, usize> = state
            .assignments
            .into_iter()
            .map(|(row, cluster)| {
                let cluster = cluster as usize;
                if cluster < clusters {
                    Ok((row, cluster))
                } else {
                    Err(VectorError::Serialization(format!(
                        "row {row} assigned to missing cluster {cluster}"
                    )))
                }
            })
            .collect::<Result<_, VectorError>>()?;

        Ok(Self {
            vectors,
            centroids: state.centroids,
            assignments,
            nprobe: nprobe.max(1),
        })
    }

    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.centroids.len()
    }

    #[must_use]
    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }
}

impl AnnIndex for IvfIndex {
    fn backend(&self) -> AnnBackend {
        AnnBackend::Ivf
    }

    fn dimension(&self) -> VectorDimension {
        self.vectors.dimension
    }

    fn add(&mut self, row: RowId, vector: Vec<f32>) -> Result<(), VectorError> {
        if self.is_trained() {
            let cluster = nearest_centroid(&vector, &self.centroids);
            self.vectors.insert(row, vector)?;
            self.assignments.insert(row, cluster);
        } else {
            self.vectors.insert(row, vector)?;
        }
        Ok(())
    }

    fn remove(&mut self, rows: &[RowId]) -> usize {
        self.vectors.remove(rows)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(RowId, f32)>, VectorError> {
        self.vectors.dimension.validate_vector(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let probes: HashSet<usize> = nearest_centroids(query, &self.centroids, self.nprobe)
            .into_iter()
            .collect();

        let candidates: Vec<_> = self
            .vectors
            .iter_live()
            .filter(|(row, _)| {
                !self.is_trained()
                    || self
                        .assignments
                        .get(row)
                        .is_none_or(|cluster| probes.contains(cluster))
            })
            .collect();

        let scored: Vec<(RowId, f32)> = candidates
            .par_iter()
            .map(|(row, vector)| (*row, vector.score(query)))
            .collect();

        Ok(rank(scored, k))
    }

    fn count(&self) -> usize {
        self.vectors.live
    }

    fn compact(&mut self) {
        let dropped = self.vectors.compact();
        let vectors = &self.vectors;
        self.assignments.retain(|row, _| vectors.is_live(*row));
        tracing::debug!("compacted ivf index, dropped {dropped} tombstones");
    }

    fn build(&mut self) -> Result<(), VectorError> {
        let (rows, data): (Vec<RowId>, Vec<Vec<f32>>) = self
            .vectors
            .iter_live()
            .map(|(row, vector)| (row, vector.to_vec()))
            .unzip();

        self.assignments.clear();
        if data.is_empty() {
            self.centroids.clear();
            return Ok(());
        }

        let k = ((data.len() as f32).sqrt().ceil() as usize)
            .clamp(MIN_CLUSTERS, MAX_CLUSTERS)
            .min(data.len());
        let result =
            kmeans_clustering(&data, k).map_err(|e| VectorError::ClusteringFailed(e.to_string()))?;

        self.centroids = result.centroids;
        self.assignments = rows.into_iter().zip(result.assignments).collect();

        tracing::debug!(
            "trained {} clusters over {} vectors in {} iterations",
            self.centroids.len(),
            data.len(),
            result.iterations
        );
        Ok(())
    }

    fn save(&self, dir: &Path) -> Result<(), VectorError> {
        self.vectors.save(&dir.join(VECTORS_FILE))?;

        let state = IvfState {
            centroids: self.centroids.clone(),
            assignments: self
                .assignments
                .iter()
                .map(|(row, cluster)| (*row, *cluster as u32))
                .collect(),
        };
        let bytes = bincode::encode_to_vec(&state, bincode::config::standard())
            .map_err(|e| VectorError::Serialization(e.to_string()))?;
        std::fs::write(dir.join(IVF_FILE), bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::normalize;

    fn unit(values: &[f32]) -> Vec<f32> {
        let mut v = values.to_vec();
        normalize(&mut v);
        v
    }

    fn clustered(nprobe: usize) -> IvfIndex {
        let mut index = IvfIndex::new(VectorDimension::new(3).unwrap(), false, nprobe);
        let mut row = 0;
        for axis in 0..3 {
            for jitter in [0.0, 0.05, 0.1] {
                let mut values = [jitter; 3];
                values[axis] = 1.0;
                index.add(RowId::new(row), unit(&values)).unwrap();
                row += 1;
            }
        }
        index.build().unwrap();
        index
    }

    #[test]
    fn test_untrained_index_scans_everything() {
        let mut index = IvfIndex::new(VectorDimension::new(2).unwrap(), false, 1);
        index.add(RowId::new(0), unit(&[1.0, 0.0])).unwrap();
        index.add(RowId::new(1), unit(&[0.0, 1.0])).unwrap();
        assert!(!index.is_trained());
        assert_eq!(index.search(&unit(&[0.0, 1.0]), 2).unwrap().len(), 2);
    }

    #[test]
    fn test_training_creates_sqrt_clusters() {
        let index = clustered(1);
        // ceil(sqrt(9)) = 3
        assert_eq!(index.cluster_count(), 3);
        assert_eq!(index.assignments.len(), 9);
    }

    #[test]
    fn test_search_finds_nearest_in_searched_clusters() {
        let index = clustered(1);
        let results = index.search(&unit(&[0.0, 1.0, 0.0]), 1).unwrap();
        assert_eq!(results[0].0, RowId::new(3));
    }

    #[test]
    fn test_rows_added_after_training_are_searchable() {
        let mut index = clustered(1);
        index.add(RowId::new(100), unit(&[0.0, 0.0, 1.0])).unwrap();
        let results = index.search(&unit(&[0.0, 0.0, 1.0]), 1).unwrap();
        assert_eq!(results[0].0, RowId::new(6));

        index.remove(&[RowId::new(6)]);
        let results = index.search(&unit(&[0.0, 0.0, 1.0]), 1).unwrap();
        assert_eq!(results[0].0, RowId::new(100));
    }

    #[test]
    fn test_compact_drops_assignments() {
        let mut index = clustered(3);
        index.remove(&[RowId::new(0), RowId::new(1)]);
        index.compact();
        assert_eq!(index.count(), 7);
        assert_eq!(index.assignments.len(), 7);
    }
}
