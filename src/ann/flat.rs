//! Exact search: every live vector is scored against the query.

use std::path::Path;

use rayon::prelude::*;

use super::{AnnBackend, AnnIndex, VECTORS_FILE, VectorSet, rank};
use crate::types::RowId;
use crate::vector::{VectorDimension, VectorError};

#[derive(Debug, Clone)]
pub struct FlatIndex {
    vectors: VectorSet,
}

impl FlatIndex {
    pub fn new(dimension: VectorDimension, quantize: bool) -> Self {
        Self {
            vectors: VectorSet::new(dimension, quantize),
        }
    }

    pub(crate) fn from_vectors(vectors: VectorSet) -> Self {
        Self { vectors }
    }
}

impl AnnIndex for FlatIndex {
    fn backend(&self) -> AnnBackend {
        AnnBackend::Flat
    }

    fn dimension(&self) -> VectorDimension {
        self.vectors.dimension
    }

    fn add(&mut self, row: RowId, vector: Vec<f32>) -> Result<(), VectorError> {
        self.vectors.insert(row, vector)
    }

    fn remove(&mut self, rows: &[RowId]) -> usize {
        self.vectors.remove(rows)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(RowId, f32)>, VectorError> {
        self.vectors.dimension.validate_vector(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let live: Vec<_> = self.vectors.iter_live().collect();
        let scored: Vec<(RowId, f32)> = live
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
        tracing::debug!("compacted flat index, dropped {dropped} tombstones");
    }

    fn build(&mut self) -> Result<(), VectorError> {
        Ok(())
    }

    fn save(&self, dir: &Path) -> Result<(), VectorError> {
        self.vectors.save(&dir.join(VECTORS_FILE))
    }
}
