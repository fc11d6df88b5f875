//! Principal component removal.
//!
//! Fits the top principal components of the uncentered embedding matrix with
//! power iteration and deflation. Applying the projection subtracts each
//! vector's components along them and re-normalizes; dimensionality is preserved.

use super::{dot, normalize};
use bincode::{Decode, Encode};
use rand::{Rng, SeedableRng, rngs::StdRng};

const MAX_ITERATIONS: usize = 200;
const TOLERANCE: f32 = 1e-6;
const SEED: u64 = 0x5eed_0f_9ca;

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct Pca {
    components: Vec<Vec<f32>>,
}

impl Pca {
    /// Fits up to `k` components. Returns `None` when nothing can be fit.
    pub fn fit(vectors: &[Vec<f32>], k: usize) -> Option<Self> {
        let dimension = vectors.first()?.len();
        let k = k.min(dimension).min(vectors.len());
        if k == 0 || dimension == 0 {
            return None;
        }

        let mut data: Vec<Vec<f32>> = vectors.to_vec();
        let mut rng = StdRng::seed_from_u64(SEED);
        let mut components = Vec::with_capacity(k);

        for _ in 0..k {
            let Some(component) = leading_component(&data, dimension, &mut rng) else {
                break;
            };
            // Deflate: remove the found direction from every row
            for row in data.iter_mut() {
                let projection = dot(row, &component);
                for (x, c) in row.iter_mut().zip(&component) {
                    *x -= projection * c;
                }
            }
            components.push(component);
        }

        if components.is_empty() {
            None
        } else {
            tracing::debug!(
                "fit {} principal components over {} vectors",
                components.len(),
                vectors.len()
            );
            Some(Self { components })
        }
    }

    /// Removes the fitted components from `vector` and re-normalizes it.
    pub fn apply(&self, vector: &mut [f32]) {
        for component in &self.components {
            if component.len() != vector.len() {
                continue;
            }
            let projection = dot(vector, component);
            for (x, c) in vector.iter_mut().zip(component) {
                *x -= projection * c;
            }
        }
        normalize(vector);
    }

    pub fn components(&self) -> &[Vec<f32>] {
        &self.components
    }
}

/// Dominant eigenvector of `X^T X`, or `None` when the data has no energy left.
fn leading_component(data: &[Vec<f32>], dimension: usize, rng: &mut StdRng) -> Option<Vec<f32>> {
    let mut v: Vec<f32> = (0..dimension).map(|_| rng.random::<f32>() - 0.5).collect();
    normalize(&mut v);

    for _ in 0..MAX_ITERATIONS {
        let mut next = vec![0.0f32; dimension];
        for row in data {
            let weight = dot(row, &v);
            for (n, x) in next.iter_mut().zip(row) {
                *n += weight * x;
            }
        }

        let magnitude = next.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude <= f32::EPSILON {
            return None;
        }
        for n in next.iter_mut() {
            *n /= magnitude;
        }

        let delta: f32 = next.iter().zip(&v).map(|(a, b)| (a - b).abs()).sum();
        v = next;
        if delta < TOLERANCE {
            break;
        }
    }

    Some(v)
}
