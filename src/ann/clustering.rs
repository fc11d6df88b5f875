//! K-means clustering for the inverted-file index.
//!
//! Cosine similarity is the distance metric and K-means++ picks the initial
//! centroids. The random source is seeded so training the same vectors always
//! yields the same centroids.
//!
//! # Algorithm Details
//! - Initialization: K-means++ over cosine distance
//! - Max iterations: 100
//! - Convergence: no assignment changes, or mean centroid movement below 1e-4

use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use thiserror::Error;

use crate::vector::{dot, normalize};

/// Maximum number of iterations for K-means clustering.
const MAX_ITERATIONS: usize = 100;

/// Convergence tolerance for centroid updates.
const CONVERGENCE_TOLERANCE: f32 = 1e-4;

/// Epsilon for floating-point comparisons.
const EPSILON: f32 = 1e-10;

const SEED: u64 = 0x1f_c3a7;

/// Result of K-means clustering operation.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Unit-length centroids, possibly fewer than requested when input vectors coincide.
    pub centroids: Vec<Vec<f32>>,

    /// Centroid index for each input vector.
    pub assignments: Vec<usize>,

    /// Number of iterations until convergence.
    pub iterations: usize,
}

/// Errors that can occur during clustering operations.
#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error(
        "Empty vector set provided for clustering\nSuggestion: Ensure vectors are indexed before training"
    )]
    EmptyVectorSet,

    #[error("Invalid cluster count: {0}\nSuggestion: Use k between 1 and the number of vectors")]
    InvalidClusterCount(usize),

    #[error(
        "Dimension mismatch in vectors\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch,
}

/// Clusters `vectors` into at most `k` groups.
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn kmeans_clustering(vectors: &[Vec<f32>], k: usize) -> Result<KMeansResult, ClusteringError> {
    let Some(first) = vectors.first() else {
        return Err(ClusteringError::EmptyVectorSet);
    };
    if k == 0 || k > vectors.len() {
        return Err(ClusteringError::InvalidClusterCount(k));
    }
    let dimension = first.len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch);
    }

    let mut rng = StdRng::seed_from_u64(SEED);
    let mut centroids = initialize_centroids(vectors, k, &mut rng);
    let mut assignments = vec![usize::MAX; vectors.len()];
    let mut iterations = 0;

    loop {
        iterations += 1;

        let next: Vec<usize> = vectors
            .par_iter()
            .map(|vector| nearest_centroid(vector, &centroids))
            .collect();

        let converged = next == assignments;
        assignments = next;
        if converged || iterations >= MAX_ITERATIONS {
            break;
        }

        let updated = update_centroids(vectors, &assignments, centroids.len(), &mut rng);
        let movement = centroid_movement(&centroids, &updated);
        centroids = updated;

        if movement < CONVERGENCE_TOLERANCE {
            assignments = vectors
                .par_iter()
                .map(|vector| nearest_centroid(vector, &centroids))
                .collect();
            break;
        }
    }

    if iterations >= MAX_ITERATIONS {
        tracing::warn!("k-means did not fully converge after {MAX_ITERATIONS} iterations");
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
    })
}

/// Index of the centroid most similar to `vector`. Ties go to the lower index.
pub fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_similarity = f32::NEG_INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let similarity = dot(vector, centroid);
        if similarity > best_similarity {
            best_similarity = similarity;
            best = index;
        }
    }
    best
}

/// Indexes of the `n` centroids most similar to `query`, best first.
pub fn nearest_centroids(query: &[f32], centroids: &[Vec<f32>], n: usize) -> Vec<usize> {
    let mut ranked: Vec<(usize, f32)> = centroids
        .iter()
        .enumerate()
        .map(|(index, centroid)| (index, dot(query, centroid)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(n).map(|(index, _)| index).collect()
}

fn update_centroids(
    vectors: &[Vec<f32>],
    assignments: &[usize],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut centroids = vec![vec![0.0; dimension]; k];
    let mut sizes = vec![0usize; k];

    for (vector, &cluster) in vectors.iter().zip(assignments) {
        for (sum, value) in centroids[cluster].iter_mut().zip(vector) {
            *sum += value;
        }
        sizes[cluster] += 1;
    }

    for (centroid, &size) in centroids.iter_mut().zip(&sizes) {
        if size == 0 {
            // Empty cluster: reseed from a random input vector
            *centroid = unit(&vectors[rng.random_range(0..vectors.len())]);
        } else {
            normalize(centroid);
        }
    }

    centroids
}

/// K-means++ seeding. Stops early when every remaining vector coincides with a centroid.
fn initialize_centroids(vectors: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(unit(&vectors[rng.random_range(0..vectors.len())]));

    while centroids.len() < k {
        let distances: Vec<f32> = vectors
            .iter()
            .map(|vector| {
                let unit_vector = unit(vector);
                let nearest = centroids
                    .iter()
                    .map(|centroid| 1.0 - dot(&unit_vector, centroid))
                    .fold(f32::MAX, f32::min)
                    .max(0.0);
                nearest * nearest
            })
            .collect();

        let total: f32 = distances.iter().sum();
        if total < EPSILON {
            break;
        }

        let target = rng.random::<f32>() * total;
        let mut cumulative = 0.0;
        let mut chosen = vectors.len() - 1;
        for (index, distance) in distances.iter().enumerate() {
            cumulative += distance;
            if cumulative >= target && *distance > 0.0 {
                chosen = index;
                break;
            }
        }
        centroids.push(unit(&vectors[chosen]));
    }

    centroids
}

fn centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new)
        .map(|(a, b)| 1.0 - dot(a, b))
        .sum::<f32>()
        / old.len() as f32
}

fn unit(vector: &[f32]) -> Vec<f32> {
    let mut copy = vector.to_vec();
    normalize(&mut copy);
    copy
}
