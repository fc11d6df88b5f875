//! Symmetric per-vector 8-bit quantization.
//!
//! Each vector keeps one `f32` scale (`max|x| / 127`) and one `i8` code per
//! component. Scoring works directly on the codes: `scale * sum(code * q)`.

use serde::{Deserialize, Serialize};

/// Largest code magnitude.
const LEVELS: f32 = 127.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedVector {
    pub scale: f32,
    pub codes: Vec<i8>,
}

impl QuantizedVector {
    pub fn quantize(vector: &[f32]) -> Self {
        let max = vector.iter().fold(0.0f32, |acc, x| acc.max(x.abs()));
        if max == 0.0 {
            return Self {
                scale: 0.0,
                codes: vec![0; vector.len()],
            };
        }

        let scale = max / LEVELS;
        let codes = vector
            .iter()
            .map(|x| (x / scale).round().clamp(-LEVELS, LEVELS) as i8)
            .collect();

        Self { scale, codes }
    }

    pub fn dequantize(&self) -> Vec<f32> {
        self.codes
            .iter()
            .map(|&code| f32::from(code) * self.scale)
            .collect()
    }

    /// Dot product against a full-precision query.
    #[inline]
    pub fn dot(&self, query: &[f32]) -> f32 {
        let sum: f32 = self
            .codes
            .iter()
            .zip(query)
            .map(|(&code, q)| f32::from(code) * q)
            .sum();
        sum * self.scale
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// A vector as held by the nearest-neighbor index.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredVector {
    Full(Vec<f32>),
    Quantized(QuantizedVector),
}

impl StoredVector {
    pub fn new(vector: Vec<f32>, quantize: bool) -> Self {
        if quantize {
            Self::Quantized(QuantizedVector::quantize(&vector))
        } else {
            Self::Full(vector)
        }
    }

    #[inline]
    pub fn score(&self, query: &[f32]) -> f32 {
        match self {
            Self::Full(vector) => super::dot(vector, query),
            Self::Quantized(quantized) => quantized.dot(query),
        }
    }

    /// Full-precision view (reconstructed for quantized vectors).
    pub fn to_vec(&self) -> Vec<f32> {
        match self {
            Self::Full(vector) => vector.clone(),
            Self::Quantized(quantized) => quantized.dequantize(),
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            Self::Full(vector) => vector.len(),
            Self::Quantized(quantized) => quantized.len(),
        }
    }

    pub fn is_quantized(&self) -> bool {
        matches!(self, Self::Quantized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::normalize;

    #[test]
    fn test_quantize_roundtrip_error_is_bounded() {
        let mut vector = vec![0.9, -0.3, 0.05, 0.0, -0.7];
        normalize(&mut vector);

        let quantized = QuantizedVector::quantize(&vector);
        let restored = quantized.dequantize();

        for (original, restored) in vector.iter().zip(&restored) {
            assert!((original - restored).abs() <= quantized.scale / 2.0 + 1e-6);
        }
    }

    #[test]
    fn test_zero_vector() {
        let quantized = QuantizedVector::quantize(&[0.0, 0.0, 0.0]);
        assert_eq!(quantized.scale, 0.0);
        assert_eq!(quantized.dot(&[1.0, 1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_quantized_ranking_matches_full_precision() {
        let query = {
            let mut q = vec![1.0, 0.2, 0.0, 0.1];
            normalize(&mut q);
            q
        };
        let candidates: Vec<Vec<f32>> = [
            vec![1.0, 0.1, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.5, 0.5, 0.5, 0.5],
        ]
        .into_iter()
        .map(|mut v| {
            normalize(&mut v);
            v
        })
        .collect();

        let rank = |quantize: bool| {
            let mut scored: Vec<(usize, f32)> = candidates
                .iter()
                .enumerate()
                .map(|(i, v)| (i, StoredVector::new(v.clone(), quantize).score(&query)))
                .collect();
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));
            scored.into_iter().map(|(i, _)| i).collect::<Vec<_>>()
        };

        assert_eq!(rank(false), rank(true));
    }
}
