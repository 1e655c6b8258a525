//! A deterministic, dependency-free embedder used as a fallback and in
//! tests. Produces a stable unit-norm vector from shingled-token hashing
//! so retrieval's cosine scoring has something real to rank against,
//! rather than subcog's zero-vector fallback (which only serves a
//! BM25-style retrieval path CRT doesn't have).

use crate::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::Embedder;

const DEFAULT_DIMENSIONS: usize = 256;

/// Deterministic embedder: same text always yields the same vector, both
/// within a process and across processes.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Creates a hash embedder with the default dimensionality.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
        }
    }

    /// Creates a hash embedder with a custom dimensionality.
    #[must_use]
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn shingles(text: &str) -> Vec<String> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return vec![String::new()];
        }
        if tokens.len() == 1 {
            return vec![tokens[0].to_lowercase()];
        }
        tokens
            .windows(2)
            .map(|w| format!("{} {}", w[0].to_lowercase(), w[1].to_lowercase()))
            .collect()
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for shingle in Self::shingles(text) {
            let mut hasher = DefaultHasher::new();
            shingle.hash(&mut hasher);
            let digest = hasher.finish();
            let index = (digest as usize) % self.dimensions;
            let sign = if digest & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for component in &mut vector {
                *component /= norm;
            }
        }
        Ok(vector)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_same_text_same_vector() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("the quick brown fox").unwrap();
        let b = embedder.embed("the quick brown fox").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_text_different_vector() {
        let embedder = HashEmbedder::new();
        let a = embedder.embed("the quick brown fox").unwrap();
        let b = embedder.embed("a slow red turtle").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_vector_is_unit_norm() {
        let embedder = HashEmbedder::new();
        let v = embedder.embed("some reasonably long sentence to embed").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_does_not_panic() {
        let embedder = HashEmbedder::new();
        let v = embedder.embed("").unwrap();
        assert_eq!(v.len(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn test_dimensions_matches_configured() {
        let embedder = HashEmbedder::with_dimensions(64);
        assert_eq!(embedder.dimensions(), 64);
        assert_eq!(embedder.embed("hello world").unwrap().len(), 64);
    }
}
