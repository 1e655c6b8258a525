//! The embedding capability: a trait boundary plus a dependency-free
//! fallback and a caching wrapper. No concrete model ships — callers
//! inject a real `Embedder` in production and fall back to
//! [`HashEmbedder`] for tests and offline operation.

mod caching;
mod hash;

pub use caching::CachingEmbedder;
pub use hash::HashEmbedder;

use crate::Result;

/// Capability boundary for turning text into a dense, unit-norm vector.
///
/// Grounded on subcog's `Embedder` trait: a minimal surface so both a
/// vendored-model implementation and a test fallback can satisfy it.
pub trait Embedder: Send + Sync {
    /// The fixed dimensionality of vectors this embedder produces.
    fn dimensions(&self) -> usize;

    /// Embeds one piece of text.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmbeddingUnavailable` if the underlying capability
    /// cannot currently serve requests.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds a batch of texts. The default implementation calls
    /// [`Embedder::embed`] once per item; implementations backed by a
    /// batching-capable model should override this.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmbeddingUnavailable` if any item fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Computes the cosine similarity between two equal-length vectors.
/// Returns `0.0` for a zero-length or zero-norm input rather than `NaN`.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical_vectors() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_orthogonal_vectors() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_mismatched_length_is_zero() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![1.0_f32, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_similarity_zero_vector_is_zero() {
        let a = vec![0.0_f32, 0.0];
        let b = vec![1.0_f32, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
