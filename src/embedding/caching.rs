//! An `lru`-backed caching wrapper around any [`Embedder`], grounded on
//! subcog's use of `lru` for its query-embedding cache.

use super::Embedder;
use crate::Result;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Wraps an [`Embedder`], caching results by a hash of the input text so
/// repeated retrieval/extraction calls over the same utterance don't
/// re-embed it.
pub struct CachingEmbedder<E: Embedder> {
    inner: E,
    cache: Mutex<LruCache<u64, Vec<f32>>>,
}

impl<E: Embedder> CachingEmbedder<E> {
    /// Wraps `inner` with the default cache capacity.
    #[must_use]
    pub fn new(inner: E) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_CAPACITY)
    }

    /// Wraps `inner` with a custom cache capacity.
    #[must_use]
    pub fn with_capacity(inner: E, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn hash_text(text: &str) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        hasher.finish()
    }
}

impl<E: Embedder> Embedder for CachingEmbedder<E> {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = Self::hash_text(text);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return Ok(hit.clone());
            }
        }
        let embedding = self.inner.embed(text)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, embedding.clone());
        }
        Ok(embedding)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        inner: HashEmbedder,
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text)
        }
    }

    #[test]
    fn test_cache_hit_avoids_recomputation() {
        let counting = CountingEmbedder {
            inner: HashEmbedder::new(),
            calls: AtomicUsize::new(0),
        };
        let cached = CachingEmbedder::new(counting);
        let a = cached.embed("hello world").unwrap();
        let b = cached.embed("hello world").unwrap();
        assert_eq!(a, b);
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_text_both_computed() {
        let counting = CountingEmbedder {
            inner: HashEmbedder::new(),
            calls: AtomicUsize::new(0),
        };
        let cached = CachingEmbedder::new(counting);
        cached.embed("first").unwrap();
        cached.embed("second").unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
    }
}
