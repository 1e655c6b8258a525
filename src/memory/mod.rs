//! The Memory & Trust Engine's store: persistence plus trust-weighted
//! retrieval scoring.

mod sqlite_store;

pub use sqlite_store::SqliteMemoryStore;

use crate::models::{Memory, MemoryId, ScoredMemory};
use crate::Result;

/// Diagnostics attached to a retrieval call, surfaced so callers (the
/// gate protocol) can distinguish "nothing relevant" from "the embedding
/// capability was unavailable".
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    /// Ranked candidates, highest score first.
    pub candidates: Vec<ScoredMemory>,
    /// Set when embedding the query failed; `candidates` is empty in that
    /// case, but this is not treated as a hard error (spec.md §4.2).
    pub embedding_unavailable: bool,
}

/// Persistence boundary for [`Memory`] records.
///
/// Object-safe and `&self`-only: implementations serialize writes
/// internally (a connection mutex, or SQLite's own locking plus the
/// storage-layer retry helper), matching subcog's `PersistenceBackend`
/// pattern of not requiring `&mut self` at the trait boundary.
pub trait MemoryStore: Send + Sync {
    /// Persists `memory`, inserting it if its id is new or updating the
    /// existing row if it already exists (content-addressed upsert).
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageBusy` if the write could not be committed
    /// within the retry budget.
    fn store(&self, memory: &Memory) -> Result<()>;

    /// Retrieves the top-k memories (by `similarity * f(trust)`) whose
    /// cosine similarity to `query_embedding` is at least `theta`.
    /// Retired memories are never returned.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageBusy` on a read failure.
    fn retrieve(
        &self,
        query_embedding: &[f32],
        theta: f64,
        top_k: usize,
        recency_half_life_secs: f64,
    ) -> Result<Vec<ScoredMemory>>;

    /// Marks a memory retired. Never physically removes the row.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageBusy` on a write failure.
    fn forget(&self, id: &MemoryId) -> Result<()>;

    /// Fetches a single memory by id, if present and not retired.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageBusy` on a read failure.
    fn get(&self, id: &MemoryId) -> Result<Option<Memory>>;

    /// Updates `timestamp_last_seen` to now and applies trust evolution
    /// fields already computed by the caller (the trust evolver runs
    /// in-process against an owned `Memory`, then `touch` persists it).
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageBusy` on a write failure.
    fn touch(&self, memory: &Memory) -> Result<()>;

    /// Returns the `limit` most recently created, non-retired memories
    /// whose source is [`crate::models::Source::User`], oldest first —
    /// the raw utterance texts the continuous loops tokenize for topic
    /// and style analysis (spec.md §4.11).
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageBusy` on a read failure.
    fn recent_user_texts(&self, limit: usize) -> Result<Vec<String>>;
}

/// Computes the recency boost term used by the default ranking function:
/// exponential decay over the age of `timestamp_last_seen`, with
/// `half_life_secs` controlling how quickly the boost fades.
#[must_use]
pub fn recency_boost(timestamp_last_seen: u64, now: u64, half_life_secs: f64) -> f64 {
    if half_life_secs <= 0.0 {
        return 0.0;
    }
    let age_secs = now.saturating_sub(timestamp_last_seen) as f64;
    0.5_f64.powf(age_secs / half_life_secs)
}

/// The default monotone scoring function: `similarity * trust * (1 +
/// recency_boost)`, per spec.md §4.2.
#[must_use]
pub fn score(similarity: f64, trust: f64, recency_boost_value: f64) -> f64 {
    similarity * trust * (1.0 + recency_boost_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recency_boost_decays_over_time() {
        let now = 1_000_000;
        let fresh = recency_boost(now, now, 604_800.0);
        let stale = recency_boost(now - 604_800, now, 604_800.0);
        assert!((fresh - 1.0).abs() < 1e-9);
        assert!((stale - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_score_combines_similarity_trust_recency() {
        let s = score(0.8, 0.5, 0.0);
        assert!((s - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_recency_boost_zero_half_life_is_zero() {
        assert_eq!(recency_boost(1_000, 2_000, 0.0), 0.0);
    }
}
