//! # crt-core
//!
//! A memory-first conversational substrate. Every utterance is evaluated
//! against a persisted, trust-weighted store of prior beliefs; every
//! response is gated by coherence checks so that speech never drifts from
//! belief.
//!
//! Two tightly coupled engines form the core:
//!
//! - The **Memory & Trust Engine** ([`memory`], [`trust`]): content-addressed
//!   memory records with evolving trust scores and a reconstruction-gate
//!   protocol ([`gate`]) deciding whether the system may speak from memory.
//! - The **Contradiction Ledger** ([`ledger`]): a durable, append-only
//!   record of conflicting claims and their lifecycle, with a goal queue
//!   that turns unresolved conflicts into clarification questions.
//!
//! A secondary but essential companion is the **Semantic String Engine**
//! ([`sse`]): a read-only, boundary-enforced analyzer that extracts claims
//! from documents, detects contradictions, and exposes them without
//! synthesis.
//!
//! [`session::Session`] ties extraction, retrieval, detection, the ledger,
//! and the gate protocol together for one conversational thread.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

pub mod config;
pub mod contradiction;
pub mod embedding;
pub mod extraction;
pub mod gate;
pub mod ledger;
pub mod llm;
pub mod loops;
pub mod memory;
pub mod models;
pub mod observability;
pub mod session;
pub mod sse;
pub mod storage;
pub mod trust;

pub use config::CrtConfig;
pub use embedding::Embedder;
pub use models::{
    Chunk, Claim, DisagreementEdge, Fact, FactTuple, LedgerEntry, LedgerState, Memory, MemoryId,
    Relationship, Source, SseMode, SupportingQuote,
};
pub use session::Session;

/// Error type for crt-core operations.
///
/// Variants map directly onto the error kinds named by the system design:
/// capability-unavailable failures are recovered locally by callers,
/// intent-not-served failures surface as an uncertainty response, and
/// invariant breaches are never recovered in place.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided (missing parameters, malformed JSON, an
    /// out-of-vocabulary slot name, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A storage write conflicted with another writer and the retry budget
    /// was exhausted.
    #[error("storage busy: {operation} failed after {attempts} attempts")]
    StorageBusy {
        /// The operation that was being retried.
        operation: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The embedding capability is unavailable. Retrieval degrades to an
    /// empty candidate set with a diagnostic flag rather than blocking.
    #[error("embedding capability unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Two-tier fact extraction failed and degraded to regex-only.
    #[error("extraction failed, degraded to regex-only: {0}")]
    ExtractionFailed(String),

    /// The injected LLM/NLI capability is unavailable; callers fall back to
    /// heuristics.
    #[error("LLM capability unavailable: {0}")]
    LLMUnavailable(String),

    /// A forbidden operation was invoked on a capability-restricted façade
    /// (the SSE navigator or the coherence tracker). Never recovered
    /// locally — it is a programming error at the call site.
    #[error("boundary violation: {operation} — {reason}")]
    BoundaryViolation {
        /// Name of the forbidden operation that was invoked.
        operation: String,
        /// Why the operation is forbidden.
        reason: String,
    },

    /// A ledger entry's state transition was attempted from an
    /// incompatible state. The entry itself is left untouched.
    #[error("ledger invariant violated: cannot transition from {from} to {to}")]
    LedgerInvariant {
        /// The state the entry was actually in.
        from: String,
        /// The state the transition attempted to reach.
        to: String,
    },

    /// Configuration failed to load or validate. Fatal at startup.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// An operation failed for a reason that doesn't fit a more specific
    /// variant (I/O, SQL, or other backend failure).
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for crt-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::BoundaryViolation {
            operation: "synthesize_answer".to_string(),
            reason: "SSE does not synthesize".to_string(),
        };
        assert!(err.to_string().contains("boundary violation"));
    }

    #[test]
    fn test_current_timestamp_is_reasonable() {
        let ts = current_timestamp();
        assert!(ts > 1_700_000_000);
    }
}
