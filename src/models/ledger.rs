//! Contradiction ledger entry types.

use super::MemoryId;
use serde::{Deserialize, Serialize};

/// Stable identifier for a [`LedgerEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct LedgerId(String);

impl LedgerId {
    /// Creates a new ledger ID from a UUID-shaped string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random ledger ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a ledger entry. Transitions follow
/// `Open -> Asked -> {Resolved, Dismissed}`; `Resolved`/`Dismissed` are
/// terminal (spec.md Invariant VI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerState {
    /// Freshly recorded, not yet surfaced to the user.
    Open,
    /// Surfaced to the user as a clarification question.
    Asked,
    /// Resolved by user clarification or automatic reinforcement.
    Resolved,
    /// Dismissed by the user or policy, without a trust-affecting outcome.
    Dismissed,
}

impl LedgerState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Asked => "asked",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }
}

impl std::fmt::Display for LedgerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LedgerState {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "asked" => Ok(Self::Asked),
            "resolved" => Ok(Self::Resolved),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown ledger state: {other}"
            ))),
        }
    }
}

/// Structured metadata describing the nature of a contradiction, carried
/// alongside the freeform `suggested_question`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticAnchor {
    /// A short label for the kind of contradiction (e.g. `"slot_conflict"`,
    /// `"semantic_opposition"`).
    pub contradiction_type: String,
    /// The clarification prompt shown to the user, duplicated here so
    /// downstream consumers of `semantic_anchor` don't need the entry's
    /// top-level field.
    pub clarification_prompt: String,
}

/// A durable, append-only record of one conflicting pair of memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Stable identifier.
    pub ledger_id: LedgerId,
    /// The memory being superseded/contradicted.
    pub old_memory_id: MemoryId,
    /// The memory that conflicts with it.
    pub new_memory_id: MemoryId,
    /// Hard slot the conflict is over, if any (empty for purely semantic
    /// contradictions with no shared slot).
    pub slot: Option<String>,
    /// Composite drift score in `[0, 1]`.
    pub drift: f64,
    /// Current lifecycle state.
    pub state: LedgerState,
    /// Clarification prompt to surface to the user, if one was generated.
    pub suggested_question: Option<String>,
    /// Structured contradiction metadata.
    pub semantic_anchor: Option<SemanticAnchor>,
    /// When this entry was created (Unix epoch seconds).
    pub timestamp_created: u64,
    /// When it was surfaced to the user, if ever.
    pub timestamp_asked: Option<u64>,
    /// When it reached a terminal state, if ever.
    pub timestamp_resolved: Option<u64>,
    /// The value that won, once resolved.
    pub winning_value: Option<String>,
}

impl LedgerEntry {
    /// The canonical idempotency key for `record_candidate`: `(old, new)`
    /// in a fixed order plus slot and drift rounded to 3 decimal places,
    /// so a duplicate call with the same inputs never creates a second
    /// open entry (spec.md §8 "Idempotence").
    #[must_use]
    pub fn canonical_key(
        old_memory_id: &MemoryId,
        new_memory_id: &MemoryId,
        slot: Option<&str>,
        drift: f64,
    ) -> String {
        let (a, b) = if old_memory_id.as_str() <= new_memory_id.as_str() {
            (old_memory_id.as_str(), new_memory_id.as_str())
        } else {
            (new_memory_id.as_str(), old_memory_id.as_str())
        };
        format!(
            "{a}|{b}|{}|{:.3}",
            slot.unwrap_or_default(),
            drift
        )
    }
}
