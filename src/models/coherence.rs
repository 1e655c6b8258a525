//! Disagreement-graph types for the coherence tracker.

use serde::{Deserialize, Serialize};

/// How two claims relate, as observed by the coherence tracker. Never a
/// judgment about which is correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    /// A direct contradiction.
    Contradicts,
    /// A disagreement that doesn't rise to outright contradiction.
    Conflicts,
    /// One claim limits or qualifies the other.
    Qualifies,
    /// The relationship itself is uncertain.
    Uncertain,
    /// The claims align.
    Agrees,
}

impl Relationship {
    /// Classifies a detector label string into a relationship, grounded
    /// verbatim on `CoherenceTracker._classify_relationship` in the
    /// original: any label containing "contradict" maps to `Contradicts`,
    /// "conflict" to `Conflicts`, "qualif" to `Qualifies`,
    /// "uncertain"/"ambiguous" to `Uncertain`, anything else to `Conflicts`.
    #[must_use]
    pub fn classify(label: &str) -> Self {
        let lower = label.to_lowercase();
        if lower.contains("contradict") {
            Self::Contradicts
        } else if lower.contains("qualif") {
            Self::Qualifies
        } else if lower.contains("uncertain") || lower.contains("ambiguous") {
            Self::Uncertain
        } else if lower.contains("agree") {
            Self::Agrees
        } else {
            Self::Conflicts
        }
    }
}

/// An undirected edge between two claims, stored in canonical `(min, max)`
/// order by `claim_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisagreementEdge {
    /// Lexicographically smaller claim id.
    pub claim_id_a: String,
    /// Lexicographically larger claim id.
    pub claim_id_b: String,
    /// How the two claims relate.
    pub relationship: Relationship,
    /// Confidence in this classification, in `[0, 1]`.
    pub confidence: f64,
    /// Supporting quotes from both claims.
    pub evidence_quotes: Vec<String>,
    /// Plain-language reasoning, never prescriptive about who is right.
    pub reasoning: String,
}

impl DisagreementEdge {
    /// Builds the canonical `(min, max)` key for a pair of claim ids.
    #[must_use]
    pub fn canonical_key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }
}
