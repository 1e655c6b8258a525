//! Fact-slot and open-tuple types for two-tier extraction.

use serde::{Deserialize, Serialize};

/// How a fact was extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Deterministic hard-slot regex matching (Tier A).
    Regex,
    /// LLM-backed open-tuple extraction (Tier B).
    Llm,
    /// Tier B degraded to converting a Tier A match.
    Hybrid,
}

/// A Tier A (hard-slot) fact: deterministic, closed-vocabulary extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// Recognized attribute name from the closed hard-slot vocabulary.
    pub slot: String,
    /// Canonical (as-written) value.
    pub value: String,
    /// Lower-cased, whitespace-collapsed value, used for comparison.
    pub normalized: String,
    /// Id of the utterance this fact was extracted from.
    pub origin_utterance_id: String,
    /// How this fact was extracted.
    pub method: ExtractionMethod,
}

impl Fact {
    /// Builds a fact, computing `normalized` from `value`.
    #[must_use]
    pub fn new(
        slot: impl Into<String>,
        value: impl Into<String>,
        origin_utterance_id: impl Into<String>,
        method: ExtractionMethod,
    ) -> Self {
        let value = value.into();
        let normalized = normalize(&value);
        Self {
            slot: slot.into(),
            value,
            normalized,
            origin_utterance_id: origin_utterance_id.into(),
            method,
        }
    }
}

/// Lower-cases and collapses whitespace runs, mirroring the original's
/// `normalize_claim_text`/`ExtractedFact.normalized` convention.
#[must_use]
pub fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// What is happening to a Tier B fact tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactAction {
    /// A new fact is being asserted.
    Add,
    /// An existing fact is being updated.
    Update,
    /// The fact is no longer current.
    Deprecate,
    /// The fact is being explicitly denied.
    Deny,
}

/// An open-world (Tier B) fact, outside the hard-slot vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactTuple {
    /// Who/what the fact is about (e.g. `"User"`).
    pub entity: String,
    /// Dot-notation attribute (e.g. `"hobby"`, `"employment.status"`).
    pub attribute: String,
    /// The value of the attribute.
    pub value: String,
    /// What is happening to this fact.
    pub action: FactAction,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
    /// Byte offsets, into the source utterance, of the phrase that
    /// licensed this tuple.
    pub evidence_span: (usize, usize),
    /// Source of the extraction (e.g. `"llm_extraction"`).
    pub source: String,
}

impl FactTuple {
    /// Lower-cased, trimmed value for comparison.
    #[must_use]
    pub fn normalized_value(&self) -> String {
        self.value.trim().to_lowercase()
    }

    /// Whether this tuple's attribute maps onto the given hard slot, via
    /// the fixed relation table (grounded verbatim on
    /// `FactTuple.matches_slot` in the original).
    #[must_use]
    pub fn matches_slot(&self, slot_name: &str) -> bool {
        if self.attribute == slot_name {
            return true;
        }
        let related: &[&str] = match slot_name {
            "employer" => &["employer", "employment.status", "employment.company", "company"],
            "location" => &["location", "residence", "city", "region"],
            "name" => &["name", "full_name", "identity.name"],
            "title" => &["title", "job_title", "employment.title", "role"],
            "age" => &["age", "years_old"],
            "occupation" => &["occupation", "profession", "job"],
            _ => &[],
        };
        related.contains(&self.attribute.as_str())
    }
}

/// Result of a two-tier extraction pass over one utterance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwoTierResult {
    /// Tier A hard-slot facts, keyed by slot name.
    pub hard_facts: std::collections::HashMap<String, Fact>,
    /// Tier B open-world tuples.
    pub open_tuples: Vec<FactTuple>,
    /// Source text that was analyzed.
    pub source_text: String,
    /// Wall-clock extraction time in seconds.
    pub extraction_time_secs: f64,
    /// Which extraction methods ran (`"regex"`, `"llm"`).
    pub methods_used: Vec<String>,
}
