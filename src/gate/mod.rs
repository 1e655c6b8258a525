//! The Gate Protocol (spec.md §4.7): decides whether a turn may speak
//! from belief or must admit uncertainty, and if the latter, pulls a
//! clarification question from the ledger's goal queue.
//!
//! No `original_source/` file implements this protocol directly (the
//! Python original's gate/belief-revision package was filtered out of
//! the provided pack), so this follows spec.md §4.7 directly, per
//! DESIGN.md's Open Question resolution on the `confidence` formula.

use crate::ledger::ContradictionLedger;
use crate::models::ScoredMemory;
use crate::config::GateConfig;
use crate::Result;
use std::collections::HashSet;

/// The computed alignment/confidence metrics for one turn, always
/// reported regardless of whether the gates passed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateMetrics {
    /// Normalized similarity of the utterance embedding to the top-k
    /// retrieved centroid.
    pub intent_alignment: f64,
    /// Max similarity of the utterance to any retrieved memory.
    pub memory_alignment: f64,
    /// Function of (top trust, alignment, contradiction count).
    pub confidence: f64,
}

/// The result of evaluating the gate protocol for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// All three gates passed; the turn may speak from belief.
    Belief(GateMetrics),
    /// At least one gate failed; the turn must admit uncertainty.
    Uncertainty {
        /// The metrics computed before the failing gate.
        metrics: GateMetrics,
        /// Which gate failed and why.
        reason: String,
        /// A clarification question pulled from the ledger's goal queue,
        /// if one is available.
        clarification_question: Option<String>,
    },
}

/// Computes the centroid of a set of embeddings (element-wise mean).
/// Returns an empty vector if `embeddings` is empty.
fn centroid(embeddings: &[&[f32]]) -> Vec<f32> {
    if embeddings.is_empty() {
        return Vec::new();
    }
    let dims = embeddings[0].len();
    let mut sums = vec![0.0_f32; dims];
    for embedding in embeddings {
        for (sum, value) in sums.iter_mut().zip(embedding.iter()) {
            *sum += value;
        }
    }
    let count = embeddings.len() as f32;
    sums.into_iter().map(|sum| sum / count).collect()
}

/// The Gate Protocol.
pub struct GateProtocol {
    config: GateConfig,
}

impl GateProtocol {
    /// Builds a gate protocol from config.
    #[must_use]
    pub const fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Computes `intent_alignment`, `memory_alignment`, and `confidence`
    /// for one turn.
    #[must_use]
    pub fn compute_metrics(
        utterance_embedding: &[f32],
        retrieved: &[ScoredMemory],
        unresolved_hard_contradictions_for_slot: usize,
    ) -> GateMetrics {
        if retrieved.is_empty() {
            return GateMetrics {
                intent_alignment: 0.0,
                memory_alignment: 0.0,
                confidence: 0.0,
            };
        }

        let embeddings: Vec<&[f32]> = retrieved
            .iter()
            .map(|scored| scored.memory.embedding.as_slice())
            .collect();
        let centroid = centroid(&embeddings);
        let intent_alignment =
            crate::embedding::cosine_similarity(utterance_embedding, &centroid);

        let memory_alignment = retrieved
            .iter()
            .map(|scored| scored.similarity)
            .fold(0.0_f64, f64::max);

        let top_trust = retrieved
            .iter()
            .map(|scored| scored.memory.trust)
            .fold(0.0_f64, f64::max);

        // Each unresolved hard contradiction for the queried slot erodes
        // confidence by a fixed fraction, floored at zero.
        const CONTRADICTION_PENALTY_PER_ENTRY: f64 = 0.3;
        let contradiction_penalty = (unresolved_hard_contradictions_for_slot as f64
            * CONTRADICTION_PENALTY_PER_ENTRY)
            .min(1.0);

        let confidence =
            (top_trust * memory_alignment * (1.0 - contradiction_penalty)).clamp(0.0, 1.0);

        GateMetrics {
            intent_alignment,
            memory_alignment,
            confidence,
        }
    }

    /// Evaluates the three gates in order, short-circuiting on the first
    /// failure: `memory_alignment >= theta_align`, `confidence >=
    /// theta_min`, `unresolved_hard_contradictions_for_slot == 0`. On
    /// failure, pulls the highest-drift unasked ledger entry (if any) as
    /// a clarification question.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger lookup fails.
    pub fn evaluate(
        &self,
        utterance_embedding: &[f32],
        retrieved: &[ScoredMemory],
        unresolved_hard_contradictions_for_slot: usize,
        ledger: &ContradictionLedger,
        asked_this_session: &HashSet<String>,
    ) -> Result<GateOutcome> {
        let metrics = Self::compute_metrics(
            utterance_embedding,
            retrieved,
            unresolved_hard_contradictions_for_slot,
        );

        let failure = if metrics.memory_alignment < self.config.theta_align {
            Some(format!(
                "memory_alignment {:.3} below theta_align {:.3}",
                metrics.memory_alignment, self.config.theta_align
            ))
        } else if metrics.confidence < self.config.theta_min {
            Some(format!(
                "confidence {:.3} below theta_min {:.3}",
                metrics.confidence, self.config.theta_min
            ))
        } else if unresolved_hard_contradictions_for_slot > 0 {
            Some(format!(
                "{unresolved_hard_contradictions_for_slot} unresolved hard contradiction(s) for the queried slot"
            ))
        } else {
            None
        };

        let Some(reason) = failure else {
            return Ok(GateOutcome::Belief(metrics));
        };

        let clarification_question = ledger
            .next(asked_this_session)?
            .and_then(|entry| entry.suggested_question);

        Ok(GateOutcome::Uncertainty {
            metrics,
            reason,
            clarification_question,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::{Memory, Source};
    use std::collections::HashMap;

    fn scored(embedding: Vec<f32>, similarity: f64, trust: f64) -> ScoredMemory {
        let memory = Memory::new("some text", Source::User, embedding, trust, HashMap::new(), false);
        ScoredMemory {
            memory,
            similarity,
            score: similarity * trust,
        }
    }

    #[test]
    fn test_belief_when_all_gates_pass() {
        let protocol = GateProtocol::new(GateConfig::default());
        let ledger = ContradictionLedger::open_in_memory().unwrap();
        let retrieved = vec![scored(vec![1.0, 0.0], 0.9, 0.9)];
        let outcome = protocol
            .evaluate(&[1.0, 0.0], &retrieved, 0, &ledger, &HashSet::new())
            .unwrap();
        assert!(matches!(outcome, GateOutcome::Belief(_)));
    }

    #[test]
    fn test_uncertainty_on_low_memory_alignment() {
        let protocol = GateProtocol::new(GateConfig::default());
        let ledger = ContradictionLedger::open_in_memory().unwrap();
        let retrieved = vec![scored(vec![1.0, 0.0], 0.1, 0.9)];
        let outcome = protocol
            .evaluate(&[1.0, 0.0], &retrieved, 0, &ledger, &HashSet::new())
            .unwrap();
        assert!(matches!(outcome, GateOutcome::Uncertainty { .. }));
    }

    #[test]
    fn test_uncertainty_on_unresolved_contradiction() {
        let protocol = GateProtocol::new(GateConfig::default());
        let ledger = ContradictionLedger::open_in_memory().unwrap();
        let retrieved = vec![scored(vec![1.0, 0.0], 0.9, 0.9)];
        let outcome = protocol
            .evaluate(&[1.0, 0.0], &retrieved, 1, &ledger, &HashSet::new())
            .unwrap();
        match outcome {
            GateOutcome::Uncertainty { reason, .. } => {
                assert!(reason.contains("unresolved hard contradiction"));
            }
            GateOutcome::Belief(_) => panic!("expected uncertainty"),
        }
    }

    #[test]
    fn test_empty_retrieval_yields_zero_metrics_and_uncertainty() {
        let protocol = GateProtocol::new(GateConfig::default());
        let ledger = ContradictionLedger::open_in_memory().unwrap();
        let outcome = protocol
            .evaluate(&[1.0, 0.0], &[], 0, &ledger, &HashSet::new())
            .unwrap();
        assert!(matches!(outcome, GateOutcome::Uncertainty { .. }));
    }

    #[test]
    fn test_uncertainty_carries_clarification_question() {
        use crate::models::MemoryId;
        let protocol = GateProtocol::new(GateConfig::default());
        let ledger = ContradictionLedger::open_in_memory().unwrap();
        ledger
            .record_candidate(
                &MemoryId::content_address("old", Source::User),
                &MemoryId::content_address("new", Source::User),
                Some("employer"),
                0.9,
                Some("Which employer is current?".to_string()),
                None,
            )
            .unwrap();
        let retrieved = vec![scored(vec![1.0, 0.0], 0.1, 0.9)];
        let outcome = protocol
            .evaluate(&[1.0, 0.0], &retrieved, 0, &ledger, &HashSet::new())
            .unwrap();
        match outcome {
            GateOutcome::Uncertainty {
                clarification_question,
                ..
            } => {
                assert_eq!(
                    clarification_question.as_deref(),
                    Some("Which employer is current?")
                );
            }
            GateOutcome::Belief(_) => panic!("expected uncertainty"),
        }
    }
}
