//! Pairwise contradiction detection (spec.md §4.5), grounded verbatim on
//! `original_source/sse/contradictions.py`.

mod lexicon;

use crate::config::ContradictionConfig;
use crate::embedding::cosine_similarity;
use crate::llm::{NliLabel, NliProvider};
use lexicon::{has_negation_word, opposition_match};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;

/// One side of a pairwise comparison: a stable id, the text, and its
/// embedding. Serves both memory-vs-utterance candidates (gate protocol)
/// and claim-vs-claim candidates (SSE), mirroring how the original's
/// `detect_contradictions` operates over a flat `claims` list regardless
/// of what a "claim" represents in the caller's domain.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Stable identifier of this item.
    pub id: &'a str,
    /// The text being compared.
    pub text: &'a str,
    /// Its embedding, used for the cosine pre-filter.
    pub embedding: &'a [f32],
}

/// The label assigned to one pair, grounded on the original's
/// `'contradiction' | 'entailment' | 'neutral' | 'unrelated'` return set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// The pair contradicts.
    Contradiction,
    /// One entails the other.
    Entailment,
    /// Related but neither contradicts nor entails.
    Neutral,
    /// Below the similarity pre-filter or otherwise unrelated.
    Unrelated,
}

impl Label {
    /// Lowercase label string, as stored in the original's `label` field
    /// (`"contradiction"`, `"entailment"`, `"neutral"`, `"unrelated"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Contradiction => "contradiction",
            Self::Entailment => "entailment",
            Self::Neutral => "neutral",
            Self::Unrelated => "unrelated",
        }
    }
}

/// One classified pair.
#[derive(Debug, Clone)]
pub struct ContradictionPair {
    /// Id of the first item (order is the pre-dedup insertion order, not
    /// necessarily the canonical `(min, max)` order — callers needing a
    /// canonical key should sort themselves).
    pub id_a: String,
    /// Id of the second item.
    pub id_b: String,
    /// The classification.
    pub label: Label,
}

type NliCache = Lazy<Mutex<HashMap<String, Option<NliLabel>>>>;

/// Process-global, append-only NLI result cache keyed by the
/// order-independent pair hash, grounded verbatim on the original's
/// module-level `_NLI_CACHE` dict.
static NLI_CACHE: NliCache = Lazy::new(|| Mutex::new(HashMap::new()));

/// Generates the cache key for a pair, order-independent, grounded
/// verbatim on `_cache_key` in `original_source/sse/contradictions.py`
/// (`md5(sorted_pair.join("|||"))`).
#[must_use]
pub fn cache_key(a: &str, b: &str) -> String {
    use md5::{Digest, Md5};
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Md5::new();
    hasher.update(first.as_bytes());
    hasher.update(b"|||");
    hasher.update(second.as_bytes());
    hex::encode(hasher.finalize())
}

/// Clears the process-global NLI cache. Exposed for test isolation,
/// grounded on the original's `clear_nli_cache`.
pub fn clear_nli_cache() {
    if let Ok(mut cache) = NLI_CACHE.lock() {
        cache.clear();
    }
}

/// Heuristic pre-filter/fallback classifier, grounded verbatim on
/// `heuristic_contradiction` in `original_source/sse/contradictions.py`:
/// negation mismatch is checked first, then a fixed opposition lexicon;
/// anything else is `unrelated` (this path never returns `entailment` or
/// `neutral` — those only come from an NLI provider).
#[must_use]
pub fn heuristic_contradiction(a: &str, b: &str) -> Label {
    let a_has_neg = has_negation_word(a);
    let b_has_neg = has_negation_word(b);
    if a_has_neg != b_has_neg {
        return Label::Contradiction;
    }
    if opposition_match(a, b) {
        return Label::Contradiction;
    }
    Label::Unrelated
}

/// Whether `text` is interrogative: ends with `?`, or opens with a
/// WH/auxiliary word (spec.md §4.5, Invariant VII). Interrogative
/// utterances are excluded from candidate-pair generation entirely so a
/// question can never raise a contradiction count on its own slot.
#[must_use]
pub fn is_interrogative(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.ends_with('?') {
        return true;
    }
    const WH_AUX_WORDS: &[&str] = &[
        "who", "what", "when", "where", "why", "how", "is", "are", "do", "does", "did", "can",
        "could", "would", "will",
    ];
    let first_word = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    WH_AUX_WORDS.contains(&first_word.as_str())
}

/// The contradiction detector: semantic pre-filter, cached NLI
/// classification, heuristic fallback, pair dedup (spec.md §4.5 steps
/// 1-4).
pub struct Detector {
    nli: Option<Box<dyn NliProvider>>,
    config: ContradictionConfig,
}

impl Detector {
    /// Builds a detector with no NLI provider: every pair resolves via
    /// the heuristic fallback.
    #[must_use]
    pub fn heuristic_only(config: ContradictionConfig) -> Self {
        Self { nli: None, config }
    }

    /// Builds a detector backed by an injected NLI provider, falling back
    /// to the heuristic whenever the provider errors or returns a label
    /// this detector doesn't distinguish further.
    #[must_use]
    pub fn with_nli(nli: Box<dyn NliProvider>, config: ContradictionConfig) -> Self {
        Self {
            nli: Some(nli),
            config,
        }
    }

    /// Classifies every unordered pair in `candidates` whose cosine
    /// similarity is at least `config.cosine_prefilter_theta`, returning
    /// only those classified as `Contradiction` — matching the original's
    /// `detect_contradictions`, which only appends contradiction-labeled
    /// pairs to its result list.
    #[must_use]
    pub fn detect(&self, candidates: &[Candidate<'_>]) -> Vec<ContradictionPair> {
        let mut pairs = Vec::new();
        if candidates.len() < 2 {
            return pairs;
        }
        for i in 0..candidates.len() {
            for j in (i + 1)..candidates.len() {
                let a = &candidates[i];
                let b = &candidates[j];
                let similarity = cosine_similarity(a.embedding, b.embedding);
                if similarity < self.config.cosine_prefilter_theta {
                    continue;
                }
                let label = self.classify_pair(a.text, b.text);
                if label == Label::Contradiction {
                    pairs.push(ContradictionPair {
                        id_a: a.id.to_string(),
                        id_b: b.id.to_string(),
                        label,
                    });
                }
            }
        }
        pairs
    }

    fn classify_pair(&self, a: &str, b: &str) -> Label {
        let key = cache_key(a, b);
        if let Some(nli) = &self.nli {
            if let Ok(mut cache) = NLI_CACHE.lock() {
                if let Some(cached) = cache.get(&key) {
                    return Self::label_from_nli(*cached, a, b);
                }
            }
            let result = nli.classify(a, b).ok();
            if let Ok(mut cache) = NLI_CACHE.lock() {
                cache.insert(key, result);
            }
            return Self::label_from_nli(result, a, b);
        }
        heuristic_contradiction(a, b)
    }

    fn label_from_nli(result: Option<NliLabel>, a: &str, b: &str) -> Label {
        match result {
            Some(NliLabel::Contradiction) => Label::Contradiction,
            Some(NliLabel::Entailment) => Label::Entailment,
            Some(NliLabel::Neutral) => Label::Neutral,
            None => heuristic_contradiction(a, b),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn detector() -> Detector {
        Detector::heuristic_only(ContradictionConfig::default())
    }

    #[test]
    fn test_negation_mismatch_is_contradiction() {
        let label = heuristic_contradiction("The statement is true.", "The statement is not true.");
        assert_eq!(label, Label::Contradiction);
    }

    #[test]
    fn test_opposition_lexicon_is_contradiction() {
        let label = heuristic_contradiction("The earth is round.", "The earth is flat.");
        assert_eq!(label, Label::Contradiction);
    }

    #[test]
    fn test_unrelated_text_is_unrelated() {
        let label = heuristic_contradiction("I like pottery.", "The sky is blue today.");
        assert_eq!(label, Label::Unrelated);
    }

    #[test]
    fn test_is_interrogative_question_mark() {
        assert!(is_interrogative("What is my name?"));
    }

    #[test]
    fn test_is_interrogative_wh_word_without_mark() {
        assert!(is_interrogative("where do I work"));
    }

    #[test]
    fn test_is_interrogative_false_for_assertion() {
        assert!(!is_interrogative("I work at Microsoft."));
    }

    #[test]
    fn test_detect_below_cosine_threshold_excluded() {
        let d = detector();
        let candidates = vec![
            Candidate {
                id: "a",
                text: "I work at Microsoft.",
                embedding: &[1.0, 0.0],
            },
            Candidate {
                id: "b",
                text: "I work at Amazon.",
                embedding: &[0.0, 1.0],
            },
        ];
        assert!(d.detect(&candidates).is_empty());
    }

    #[test]
    fn test_detect_finds_contradiction_above_threshold() {
        let d = detector();
        let candidates = vec![
            Candidate {
                id: "a",
                text: "The statement is true.",
                embedding: &[1.0, 0.0],
            },
            Candidate {
                id: "b",
                text: "The statement is not true.",
                embedding: &[0.9, 0.1],
            },
        ];
        let pairs = d.detect(&candidates);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].label, Label::Contradiction);
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        assert_eq!(cache_key("a", "b"), cache_key("b", "a"));
    }

    #[test]
    fn test_single_candidate_yields_no_pairs() {
        let d = detector();
        let candidates = vec![Candidate {
            id: "a",
            text: "only one",
            embedding: &[1.0],
        }];
        assert!(d.detect(&candidates).is_empty());
    }
}
