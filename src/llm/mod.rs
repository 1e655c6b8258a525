//! The injected LLM/NLI capability boundary.
//!
//! Neither a concrete model nor a concrete provider ships with this crate
//! (spec.md §1: "specific LLM treated as an injected generator"). Two
//! narrow traits cover the two places the rest of the crate needs one:
//! Tier B open-tuple extraction ([`FactTupleProvider`]) and contradiction
//! NLI classification ([`NliProvider`]). Grounded on subcog's
//! `llm::LlmProvider` trait shape (`src/llm/mod.rs`), narrowed to the two
//! call sites this spec actually has rather than subcog's much larger
//! multi-provider surface (subcog also supports capture-analysis,
//! consolidation, and search-intent prompts CRT has no use for).

use crate::models::FactTuple;
use crate::Result;

/// One claim candidate proposed by an LLM claim extractor: a claim
/// statement plus the verbatim quotes (with chunk-relative byte offsets)
/// claimed to support it. Grounded on `extract_claims_with_llm`'s
/// `{"claim_text": "...", "quotes": [{"text", "start", "end"}]}` shape
/// in `original_source/sse/extractor.py`.
#[derive(Debug, Clone)]
pub struct LlmClaimCandidate {
    /// The claim statement.
    pub claim_text: String,
    /// Proposed supporting quotes as `(text, start, end)`, offsets
    /// relative to the chunk text passed to the provider.
    pub quotes: Vec<(String, usize, usize)>,
}

/// Capability boundary for Tier B open-tuple extraction (spec.md §4.4).
///
/// Implementations call out to whatever LLM is configured; on failure
/// callers convert to `Error::LLMUnavailable` and degrade to the
/// hard-slot-to-tuple fallback described in spec.md §4.4.
pub trait FactTupleProvider: Send + Sync {
    /// Extracts open-world `(entity, attribute, value, action, confidence)`
    /// tuples from one utterance.
    ///
    /// # Errors
    ///
    /// Returns `Error::LLMUnavailable` if the provider cannot currently
    /// serve requests.
    fn extract_tuples(&self, utterance: &str) -> Result<Vec<FactTuple>>;
}

impl FactTupleProvider for Box<dyn FactTupleProvider> {
    fn extract_tuples(&self, utterance: &str) -> Result<Vec<FactTuple>> {
        self.as_ref().extract_tuples(utterance)
    }
}

/// A label produced by natural-language-inference classification between
/// a premise and a hypothesis, grounded on `query_ollama_nli`'s return
/// values in `original_source/sse/contradictions.py`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NliLabel {
    /// The hypothesis contradicts the premise.
    Contradiction,
    /// The hypothesis follows from the premise.
    Entailment,
    /// Neither contradiction nor entailment.
    Neutral,
}

/// Capability boundary for premise/hypothesis NLI classification
/// (spec.md §4.5 step 2).
pub trait NliProvider: Send + Sync {
    /// Classifies the relationship between `premise` and `hypothesis`.
    ///
    /// # Errors
    ///
    /// Returns `Error::LLMUnavailable` if the provider cannot currently
    /// serve requests; callers fall back to the heuristic classifier.
    fn classify(&self, premise: &str, hypothesis: &str) -> Result<NliLabel>;
}

/// Capability boundary for LLM-assisted claim extraction (spec.md §4.8's
/// LLM-assisted variant), grounded on `extract_claims_with_llm` in
/// `original_source/sse/extractor.py`.
pub trait ClaimExtractionProvider: Send + Sync {
    /// Proposes claims (with supporting quotes) found in `chunk_text`.
    /// Every returned quote is validated by the caller against the
    /// actual chunk substring before being trusted; the provider itself
    /// need not guarantee exactness.
    ///
    /// # Errors
    ///
    /// Returns `Error::LLMUnavailable` if the provider cannot currently
    /// serve requests; callers fall back to rule-based extraction.
    fn extract_claims(&self, chunk_text: &str) -> Result<Vec<LlmClaimCandidate>>;
}
