//! The read-only SSE navigation façade (spec.md §4.8), grounded verbatim
//! on `original_source/sse/interaction_layer.py`'s `SSENavigator`: permits
//! retrieval, search, filter, group, navigate, and provenance exposure;
//! forbids synthesis, truth-picking, ambiguity softening, and suppression.

use crate::contradiction::ContradictionPair;
use crate::embedding::cosine_similarity;
use crate::models::{Ambiguity, Claim};
use crate::Error;
use std::collections::HashMap;

/// A semantic grouping of claims, grounded on the original's
/// `cluster_id`/`chunk_ids` index entries (renamed `claim_ids` here since
/// that is what the original's field actually holds despite its name).
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Stable cluster identifier.
    pub cluster_id: String,
    /// Member claim ids.
    pub claim_ids: Vec<String>,
}

/// Exact source text, offsets, and a reconstruction check for one claim's
/// supporting quotes, grounded on `get_provenance`.
#[derive(Debug, Clone)]
pub struct Provenance {
    /// The claim's id.
    pub claim_id: String,
    /// The claim's text.
    pub claim_text: String,
    /// Each supporting quote alongside whether it reconstructs exactly
    /// from the document's full text at its recorded offsets.
    pub quotes: Vec<(crate::models::SupportingQuote, bool)>,
}

/// Which search strategy [`SseNavigator::query`] should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    /// Substring/keyword matching over claim text and quotes.
    Keyword,
    /// Cosine similarity over precomputed claim embeddings, supplied via
    /// [`SseNavigator::query`]'s `claim_embeddings` argument.
    Semantic,
}

/// Read-only navigator over one document's extracted claims and detected
/// contradictions. The public API below is the entire permitted surface;
/// forbidden operations (`synthesize_answer`, `answer_question`,
/// `pick_best_claim`, `resolve_contradiction`, `soften_ambiguity`,
/// `remove_hedge_language`, `suppress_contradiction`,
/// `filter_low_confidence`) are not implemented as methods at all — they
/// exist only as names recognized by [`SseNavigator::invoke_dynamic`],
/// which always errors (DESIGN.md Open Question #4).
pub struct SseNavigator {
    doc_text: String,
    claims: Vec<Claim>,
    contradictions: Vec<ContradictionPair>,
    clusters: Vec<Cluster>,
}

impl SseNavigator {
    /// Builds a navigator over one document's claims, detected
    /// contradiction pairs, and clusters. `doc_text` is the full source
    /// document, used only to validate quote provenance.
    #[must_use]
    pub fn new(
        doc_text: String,
        claims: Vec<Claim>,
        contradictions: Vec<ContradictionPair>,
        clusters: Vec<Cluster>,
    ) -> Self {
        Self {
            doc_text,
            claims,
            contradictions,
            clusters,
        }
    }

    // ===== PERMITTED OPERATIONS =====

    /// Searches claims matching `query_text`, ordered by relevance,
    /// truncated to `k`. `claim_embeddings` is consulted only for
    /// `SearchMethod::Semantic` and must be keyed by claim id.
    #[must_use]
    pub fn query(
        &self,
        query_text: &str,
        k: usize,
        method: SearchMethod,
        query_embedding: Option<&[f32]>,
        claim_embeddings: Option<&HashMap<String, Vec<f32>>>,
    ) -> Vec<&Claim> {
        match method {
            SearchMethod::Keyword => self.keyword_search(query_text, k),
            SearchMethod::Semantic => match (query_embedding, claim_embeddings) {
                (Some(query_embedding), Some(claim_embeddings)) => {
                    self.semantic_search(query_embedding, claim_embeddings, k)
                }
                _ => Vec::new(),
            },
        }
    }

    /// All contradictions involving a claim whose text mentions `topic`
    /// (case-insensitive substring match).
    #[must_use]
    pub fn contradictions_for_topic(&self, topic: &str) -> Vec<&ContradictionPair> {
        let relevant: std::collections::HashSet<&str> = self
            .keyword_search(topic, self.claims.len())
            .into_iter()
            .map(|claim| claim.claim_id.as_str())
            .collect();
        self.contradictions
            .iter()
            .filter(|pair| relevant.contains(pair.id_a.as_str()) || relevant.contains(pair.id_b.as_str()))
            .collect()
    }

    /// Retrieves a single claim by id.
    #[must_use]
    pub fn claim_by_id(&self, claim_id: &str) -> Option<&Claim> {
        self.claims.iter().find(|claim| claim.claim_id == claim_id)
    }

    /// Exact source text, offsets, and reconstruction validity for a
    /// claim's supporting quotes.
    #[must_use]
    pub fn provenance(&self, claim_id: &str) -> Option<Provenance> {
        let claim = self.claim_by_id(claim_id)?;
        let quotes = claim
            .supporting_quotes
            .iter()
            .map(|quote| {
                let reconstructed = self
                    .doc_text
                    .get(quote.start_char..quote.end_char)
                    .map(|s| s == quote.quote_text)
                    .unwrap_or(false);
                (quote.clone(), reconstructed)
            })
            .collect();
        Some(Provenance {
            claim_id: claim.claim_id.clone(),
            claim_text: claim.claim_text.clone(),
            quotes,
        })
    }

    /// A claim's ambiguity markers, shown as-is, never softened.
    #[must_use]
    pub fn ambiguity(&self, claim_id: &str) -> Option<&Ambiguity> {
        self.claim_by_id(claim_id).map(|claim| &claim.ambiguity)
    }

    /// A cluster and its member claims.
    #[must_use]
    pub fn cluster(&self, cluster_id: &str) -> Option<(&Cluster, Vec<&Claim>)> {
        let cluster = self.clusters.iter().find(|c| c.cluster_id == cluster_id)?;
        let members = cluster
            .claim_ids
            .iter()
            .filter_map(|id| self.claim_by_id(id))
            .collect();
        Some((cluster, members))
    }

    /// Claims whose hedge score is at least `min_hedge`, descending by
    /// hedge score.
    #[must_use]
    pub fn uncertain_claims(&self, min_hedge: f64) -> Vec<&Claim> {
        let mut result: Vec<&Claim> = self
            .claims
            .iter()
            .filter(|claim| claim.ambiguity.hedge_score >= min_hedge)
            .collect();
        result.sort_by(|a, b| {
            b.ambiguity
                .hedge_score
                .partial_cmp(&a.ambiguity.hedge_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        result
    }

    /// Every detected contradiction pair.
    #[must_use]
    pub fn contradictions(&self) -> &[ContradictionPair] {
        &self.contradictions
    }

    /// A specific contradiction by its (unordered) claim pair.
    #[must_use]
    pub fn contradiction_by_pair(&self, claim_id_a: &str, claim_id_b: &str) -> Option<&ContradictionPair> {
        self.contradictions.iter().find(|pair| {
            (pair.id_a == claim_id_a && pair.id_b == claim_id_b)
                || (pair.id_a == claim_id_b && pair.id_b == claim_id_a)
        })
    }

    /// Every claim.
    #[must_use]
    pub fn all_claims(&self) -> &[Claim] {
        &self.claims
    }

    /// Every cluster.
    #[must_use]
    pub fn all_clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Structural (non-paraphrasing) formatting of one claim, grounded on
    /// `format_claim`.
    #[must_use]
    pub fn format_claim(&self, claim: &Claim) -> String {
        let mut lines = vec![format!("Claim: {}", claim.claim_text)];
        for quote in &claim.supporting_quotes {
            lines.push(format!("  Quote: \"{}\"", quote.quote_text));
            lines.push(format!("  Offsets: [{}:{}]", quote.start_char, quote.end_char));
        }
        if claim.ambiguity.hedge_score > 0.0 {
            lines.push(format!(
                "  Ambiguity: Hedge score {:.2} (source uses uncertain language)",
                claim.ambiguity.hedge_score
            ));
        }
        lines.join("\n")
    }

    /// Structural formatting of a contradiction, showing both claims in
    /// full with no interpretation, grounded on `format_contradiction`.
    #[must_use]
    pub fn format_contradiction(&self, pair: &ContradictionPair) -> String {
        let mut lines = vec!["=".repeat(60), "CONTRADICTION DETECTED".to_string(), "=".repeat(60)];
        if let Some(claim_a) = self.claim_by_id(&pair.id_a) {
            lines.push(String::new());
            lines.push("[CLAIM A]".to_string());
            lines.push(self.format_claim(claim_a));
        }
        if let Some(claim_b) = self.claim_by_id(&pair.id_b) {
            lines.push(String::new());
            lines.push("[CLAIM B]".to_string());
            lines.push(self.format_claim(claim_b));
        }
        lines.push(String::new());
        lines.push(format!("Label: {}", pair.label.as_str()));
        lines.push(String::new());
        lines.push("Both claims are shown in full.".to_string());
        lines.push("No interpretation is provided.".to_string());
        lines.push("=".repeat(60));
        lines.join("\n")
    }

    /// Structural formatting of a list of search results.
    #[must_use]
    pub fn format_search_results(&self, claims: &[&Claim], limit: Option<usize>) -> String {
        let claims = match limit {
            Some(limit) => &claims[..claims.len().min(limit)],
            None => claims,
        };
        let mut lines = vec![format!("Found {} claims:", claims.len()), String::new()];
        for (i, claim) in claims.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, claim.claim_text));
            for quote in &claim.supporting_quotes {
                lines.push(format!("   Quote: \"{}\"", quote.quote_text));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }

    // ===== FORBIDDEN OPERATIONS =====

    /// The only entry point recognizing forbidden operation names; always
    /// returns `Error::BoundaryViolation` (DESIGN.md Open Question #4).
    ///
    /// # Errors
    ///
    /// Always returns `Error::BoundaryViolation`.
    pub fn invoke_dynamic(&self, op: &str) -> Result<(), Error> {
        let reason = match op {
            "synthesize_answer" => {
                "SSE does not synthesize or generate answers; it exposes what is already extracted"
            }
            "answer_question" => "SSE is not a QA system; use query() to find related claims instead",
            "pick_best_claim" => "SSE does not pick winners; all claims are preserved equally",
            "resolve_contradiction" => "SSE does not resolve contradictions; both sides are preserved",
            "soften_ambiguity" => "SSE never softens ambiguity; uncertainty is preserved and exposed",
            "remove_hedge_language" => "SSE preserves hedge language; it is information about the source",
            "suppress_contradiction" => {
                "SSE never suppresses contradictions; both sides must always be shown"
            }
            "filter_low_confidence" => {
                "SSE does not silently filter claims; if you filter, make it explicit"
            }
            _ => "unrecognized operation",
        };
        Err(Error::BoundaryViolation {
            operation: op.to_string(),
            reason: reason.to_string(),
        })
    }

    // ===== INTERNAL SEARCH =====

    fn keyword_search(&self, query: &str, k: usize) -> Vec<&Claim> {
        let query_lower = query.to_lowercase();
        let mut scored: Vec<(usize, &Claim)> = self
            .claims
            .iter()
            .filter_map(|claim| {
                let combined = format!(
                    "{} {}",
                    claim.claim_text.to_lowercase(),
                    claim
                        .supporting_quotes
                        .iter()
                        .map(|q| q.quote_text.to_lowercase())
                        .collect::<Vec<_>>()
                        .join(" ")
                );
                let score = combined.matches(query_lower.as_str()).count();
                (score > 0).then_some((score, claim))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(k).map(|(_, claim)| claim).collect()
    }

    fn semantic_search<'a>(
        &'a self,
        query_embedding: &[f32],
        claim_embeddings: &HashMap<String, Vec<f32>>,
        k: usize,
    ) -> Vec<&'a Claim> {
        let mut scored: Vec<(f64, &Claim)> = self
            .claims
            .iter()
            .filter_map(|claim| {
                let embedding = claim_embeddings.get(&claim.claim_id)?;
                Some((cosine_similarity(query_embedding, embedding), claim))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, claim)| claim).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::contradiction::Label;
    use crate::models::{Ambiguity, SupportingQuote};

    fn make_claim(id: &str, text: &str, start: usize, end: usize) -> Claim {
        Claim {
            claim_id: id.to_string(),
            claim_text: text.to_string(),
            doc_id: "doc1".to_string(),
            supporting_quotes: vec![SupportingQuote {
                quote_text: text.to_string(),
                chunk_id: "c0".to_string(),
                start_char: start,
                end_char: end,
            }],
            ambiguity: Ambiguity::default(),
        }
    }

    #[test]
    fn test_keyword_search_finds_match() {
        let claims = vec![make_claim("clm0", "Sparrows migrate south.", 0, 23)];
        let navigator = SseNavigator::new("Sparrows migrate south.".to_string(), claims, vec![], vec![]);
        let results = navigator.query("sparrow", 5, SearchMethod::Keyword, None, None);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_provenance_flags_invalid_reconstruction() {
        let mut claim = make_claim("clm0", "Sparrows migrate south.", 0, 23);
        claim.supporting_quotes[0].quote_text = "something else entirely".to_string();
        let navigator = SseNavigator::new("Sparrows migrate south.".to_string(), vec![claim], vec![], vec![]);
        let prov = navigator.provenance("clm0").unwrap();
        assert!(!prov.quotes[0].1);
    }

    #[test]
    fn test_provenance_confirms_exact_substring() {
        let claim = make_claim("clm0", "Sparrows migrate south.", 0, 23);
        let navigator = SseNavigator::new("Sparrows migrate south.".to_string(), vec![claim], vec![], vec![]);
        let prov = navigator.provenance("clm0").unwrap();
        assert!(prov.quotes[0].1);
    }

    #[test]
    fn test_forbidden_operations_are_not_public_methods() {
        // Compile-time assertion: SseNavigator has no `synthesize_answer`
        // method. If this test compiles, the assertion holds.
        let claims = vec![make_claim("clm0", "Sparrows migrate south.", 0, 23)];
        let navigator = SseNavigator::new("Sparrows migrate south.".to_string(), claims, vec![], vec![]);
        assert!(navigator.invoke_dynamic("synthesize_answer").is_err());
    }

    #[test]
    fn test_invoke_dynamic_rejects_answer_question() {
        let navigator = SseNavigator::new("Sparrows migrate south.".to_string(), vec![], vec![], vec![]);
        assert!(navigator.invoke_dynamic("answer_question").is_err());
    }

    #[test]
    fn test_invoke_dynamic_rejects_pick_best_claim() {
        let navigator = SseNavigator::new("Sparrows migrate south.".to_string(), vec![], vec![], vec![]);
        assert!(navigator.invoke_dynamic("pick_best_claim").is_err());
    }

    #[test]
    fn test_invoke_dynamic_rejects_resolve_contradiction() {
        let navigator = SseNavigator::new("Sparrows migrate south.".to_string(), vec![], vec![], vec![]);
        assert!(navigator.invoke_dynamic("resolve_contradiction").is_err());
    }

    #[test]
    fn test_invoke_dynamic_rejects_soften_ambiguity() {
        let navigator = SseNavigator::new("Sparrows migrate south.".to_string(), vec![], vec![], vec![]);
        assert!(navigator.invoke_dynamic("soften_ambiguity").is_err());
    }

    #[test]
    fn test_invoke_dynamic_rejects_remove_hedge_language() {
        let navigator = SseNavigator::new("Sparrows migrate south.".to_string(), vec![], vec![], vec![]);
        assert!(navigator.invoke_dynamic("remove_hedge_language").is_err());
    }

    #[test]
    fn test_invoke_dynamic_rejects_suppress_contradiction() {
        let navigator = SseNavigator::new("Sparrows migrate south.".to_string(), vec![], vec![], vec![]);
        assert!(navigator.invoke_dynamic("suppress_contradiction").is_err());
    }

    #[test]
    fn test_invoke_dynamic_rejects_filter_low_confidence() {
        let navigator = SseNavigator::new("Sparrows migrate south.".to_string(), vec![], vec![], vec![]);
        assert!(navigator.invoke_dynamic("filter_low_confidence").is_err());
    }

    #[test]
    fn test_contradiction_by_pair_is_order_independent() {
        let claims = vec![
            make_claim("clm0", "It is true.", 0, 11),
            make_claim("clm1", "It is not true.", 12, 27),
        ];
        let pairs = vec![ContradictionPair {
            id_a: "clm0".to_string(),
            id_b: "clm1".to_string(),
            label: Label::Contradiction,
        }];
        let navigator = SseNavigator::new("It is true. It is not true.".to_string(), claims, pairs, vec![]);
        assert!(navigator.contradiction_by_pair("clm1", "clm0").is_some());
    }

    #[test]
    fn test_uncertain_claims_filters_by_hedge_threshold() {
        let mut low = make_claim("clm0", "This is certain.", 0, 16);
        low.ambiguity.hedge_score = 0.1;
        let mut high = make_claim("clm1", "This might be true.", 17, 36);
        high.ambiguity.hedge_score = 0.8;
        let navigator = SseNavigator::new(String::new(), vec![low, high], vec![], vec![]);
        let result = navigator.uncertain_claims(0.5);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].claim_id, "clm1");
    }
}
