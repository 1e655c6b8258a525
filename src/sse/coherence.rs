//! The coherence tracker (spec.md §4.8): observes and records disagreement
//! patterns between claims without ever resolving them, grounded verbatim
//! on `original_source/sse/coherence.py`'s `CoherenceTracker`.

use crate::contradiction::ContradictionPair;
use crate::models::{Claim, DisagreementEdge, Relationship};
use crate::Error;
use std::collections::{HashMap, HashSet};

/// Coherence metadata for a single claim: how many other claims it
/// relates to, broken down by relationship kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimCoherence {
    /// The claim this summarizes.
    pub claim_id: String,
    /// Total edges touching this claim.
    pub total_relationships: usize,
    /// Direct contradictions.
    pub contradictions: usize,
    /// Conflicts that don't rise to contradiction.
    pub conflicts: usize,
    /// Edges that qualify this claim.
    pub qualifications: usize,
    /// Edges that agree with this claim.
    pub agreements: usize,
    /// Edges whose relationship is uncertain.
    pub ambiguous_relationships: usize,
}

/// One entry in [`CoherenceReport::highest_conflict_claims`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimDegree {
    /// The claim id.
    pub claim_id: String,
    /// Number of edges touching it.
    pub relationships: usize,
}

/// Overall disagreement statistics for one document, grounded verbatim
/// on `get_coherence_report`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoherenceReport {
    /// Total distinct claims considered.
    pub total_claims: usize,
    /// Total disagreement edges.
    pub total_disagreement_edges: usize,
    /// Edges classified as contradictions.
    pub contradiction_edges: usize,
    /// Edges classified as conflicts.
    pub conflict_edges: usize,
    /// Edges classified as qualifications.
    pub qualification_edges: usize,
    /// Edges classified as uncertain.
    pub ambiguous_edges: usize,
    /// `total_disagreement_edges / C(total_claims, 2)`, `0.0` if fewer
    /// than two claims.
    pub disagreement_density: f64,
    /// Up to five claims with the most relationships, descending.
    pub highest_conflict_claims: Vec<ClaimDegree>,
    /// Connected components of the contradicts/conflicts subgraph with
    /// more than one member.
    pub disagreement_clusters: Vec<Vec<String>>,
    /// Claims touched by zero disagreement edges.
    pub num_isolated_claims: usize,
}

/// Observes disagreement between claims. Never resolves, picks a side,
/// or filters disagreement out — those operations are reachable only
/// through [`CoherenceTracker::invoke_dynamic`], which always errors.
pub struct CoherenceTracker {
    claims: HashMap<String, Claim>,
    edges: HashMap<(String, String), DisagreementEdge>,
}

impl CoherenceTracker {
    /// Builds the disagreement graph from a document's claims and its
    /// detected contradiction pairs, grounded on `_build_disagreement_graph`.
    /// Evidence quotes for an edge are every supporting quote of both
    /// claims in the pair.
    #[must_use]
    pub fn build(claims: &[Claim], pairs: &[ContradictionPair]) -> Self {
        let claims_by_id: HashMap<String, Claim> = claims
            .iter()
            .map(|claim| (claim.claim_id.clone(), claim.clone()))
            .collect();

        let mut edges = HashMap::new();
        for pair in pairs {
            let key = DisagreementEdge::canonical_key(&pair.id_a, &pair.id_b);
            let relationship = Relationship::classify(pair.label.as_str());

            let evidence_quotes: Vec<String> = [&pair.id_a, &pair.id_b]
                .into_iter()
                .filter_map(|id| claims_by_id.get(id))
                .flat_map(|claim| claim.supporting_quotes.iter().map(|q| q.quote_text.clone()))
                .collect();
            let confidence = (evidence_quotes.len() as f64 / 2.0).min(1.0);

            let text_a = claims_by_id
                .get(&pair.id_a)
                .map(|c| truncate(&c.claim_text, 50))
                .unwrap_or_default();
            let text_b = claims_by_id
                .get(&pair.id_b)
                .map(|c| truncate(&c.claim_text, 50))
                .unwrap_or_default();
            let reasoning = format!("{text_a}... vs {text_b}... ({})", pair.label.as_str());

            edges.insert(
                key.clone(),
                DisagreementEdge {
                    claim_id_a: key.0,
                    claim_id_b: key.1,
                    relationship,
                    confidence,
                    evidence_quotes,
                    reasoning,
                },
            );
        }

        Self {
            claims: claims_by_id,
            edges,
        }
    }

    // ===== PERMITTED OPERATIONS =====

    /// Coherence metadata for one claim, or `None` if it doesn't exist.
    #[must_use]
    pub fn coherence_of(&self, claim_id: &str) -> Option<ClaimCoherence> {
        if !self.claims.contains_key(claim_id) {
            return None;
        }
        let mut result = ClaimCoherence {
            claim_id: claim_id.to_string(),
            total_relationships: 0,
            contradictions: 0,
            conflicts: 0,
            qualifications: 0,
            agreements: 0,
            ambiguous_relationships: 0,
        };
        for ((a, b), edge) in &self.edges {
            if a != claim_id && b != claim_id {
                continue;
            }
            result.total_relationships += 1;
            match edge.relationship {
                Relationship::Contradicts => result.contradictions += 1,
                Relationship::Conflicts => result.conflicts += 1,
                Relationship::Qualifies => result.qualifications += 1,
                Relationship::Uncertain => result.ambiguous_relationships += 1,
                Relationship::Agrees => result.agreements += 1,
            }
        }
        Some(result)
    }

    /// Every disagreement edge touching `claim_id`, or all edges if
    /// `claim_id` is `None`.
    #[must_use]
    pub fn edges(&self, claim_id: Option<&str>) -> Vec<&DisagreementEdge> {
        match claim_id {
            None => self.edges.values().collect(),
            Some(claim_id) => self
                .edges
                .iter()
                .filter(|((a, b), _)| a == claim_id || b == claim_id)
                .map(|(_, edge)| edge)
                .collect(),
        }
    }

    /// Claims related to `claim_id`, optionally filtered to one
    /// relationship kind, as `(related_claim_id, relationship)` pairs.
    #[must_use]
    pub fn neighbors(
        &self,
        claim_id: &str,
        relationship: Option<Relationship>,
    ) -> Vec<(String, Relationship)> {
        let mut result = Vec::new();
        for ((a, b), edge) in &self.edges {
            if let Some(wanted) = relationship {
                if edge.relationship != wanted {
                    continue;
                }
            }
            if a == claim_id {
                result.push((b.clone(), edge.relationship));
            } else if b == claim_id {
                result.push((a.clone(), edge.relationship));
            }
        }
        result
    }

    /// Connected components of the contradicts/conflicts subgraph with
    /// more than one member, grounded on `get_disagreement_clusters`.
    #[must_use]
    pub fn clusters_of_disagreement(&self) -> Vec<Vec<String>> {
        let mut adjacency: HashMap<&str, HashSet<&str>> =
            self.claims.keys().map(|id| (id.as_str(), HashSet::new())).collect();
        for ((a, b), edge) in &self.edges {
            if matches!(edge.relationship, Relationship::Contradicts | Relationship::Conflicts) {
                adjacency.entry(a.as_str()).or_default().insert(b.as_str());
                adjacency.entry(b.as_str()).or_default().insert(a.as_str());
            }
        }

        let mut visited = HashSet::new();
        let mut clusters = Vec::new();
        for claim_id in self.claims.keys() {
            if visited.contains(claim_id.as_str()) {
                continue;
            }
            let cluster = dfs_cluster(claim_id, &adjacency, &mut visited);
            if cluster.len() > 1 {
                let mut cluster: Vec<String> = cluster.into_iter().map(str::to_string).collect();
                cluster.sort();
                clusters.push(cluster);
            }
        }
        clusters
    }

    /// Overall disagreement statistics, grounded on `get_coherence_report`.
    #[must_use]
    pub fn report(&self) -> CoherenceReport {
        let total_claims = self.claims.len();
        let total_disagreement_edges = self.edges.len();
        let mut contradiction_edges = 0;
        let mut conflict_edges = 0;
        let mut qualification_edges = 0;
        let mut ambiguous_edges = 0;
        for edge in self.edges.values() {
            match edge.relationship {
                Relationship::Contradicts => contradiction_edges += 1,
                Relationship::Conflicts => conflict_edges += 1,
                Relationship::Qualifies => qualification_edges += 1,
                Relationship::Uncertain => ambiguous_edges += 1,
                Relationship::Agrees => {}
            }
        }

        let mut degrees: Vec<ClaimDegree> = self
            .claims
            .keys()
            .map(|claim_id| ClaimDegree {
                claim_id: claim_id.clone(),
                relationships: self.coherence_of(claim_id).map_or(0, |c| c.total_relationships),
            })
            .collect();
        degrees.sort_by(|a, b| b.relationships.cmp(&a.relationships).then(a.claim_id.cmp(&b.claim_id)));
        let num_isolated_claims = degrees.iter().filter(|d| d.relationships == 0).count();
        degrees.truncate(5);

        let disagreement_density = if total_claims > 1 {
            total_disagreement_edges as f64 / (total_claims as f64 * (total_claims as f64 - 1.0) / 2.0)
        } else {
            0.0
        };

        CoherenceReport {
            total_claims,
            total_disagreement_edges,
            contradiction_edges,
            conflict_edges,
            qualification_edges,
            ambiguous_edges,
            disagreement_density,
            highest_conflict_claims: degrees,
            disagreement_clusters: self.clusters_of_disagreement(),
            num_isolated_claims,
        }
    }

    // ===== FORBIDDEN OPERATIONS =====

    /// The only entry point recognizing forbidden operation names
    /// (`resolve_disagreement`, `pick_coherent_subset`,
    /// `synthesize_resolution`); always returns `Error::BoundaryViolation`
    /// (DESIGN.md Open Question #4).
    ///
    /// # Errors
    ///
    /// Always returns `Error::BoundaryViolation`.
    pub fn invoke_dynamic(&self, op: &str) -> Result<(), Error> {
        let reason = match op {
            "resolve_disagreement" => {
                "coherence tracking observes disagreement, it never resolves it; both sides remain equally valid"
            }
            "pick_coherent_subset" => {
                "coherence tracking never filters out disagreement; all claims are preserved"
            }
            "synthesize_resolution" => {
                "coherence tracking never synthesizes resolutions; disagreement is observed, not resolved"
            }
            _ => "unrecognized operation",
        };
        Err(Error::BoundaryViolation {
            operation: op.to_string(),
            reason: reason.to_string(),
        })
    }
}

fn dfs_cluster<'a>(
    start: &'a str,
    adjacency: &HashMap<&'a str, HashSet<&'a str>>,
    visited: &mut HashSet<&'a str>,
) -> HashSet<&'a str> {
    let mut stack = vec![start];
    let mut cluster = HashSet::new();
    while let Some(node) = stack.pop() {
        if visited.contains(node) {
            continue;
        }
        visited.insert(node);
        cluster.insert(node);
        if let Some(neighbors) = adjacency.get(node) {
            for neighbor in neighbors {
                if !visited.contains(neighbor) {
                    stack.push(neighbor);
                }
            }
        }
    }
    cluster
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
