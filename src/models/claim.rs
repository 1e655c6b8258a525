//! Claim and chunk types for the Semantic String Engine.

use serde::{Deserialize, Serialize};

/// A verbatim quote backing a claim, with exact byte offsets into the
/// source document.
///
/// Invariant (Quoting, spec.md Invariant I): `source[start_char..end_char]
/// == quote_text` exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportingQuote {
    /// The exact substring of the source document.
    pub quote_text: String,
    /// Which chunk this quote was found in.
    pub chunk_id: String,
    /// Document-relative start byte offset (inclusive).
    pub start_char: usize,
    /// Document-relative end byte offset (exclusive).
    pub end_char: usize,
}

/// Ambiguity markers attached to a claim: hedge language, conflict
/// markers, and open questions. Exposed as-is by the SSE façade, never
/// softened or filtered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ambiguity {
    /// Fraction of the claim's tokens that are hedge words, in `[0, 1]`.
    pub hedge_score: f64,
    /// Whether the claim text itself contains conflict markers (e.g. "but",
    /// "however").
    pub contains_conflict_markers: bool,
    /// Open questions the claim text itself raises (rare; usually empty).
    pub open_questions: Vec<String>,
}

/// A single extracted claim.
///
/// Invariant (Non-fabrication, spec.md Invariant IV): `claim_text` is a
/// substring (or assertive-filtered normalization preserving content) of
/// the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// Stable identifier, unique within a document's extraction.
    pub claim_id: String,
    /// The claim's text (the source sentence, possibly whitespace-normalized).
    pub claim_text: String,
    /// Which document this claim was extracted from.
    pub doc_id: String,
    /// At least one supporting quote (spec.md Invariant I).
    pub supporting_quotes: Vec<SupportingQuote>,
    /// Ambiguity markers.
    pub ambiguity: Ambiguity,
}

/// A contiguous span of a document, produced by the chunker.
///
/// Invariant (Losslessness, spec.md Invariant V): `source[start_char..end_char]
/// == text` byte-exact, including whitespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier within the document (`c0`, `c1`, ...).
    pub chunk_id: String,
    /// Which document this chunk belongs to.
    pub doc_id: String,
    /// The exact source substring `source[start_char..end_char]`.
    pub text: String,
    /// Document-relative start byte offset (inclusive).
    pub start_char: usize,
    /// Document-relative end byte offset (exclusive).
    pub end_char: usize,
}
