//! Claim extraction (spec.md §4.8), grounded verbatim on
//! `original_source/sse/extractor.py`.

use super::chunker::split_sentences_with_offsets;
use crate::config::SseConfig;
use crate::embedding::cosine_similarity;
use crate::llm::{ClaimExtractionProvider, LlmClaimCandidate};
use crate::models::{Ambiguity, Chunk, Claim, SupportingQuote};

/// Phrases that disqualify an otherwise assertive-looking sentence,
/// grounded verbatim on the original's `FILLER_PHRASES`.
const FILLER_PHRASES: &[&str] = &[
    "note:",
    "fyi",
    "example",
    "e.g",
    "i.e",
    "etc.",
    "by the way",
    "in other words",
    "that is",
    "as mentioned",
    "as stated",
];

/// Hedge words used to compute a claim's `ambiguity.hedge_score`,
/// grounded verbatim on the original's `HEDGE_WORDS`.
const HEDGE_WORDS: &[&str] = &[
    "may", "might", "could", "seems", "suggests", "possible", "unclear", "likely", "appears",
    "arguably", "apparently", "perhaps", "tend",
];

const NEGATION_WORDS: &[&str] = &[
    "not",
    "no",
    "never",
    "neither",
    "nor",
    "nobody",
    "nothing",
    "nowhere",
    "doesn't",
    "don't",
    "didn't",
    "isn't",
    "aren't",
    "wasn't",
    "weren't",
    "haven't",
    "hasn't",
    "hadn't",
    "won't",
    "wouldn't",
    "shouldn't",
    "can't",
    "couldn't",
    "cannot",
    "mustn't",
    "mightn't",
    "needn't",
];

const NEGATION_PATTERNS: &[&str] = &[
    "fails to",
    "failed to",
    "lack",
    "lacks",
    "lacking",
    "without",
    "absence of",
    "devoid of",
    "free from",
    "unable to",
    "incapable of",
    "insufficient",
];

/// Whether `text` carries a negation marker, grounded verbatim on the
/// original's `has_negation_word` (word-set plus multi-word patterns;
/// distinct from `contradiction::heuristic_contradiction`'s own negation
/// check, which is grounded on a different original file).
#[must_use]
pub fn has_negation_word(text: &str) -> bool {
    let lower = text.to_lowercase();
    let words: std::collections::HashSet<&str> = lower.split_whitespace().collect();
    if NEGATION_WORDS.iter().any(|word| words.contains(word)) {
        return true;
    }
    NEGATION_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Collapses whitespace runs and trims, grounded verbatim on the
/// original's `normalize_claim_text`.
#[must_use]
pub fn normalize_claim_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether a sentence is assertive enough to become a claim: not a
/// question, ends with `.` or `!` (spec.md §4.8's explicit requirement,
/// tightening the original which relied on its own sentence splitter
/// never yielding unterminated fragments), at least 3 tokens, and not a
/// filler phrase.
#[must_use]
pub fn is_assertive(sentence: &str) -> bool {
    let s = sentence.trim();
    if s.ends_with('?') {
        return false;
    }
    if !(s.ends_with('.') || s.ends_with('!')) {
        return false;
    }
    if s.split_whitespace().count() < 3 {
        return false;
    }
    let lower = s.to_lowercase();
    !FILLER_PHRASES.iter().any(|filler| lower.contains(filler))
}

/// Normalized text similarity in `[0, 1]`, grounded on the original's
/// `SequenceMatcher`-based `string_similarity`.
#[must_use]
pub fn string_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Computes a claim's hedge score: the fraction of its tokens that are
/// hedge words.
#[must_use]
pub fn hedge_score(text: &str) -> f64 {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let hedged = tokens
        .iter()
        .filter(|token| {
            let lower = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            HEDGE_WORDS.contains(&lower.as_str())
        })
        .count();
    hedged as f64 / tokens.len() as f64
}

fn ambiguity_for(text: &str) -> Ambiguity {
    Ambiguity {
        hedge_score: hedge_score(text),
        contains_conflict_markers: text.to_lowercase().contains(" but ")
            || text.to_lowercase().contains(" however"),
        open_questions: Vec::new(),
    }
}

struct Candidate {
    text: String,
    quote: SupportingQuote,
    embedding_chunk_index: usize,
}

fn parse_chunk_index(chunk_id: &str) -> usize {
    chunk_id.trim_start_matches('c').parse().unwrap_or(0)
}

/// Rule-based claim extraction across every chunk of one document.
/// `chunk_embeddings` is indexed by the chunk's numeric suffix (`c0` ->
/// index 0, matching the original's own `int(chunk_id[1:])` lookup,
/// since chunk-level rather than sentence-level embeddings are used for
/// the dedup pre-filter).
#[must_use]
pub fn extract_claims(
    chunks: &[Chunk],
    chunk_embeddings: &[Vec<f32>],
    doc_id: &str,
    config: &SseConfig,
) -> Vec<Claim> {
    let mut candidates = Vec::new();
    for chunk in chunks {
        let embedding_chunk_index = parse_chunk_index(&chunk.chunk_id);
        for (start, end) in split_sentences_with_offsets(&chunk.text) {
            let raw_sentence = &chunk.text[start..end];
            let normalized = normalize_claim_text(raw_sentence);
            if normalized.is_empty() || !is_assertive(&normalized) {
                continue;
            }
            candidates.push(Candidate {
                text: normalized,
                quote: SupportingQuote {
                    quote_text: raw_sentence.to_string(),
                    chunk_id: chunk.chunk_id.clone(),
                    start_char: chunk.start_char + start,
                    end_char: chunk.start_char + end,
                },
                embedding_chunk_index,
            });
        }
    }
    dedupe_and_build(candidates, chunk_embeddings, doc_id, config)
}

fn dedupe_and_build(
    candidates: Vec<Candidate>,
    chunk_embeddings: &[Vec<f32>],
    doc_id: &str,
    config: &SseConfig,
) -> Vec<Claim> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut kept: Vec<usize> = Vec::new();
    for i in 0..candidates.len() {
        let mut duplicate = false;
        for &j in &kept {
            let Some(emb_i) = chunk_embeddings.get(candidates[i].embedding_chunk_index) else {
                continue;
            };
            let Some(emb_j) = chunk_embeddings.get(candidates[j].embedding_chunk_index) else {
                continue;
            };
            let similarity = cosine_similarity(emb_i, emb_j);
            if similarity <= config.dedup_cosine_theta {
                continue;
            }
            let neg_i = has_negation_word(&candidates[i].text);
            let neg_j = has_negation_word(&candidates[j].text);
            if neg_i != neg_j {
                continue;
            }
            if string_similarity(&candidates[i].text, &candidates[j].text)
                > config.dedup_text_similarity_theta
            {
                duplicate = true;
                break;
            }
        }
        if !duplicate {
            kept.push(i);
        }
    }

    kept.into_iter()
        .enumerate()
        .map(|(k, i)| {
            let candidate = &candidates[i];
            Claim {
                claim_id: format!("clm{k}"),
                claim_text: candidate.text.clone(),
                doc_id: doc_id.to_string(),
                supporting_quotes: vec![candidate.quote.clone()],
                ambiguity: ambiguity_for(&candidate.text),
            }
        })
        .collect()
}

/// LLM-assisted claim extraction for one chunk: every returned quote is
/// validated against the chunk substring at >= `config.llm_quote_similarity_theta`
/// similarity and in-bounds offsets; invalid quotes are dropped, and a
/// claim with no surviving quote is dropped. If the provider errors or
/// returns nothing usable, falls back to [`extract_claims`]-style
/// rule-based extraction restricted to this one chunk.
#[must_use]
pub fn extract_claims_with_llm(
    chunk: &Chunk,
    provider: &dyn ClaimExtractionProvider,
    config: &SseConfig,
) -> Vec<Claim> {
    let candidates = match provider.extract_claims(&chunk.text) {
        Ok(candidates) if !candidates.is_empty() => candidates,
        _ => return rule_based_fallback(chunk),
    };

    let mut claims = Vec::new();
    for (k, candidate) in candidates.into_iter().enumerate() {
        let quotes = validate_quotes(&candidate, chunk, config);
        if quotes.is_empty() {
            continue;
        }
        claims.push(Claim {
            claim_id: format!("clm{k}"),
            claim_text: candidate.claim_text.clone(),
            doc_id: chunk.doc_id.clone(),
            ambiguity: ambiguity_for(&candidate.claim_text),
            supporting_quotes: quotes,
        });
    }

    if claims.is_empty() {
        rule_based_fallback(chunk)
    } else {
        claims
    }
}

fn validate_quotes(
    candidate: &LlmClaimCandidate,
    chunk: &Chunk,
    config: &SseConfig,
) -> Vec<SupportingQuote> {
    let mut quotes = Vec::new();
    for (text, start, end) in &candidate.quotes {
        if *start >= *end || *end > chunk.text.len() {
            continue;
        }
        if !chunk.text.is_char_boundary(*start) || !chunk.text.is_char_boundary(*end) {
            continue;
        }
        let actual = &chunk.text[*start..*end];
        if string_similarity(actual, text) < config.llm_quote_similarity_theta {
            continue;
        }
        quotes.push(SupportingQuote {
            quote_text: actual.to_string(),
            chunk_id: chunk.chunk_id.clone(),
            start_char: chunk.start_char + start,
            end_char: chunk.start_char + end,
        });
    }
    quotes
}

fn rule_based_fallback(chunk: &Chunk) -> Vec<Claim> {
    let mut claims = Vec::new();
    let mut k = 0;
    for (start, end) in split_sentences_with_offsets(&chunk.text) {
        let raw_sentence = &chunk.text[start..end];
        let normalized = normalize_claim_text(raw_sentence);
        if normalized.is_empty() || !is_assertive(&normalized) {
            continue;
        }
        claims.push(Claim {
            claim_id: format!("clm{k}"),
            claim_text: normalized.clone(),
            doc_id: chunk.doc_id.clone(),
            supporting_quotes: vec![SupportingQuote {
                quote_text: raw_sentence.to_string(),
                chunk_id: chunk.chunk_id.clone(),
                start_char: chunk.start_char + start,
                end_char: chunk.start_char + end,
            }],
            ambiguity: ambiguity_for(&normalized),
        });
        k += 1;
    }
    claims
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Result;

    #[test]
    fn test_is_assertive_rejects_question() {
        assert!(!is_assertive("Is this true?"));
    }

    #[test]
    fn test_is_assertive_rejects_short_sentence() {
        assert!(!is_assertive("Yes indeed."));
    }

    #[test]
    fn test_is_assertive_rejects_filler() {
        assert!(!is_assertive("Note: this is just an example."));
    }

    #[test]
    fn test_is_assertive_accepts_plain_sentence() {
        assert!(is_assertive("The system processes requests correctly."));
    }

    #[test]
    fn test_has_negation_word_detects_word() {
        assert!(has_negation_word("The system does not comply."));
    }

    #[test]
    fn test_has_negation_word_detects_pattern() {
        assert!(has_negation_word("The report lacks sufficient detail."));
    }

    #[test]
    fn test_dedup_preserves_negation_mismatch() {
        let config = SseConfig::default();
        let chunk = Chunk {
            chunk_id: "c0".to_string(),
            doc_id: "doc1".to_string(),
            text: "The statement is true. The statement is not true.".to_string(),
            start_char: 0,
            end_char: 51,
        };
        let embeddings = vec![vec![1.0, 0.0]];
        let claims = extract_claims(&[chunk], &embeddings, "doc1", &config);
        assert_eq!(claims.len(), 2);
    }

    #[test]
    fn test_dedup_removes_near_identical_claims() {
        let config = SseConfig::default();
        let chunk1 = Chunk {
            chunk_id: "c0".to_string(),
            doc_id: "doc1".to_string(),
            text: "The system processes requests quickly.".to_string(),
            start_char: 0,
            end_char: 39,
        };
        let chunk2 = Chunk {
            chunk_id: "c1".to_string(),
            doc_id: "doc1".to_string(),
            text: "The system processes requests quickly.".to_string(),
            start_char: 39,
            end_char: 78,
        };
        let embeddings = vec![vec![1.0, 0.0], vec![1.0, 0.0]];
        let claims = extract_claims(&[chunk1, chunk2], &embeddings, "doc1", &config);
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn test_quote_text_is_always_exact_substring() {
        let config = SseConfig::default();
        let chunk = Chunk {
            chunk_id: "c0".to_string(),
            doc_id: "doc1".to_string(),
            text: "Sentence one is here. Sentence two follows.".to_string(),
            start_char: 10,
            end_char: 54,
        };
        let embeddings = vec![vec![1.0, 0.0]];
        let claims = extract_claims(&[chunk.clone()], &embeddings, "doc1", &config);
        for claim in &claims {
            for quote in &claim.supporting_quotes {
                let local_start = quote.start_char - chunk.start_char;
                let local_end = quote.end_char - chunk.start_char;
                assert_eq!(&chunk.text[local_start..local_end], quote.quote_text);
            }
        }
    }

    struct StaticProvider(Vec<LlmClaimCandidate>);
    impl ClaimExtractionProvider for StaticProvider {
        fn extract_claims(&self, _chunk_text: &str) -> Result<Vec<LlmClaimCandidate>> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;
    impl ClaimExtractionProvider for FailingProvider {
        fn extract_claims(&self, _chunk_text: &str) -> Result<Vec<LlmClaimCandidate>> {
            Err(crate::Error::LLMUnavailable("down".to_string()))
        }
    }

    #[test]
    fn test_llm_invalid_quote_is_dropped() {
        let config = SseConfig::default();
        let chunk = Chunk {
            chunk_id: "c0".to_string(),
            doc_id: "doc1".to_string(),
            text: "The server restarted at midnight.".to_string(),
            start_char: 0,
            end_char: 34,
        };
        let provider = StaticProvider(vec![LlmClaimCandidate {
            claim_text: "The server restarted.".to_string(),
            quotes: vec![("completely different text".to_string(), 0, 10)],
        }]);
        let claims = extract_claims_with_llm(&chunk, &provider, &config);
        assert!(claims.iter().all(|c| c.claim_text != "The server restarted."));
    }

    #[test]
    fn test_llm_failure_falls_back_to_rule_based() {
        let config = SseConfig::default();
        let chunk = Chunk {
            chunk_id: "c0".to_string(),
            doc_id: "doc1".to_string(),
            text: "The server restarted at midnight.".to_string(),
            start_char: 0,
            end_char: 34,
        };
        let claims = extract_claims_with_llm(&chunk, &FailingProvider, &config);
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn test_llm_valid_quote_is_kept() {
        let config = SseConfig::default();
        let chunk = Chunk {
            chunk_id: "c0".to_string(),
            doc_id: "doc1".to_string(),
            text: "The server restarted at midnight.".to_string(),
            start_char: 0,
            end_char: 34,
        };
        let provider = StaticProvider(vec![LlmClaimCandidate {
            claim_text: "The server restarted at midnight.".to_string(),
            quotes: vec![("The server restarted at midnight.".to_string(), 0, 34)],
        }]);
        let claims = extract_claims_with_llm(&chunk, &provider, &config);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].supporting_quotes[0].quote_text, "The server restarted at midnight.");
    }
}
