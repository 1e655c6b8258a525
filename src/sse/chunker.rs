//! Byte-exact, abbreviation-aware sentence chunking (spec.md §4.8),
//! grounded on `original_source/sse/chunker.py`. Diverges from the
//! original's `chunk_text` on text reconstruction: chunk/sentence text is
//! always a substring of the source, never rebuilt by joining (DESIGN.md
//! Open Question #2).

use crate::config::SseConfig;
use crate::models::Chunk;
use once_cell::sync::Lazy;
use regex::Regex;

/// Abbreviations whose trailing `.` must not be treated as a sentence
/// boundary, grounded verbatim on the original's `_ABBREVIATIONS` set.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "dr", "ms", "jr", "sr", "prof", "inc", "e.g", "i.e", "etc", "vs", "st", "rd",
];

#[allow(clippy::unwrap_used)]
static SENTENCE_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").unwrap());

fn preceding_word_is_abbreviation(text: &str, boundary_start: usize) -> bool {
    let before = &text[..boundary_start];
    let word: String = before
        .chars()
        .rev()
        .take_while(|c| c.is_alphanumeric() || *c == '.')
        .collect::<String>()
        .chars()
        .rev()
        .collect();
    let lower = word.trim_end_matches('.').to_lowercase();
    ABBREVIATIONS.contains(&lower.as_str())
}

/// Splits `text` into sentences, returning `(start, end)` byte offsets
/// for each, relative to `text`. Grounded on the original's
/// `_split_sentences_with_offsets`: a boundary is a run of `.`/`!`/`?`
/// not immediately preceded by a known abbreviation.
#[must_use]
pub fn split_sentences_with_offsets(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut sentence_start = 0;
    let mut cursor = 0;

    for m in SENTENCE_BOUNDARY.find_iter(text) {
        if preceding_word_is_abbreviation(text, m.start()) {
            continue;
        }
        let end = m.end();
        if end > sentence_start {
            spans.push((sentence_start, end));
        }
        sentence_start = end;
        cursor = end;
    }

    if sentence_start < text.len() {
        spans.push((sentence_start, text.len()));
    } else if cursor == 0 && text.is_empty() {
        // nothing to split
    }

    spans
}

/// Splits `text` into sentence substrings (convenience wrapper around
/// [`split_sentences_with_offsets`]), mirroring the original's
/// `split_sentences`.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<&str> {
    split_sentences_with_offsets(text)
        .into_iter()
        .map(|(start, end)| &text[start..end])
        .collect()
}

/// Assembles `source` into overlapping [`Chunk`]s bounded by sentence
/// offsets, never exceeding `config.max_chunk_chars` except when a
/// single sentence alone is longer (in which case that sentence becomes
/// its own chunk). `Chunk::text` is always `source[start..end]`
/// (Losslessness invariant).
#[must_use]
pub fn chunk_text(source: &str, doc_id: &str, config: &SseConfig) -> Vec<Chunk> {
    if source.is_empty() {
        return Vec::new();
    }

    let sentence_offsets = split_sentences_with_offsets(source);
    if sentence_offsets.is_empty() {
        return vec![Chunk {
            chunk_id: "c0".to_string(),
            doc_id: doc_id.to_string(),
            text: source.to_string(),
            start_char: 0,
            end_char: source.len(),
        }];
    }

    let mut chunks = Vec::new();
    let mut index = 0usize;
    let mut chunk_index = 0usize;

    while index < sentence_offsets.len() {
        let chunk_start = sentence_offsets[index].0;
        let mut chunk_end = sentence_offsets[index].1;
        let mut next = index + 1;

        while next < sentence_offsets.len() {
            let candidate_end = sentence_offsets[next].1;
            if candidate_end - chunk_start > config.max_chunk_chars {
                break;
            }
            chunk_end = candidate_end;
            next += 1;
        }

        chunks.push(Chunk {
            chunk_id: format!("c{chunk_index}"),
            doc_id: doc_id.to_string(),
            text: source[chunk_start..chunk_end].to_string(),
            start_char: chunk_start,
            end_char: chunk_end,
        });
        chunk_index += 1;

        if next >= sentence_offsets.len() {
            break;
        }

        // Advance `index` so the next chunk starts `overlap` characters
        // back from this chunk's end, rounded to a sentence boundary.
        let overlap_target = chunk_end.saturating_sub(config.chunk_overlap_chars);
        let mut back_index = next;
        while back_index > index && sentence_offsets[back_index - 1].0 >= overlap_target {
            back_index -= 1;
        }
        index = back_index.max(index + 1);
    }

    chunks
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences_basic() {
        let sentences = split_sentences("I live in Seattle. I work at Acme.");
        assert_eq!(sentences, vec!["I live in Seattle.", " I work at Acme."]);
    }

    #[test]
    fn test_abbreviation_does_not_split() {
        let sentences = split_sentences("I met Dr. Smith yesterday. He was kind.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("Dr. Smith"));
    }

    #[test]
    fn test_chunk_text_is_always_exact_substring() {
        let source = "Sentence one is here. Sentence two follows. Sentence three ends it.";
        let config = SseConfig::default();
        let chunks = chunk_text(source, "doc1", &config);
        for chunk in &chunks {
            assert_eq!(&source[chunk.start_char..chunk.end_char], chunk.text);
        }
    }

    #[test]
    fn test_chunk_text_respects_max_chars_budget() {
        let source = "A. ".repeat(500);
        let mut config = SseConfig::default();
        config.max_chunk_chars = 50;
        config.chunk_overlap_chars = 10;
        let chunks = chunk_text(&source, "doc1", &config);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn test_empty_source_yields_no_chunks() {
        let config = SseConfig::default();
        assert!(chunk_text("", "doc1", &config).is_empty());
    }

    #[test]
    fn test_whitespace_between_sentences_preserved() {
        let source = "First one.\n\nSecond one.";
        let config = SseConfig::default();
        let chunks = chunk_text(source, "doc1", &config);
        let rejoined: String = chunks
            .iter()
            .map(|c| source[c.start_char..c.end_char].to_string())
            .collect::<Vec<_>>()
            .join("");
        assert!(rejoined.contains('\n'));
    }
}
