//! Tier A: deterministic, regex-based hard-slot extraction.
//!
//! The closed slot vocabulary and the regex-only subset are grounded
//! verbatim on `TwoTierFactSystem.HARD_SLOTS`/`REGEX_ONLY_SLOTS`. The
//! reference implementation's own pattern module (`fact_slots.py`) ships
//! only the `ExtractedFact` shape with no actual patterns, so the
//! patterns here are authored fresh against the slot semantics the rest
//! of the original describes.

use crate::models::{ExtractionMethod, Fact};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// The closed vocabulary of hard (Tier A) slots.
pub const HARD_SLOTS: &[&str] = &[
    "name",
    "employer",
    "title",
    "occupation",
    "location",
    "medical_diagnosis",
    "account_status",
    "legal_status",
    "relationship_status",
    "undergrad_school",
    "masters_school",
    "school",
    "graduation_year",
    "age",
    "programming_years",
    "first_language",
];

/// Slots precise enough to require regex only; never eligible for Tier B
/// promotion even when an open tuple happens to target the same concept.
pub const REGEX_ONLY_SLOTS: &[&str] = &["name", "age", "graduation_year"];

/// Enduring-fact slots that a same-sentence temporal/ephemeral marker
/// (spec.md §4.4's "I'm working on X tonight" example) suppresses.
const ENDURING_SLOTS_GUARDED_BY_TEMPORAL_MARKERS: &[&str] =
    &["employer", "location", "title", "occupation"];

const TEMPORAL_MARKERS: &[&str] = &[
    "tonight",
    "today",
    "this afternoon",
    "this morning",
    "this evening",
    "right now",
    "currently just",
];

struct SlotPattern {
    slot: &'static str,
    regex: Regex,
}

#[allow(clippy::unwrap_used)]
static SLOT_PATTERNS: Lazy<Vec<SlotPattern>> = Lazy::new(|| {
    let patterns: &[(&str, &str)] = &[
        ("name", r"(?i)\bmy name is ([A-Z][\w'-]*(?:\s+[A-Z][\w'-]*){0,2})"),
        ("name", r"(?i)\bi(?:'m| am) ([A-Z][\w'-]*(?:\s+[A-Z][\w'-]*){0,2})(?:,| and|\.|$)"),
        ("employer", r"(?i)\bi work (?:at|for) ([A-Z][\w.&' -]*?)(?:[.,!]|$)"),
        ("employer", r"(?i)\bemployed (?:at|by) ([A-Z][\w.&' -]*?)(?:[.,!]|$)"),
        ("title", r"(?i)\bmy (?:job )?title is ([\w\s-]+?)(?:[.,!]|$)"),
        ("title", r"(?i)\bi(?:'m| am) (?:the|a|an) ([\w\s-]+?) at\b"),
        ("occupation", r"(?i)\bi work as (?:a|an) ([\w\s-]+?)(?:[.,!]|$)"),
        ("occupation", r"(?i)\bi(?:'m| am) (?:a|an) ([\w\s-]+?)(?:[.,!]|$)"),
        ("location", r"(?i)\bi live in ([\w\s,-]+?)(?:[.,!]|$)"),
        ("location", r"(?i)\bi(?:'m| am) based in ([\w\s,-]+?)(?:[.,!]|$)"),
        ("location", r"(?i)\bi(?:'m| am) from ([\w\s,-]+?)(?:[.,!]|$)"),
        ("medical_diagnosis", r"(?i)\bdiagnosed with ([\w\s-]+?)(?:[.,!]|$)"),
        ("account_status", r"(?i)\bmy account (?:is|status is) ([\w\s-]+?)(?:[.,!]|$)"),
        ("legal_status", r"(?i)\bmy legal status is ([\w\s-]+?)(?:[.,!]|$)"),
        (
            "relationship_status",
            r"(?i)\bi(?:'m| am) (single|married|divorced|engaged|widowed|separated)\b",
        ),
        (
            "undergrad_school",
            r"(?i)\b(?:i went to|i studied at) ([\w\s,.'-]+?) for (?:my )?undergrad",
        ),
        (
            "masters_school",
            r"(?i)\b(?:i got|i did) my master'?s (?:at|from) ([\w\s,.'-]+?)(?:[.,!]|$)",
        ),
        ("school", r"(?i)\bi (?:go|went) to ([\w\s,.'-]+?)(?:[.,!]|$)"),
        ("graduation_year", r"(?i)\bi graduated in (\d{4})\b"),
        ("age", r"(?i)\bi(?:'m| am) (\d{1,3}) years old\b"),
        ("age", r"(?i)\bi(?:'m| am) (\d{1,3})\b(?! years)"),
        (
            "programming_years",
            r"(?i)\bi(?:'ve| have) been programming for (\d{1,2}) years\b",
        ),
        (
            "first_language",
            r"(?i)\bmy (?:first|native) language is ([\w\s-]+?)(?:[.,!]|$)",
        ),
    ];
    patterns
        .iter()
        .map(|(slot, pattern)| SlotPattern {
            slot,
            regex: Regex::new(pattern).unwrap(),
        })
        .collect()
});

fn contains_temporal_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    TEMPORAL_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Extracts every hard-slot match found in `text`, keyed by slot. When
/// more than one pattern matches the same slot, the first match wins.
/// Enduring-fact slots are suppressed entirely when the sentence also
/// contains a temporal/ephemeral marker.
#[must_use]
pub fn extract_hard_slots(text: &str, origin_utterance_id: &str) -> HashMap<String, Fact> {
    let mut facts = HashMap::new();
    if text.trim().is_empty() {
        return facts;
    }
    let temporal = contains_temporal_marker(text);
    for pattern in SLOT_PATTERNS.iter() {
        if facts.contains_key(pattern.slot) {
            continue;
        }
        if temporal && ENDURING_SLOTS_GUARDED_BY_TEMPORAL_MARKERS.contains(&pattern.slot) {
            continue;
        }
        if let Some(captures) = pattern.regex.captures(text) {
            if let Some(value) = captures.get(1) {
                let trimmed = value.as_str().trim();
                if !trimmed.is_empty() {
                    facts.insert(
                        pattern.slot.to_string(),
                        Fact::new(
                            pattern.slot,
                            trimmed,
                            origin_utterance_id,
                            ExtractionMethod::Regex,
                        ),
                    );
                }
            }
        }
    }
    facts
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_employer() {
        let facts = extract_hard_slots("I work at Acme Corp.", "u1");
        assert_eq!(facts.get("employer").unwrap().value, "Acme Corp");
    }

    #[test]
    fn test_extracts_location() {
        let facts = extract_hard_slots("I live in Seattle, Washington.", "u1");
        assert_eq!(facts.get("location").unwrap().value, "Seattle, Washington");
    }

    #[test]
    fn test_extracts_age() {
        let facts = extract_hard_slots("I am 34 years old.", "u1");
        assert_eq!(facts.get("age").unwrap().value, "34");
    }

    #[test]
    fn test_extracts_graduation_year() {
        let facts = extract_hard_slots("I graduated in 2015.", "u1");
        assert_eq!(facts.get("graduation_year").unwrap().value, "2015");
    }

    #[test]
    fn test_temporal_marker_suppresses_employer() {
        let facts = extract_hard_slots("I'm working at a client site tonight.", "u1");
        assert!(!facts.contains_key("employer"));
    }

    #[test]
    fn test_empty_text_yields_no_facts() {
        assert!(extract_hard_slots("", "u1").is_empty());
        assert!(extract_hard_slots("   ", "u1").is_empty());
    }

    #[test]
    fn test_relationship_status() {
        let facts = extract_hard_slots("I am married and happy.", "u1");
        assert_eq!(facts.get("relationship_status").unwrap().value, "married");
    }

    #[test]
    fn test_normalized_value_is_lowercased_and_collapsed() {
        let facts = extract_hard_slots("I live in   New   York.", "u1");
        let fact = facts.get("location").unwrap();
        assert_eq!(fact.normalized, "new york");
    }
}
