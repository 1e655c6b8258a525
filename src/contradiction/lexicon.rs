//! Negation detection and the opposition lexicon, grounded verbatim on
//! `original_source/sse/contradictions.py`'s `heuristic_contradiction`.

/// Negation markers checked as substrings, exactly as in the original's
/// `neg_words` set (note the leading/trailing spaces, which is why these
/// are matched against a padded copy of the text rather than word-split).
const NEGATION_WORDS: &[&str] = &["not ", "n't ", "no ", "never ", "cannot ", "can't "];

/// Fixed opposition pairs: if one text contains the left word and the
/// other contains the right word (in either direction), the pair is
/// flagged as a contradiction. Grounded verbatim on the original's
/// `opposition_pairs` list.
const OPPOSITION_PAIRS: &[(&str, &str)] = &[
    ("round", "flat"),
    ("beneficial", "harmful"),
    ("beneficial", "dangerous"),
    ("safe", "dangerous"),
    ("effective", "ineffective"),
    ("real", "hoax"),
    ("true", "false"),
    ("healthy", "unhealthy"),
    ("improves", "damages"),
    ("helps", "hurts"),
    ("agree", "disagree"),
];

/// Whether `text` contains any negation marker, grounded verbatim on the
/// original's substring check against a space-padded copy of the text.
#[must_use]
pub fn has_negation_word(text: &str) -> bool {
    let padded = format!(" {} ", text.to_lowercase());
    NEGATION_WORDS.iter().any(|word| padded.contains(word))
}

/// Whether `a` and `b` contain opposite ends of any fixed opposition pair.
#[must_use]
pub fn opposition_match(a: &str, b: &str) -> bool {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    OPPOSITION_PAIRS.iter().any(|(left, right)| {
        (a_lower.contains(left) && b_lower.contains(right))
            || (a_lower.contains(right) && b_lower.contains(left))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_negation_word_detected() {
        assert!(has_negation_word("This is not correct."));
        assert!(has_negation_word("It isn't working."));
    }

    #[test]
    fn test_no_negation_word() {
        assert!(!has_negation_word("This is correct and great."));
    }

    #[test]
    fn test_opposition_match_either_direction() {
        assert!(opposition_match("The earth is round.", "The earth is flat."));
        assert!(opposition_match("The earth is flat.", "The earth is round."));
    }

    #[test]
    fn test_opposition_no_match() {
        assert!(!opposition_match("I like tea.", "I like coffee."));
    }
}
