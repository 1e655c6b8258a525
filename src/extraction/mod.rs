//! Two-tier fact extraction (spec.md §4.4): deterministic hard slots
//! (Tier A) plus optional LLM-backed open tuples (Tier B), combined into
//! one [`TwoTierResult`] per utterance.

pub mod hard_slots;
pub mod open_tuples;

pub use hard_slots::{extract_hard_slots, HARD_SLOTS, REGEX_ONLY_SLOTS};
pub use open_tuples::TwoTierExtractor;
