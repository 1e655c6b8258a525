//! The Semantic String Engine (spec.md §4.8): chunking, claim extraction,
//! a read-only boundary-enforced navigation façade, and a disagreement
//! coherence tracker. Grounded on `original_source/sse/` throughout.

pub mod chunker;
pub mod claims;
pub mod coherence;
pub mod facade;

pub use chunker::chunk_text;
pub use claims::{extract_claims, extract_claims_with_llm};
pub use coherence::{ClaimCoherence, CoherenceReport, CoherenceTracker};
pub use facade::SseNavigator;
