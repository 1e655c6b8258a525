//! Data model: the record types shared across the memory store, the
//! contradiction ledger, and the Semantic String Engine.

mod claim;
mod coherence;
mod fact;
mod ledger;
mod memory;

pub use claim::{Ambiguity, Chunk, Claim, SupportingQuote};
pub use coherence::{DisagreementEdge, Relationship};
pub use fact::{normalize, ExtractionMethod, Fact, FactAction, FactTuple, TwoTierResult};
pub use ledger::{LedgerEntry, LedgerId, LedgerState, SemanticAnchor};
pub use memory::{Memory, MemoryId, ScoredMemory, Source, SseMode};
