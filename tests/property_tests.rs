//! Property coverage for the invariants named in `SPEC_FULL.md`'s
//! testable-properties section: trust stays bounded under arbitrarily
//! long reinforce/contradict sequences, content-addressed memory ids are
//! deterministic, and chunk offsets always round-trip against the source
//! document they were cut from.

use crt_core::config::TrustConfig;
use crt_core::models::{Memory, MemoryId, Source};
use crt_core::sse::chunk_text;
use crt_core::config::SseConfig;
use crt_core::trust::TrustEvolver;
use proptest::prelude::*;

fn arb_source() -> impl Strategy<Value = Source> {
    prop_oneof![
        Just(Source::User),
        Just(Source::System),
        Just(Source::Reflection),
        Just(Source::External),
    ]
}

proptest! {
    /// Repeated reinforcement or contradiction never pushes trust outside
    /// `[0, 1]`, regardless of how many updates are applied or in what
    /// order (spec.md §3's trust-bounds invariant).
    #[test]
    fn trust_stays_in_unit_interval(
        source in arb_source(),
        ops in prop::collection::vec(any::<bool>(), 0..200),
        important in any::<bool>(),
    ) {
        let evolver = TrustEvolver::new(TrustConfig::default());
        let mut memory = Memory::new("claim text", source, vec![0.1, 0.2], 0.5, Default::default(), important);
        for reinforce in ops {
            if reinforce {
                evolver.reinforce(&mut memory);
            } else {
                evolver.contradict(&mut memory);
            }
            prop_assert!(memory.trust >= 0.0 && memory.trust <= 1.0);
        }
    }

    /// `MemoryId::content_address` is a pure function of `(text, source)`:
    /// same inputs always yield the same id, and changing either input
    /// changes the id (barring hash collision).
    #[test]
    fn content_address_is_deterministic(text in "[a-zA-Z0-9 .,!?]{0,200}", source in arb_source()) {
        let a = MemoryId::content_address(&text, source);
        let b = MemoryId::content_address(&text, source);
        prop_assert_eq!(a, b);
    }

    /// A System-sourced memory's trust never decays or gets contradicted
    /// below its configured floor, no matter how many contradictions it
    /// absorbs.
    #[test]
    fn system_memories_never_cross_the_trust_floor(ops in 0..200usize) {
        let config = TrustConfig::default();
        let floor = config.system_trust_floor;
        let evolver = TrustEvolver::new(config);
        let mut memory = Memory::new("pinned fact", Source::System, vec![0.0], 1.0, Default::default(), false);
        for _ in 0..ops {
            evolver.contradict(&mut memory);
        }
        prop_assert!(memory.trust >= floor);
    }

    /// Every chunk's recorded offsets reconstruct exactly against the
    /// source document: `source[start_char..end_char] == chunk.text`,
    /// for arbitrary source text and chunk-size config.
    #[test]
    fn chunk_offsets_always_reconstruct_their_text(
        source in "[a-zA-Z0-9 .,!?\n]{0,500}",
        max_chars in 50usize..500,
        overlap in 0usize..40,
    ) {
        let config = SseConfig {
            max_chunk_chars: max_chars,
            chunk_overlap_chars: overlap.min(max_chars.saturating_sub(1).max(1)),
            ..SseConfig::default()
        };
        let chunks = chunk_text(&source, "doc", &config);
        for chunk in &chunks {
            prop_assert!(chunk.start_char <= chunk.end_char);
            prop_assert!(chunk.end_char <= source.len());
            prop_assert_eq!(&source[chunk.start_char..chunk.end_char], chunk.text.as_str());
        }
    }
}
