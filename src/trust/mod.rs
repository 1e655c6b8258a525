//! Trust evolution: the three update rules of spec.md §4.3, applied
//! directly to an owned `Memory`. Pure functions over config plus a
//! memory reference — no storage access, no I/O.

use crate::config::TrustConfig;
use crate::models::{Memory, Source};

/// Applies trust evolution rules. Stateless aside from the injected
/// [`TrustConfig`], loaded once per `Session` and threaded through, as
/// subcog threads its own config through constructors rather than
/// re-reading it per call.
#[derive(Debug, Clone)]
pub struct TrustEvolver {
    config: TrustConfig,
}

impl TrustEvolver {
    /// Creates an evolver from a loaded config.
    #[must_use]
    pub fn new(config: TrustConfig) -> Self {
        Self { config }
    }

    /// Reinforces `memory`: saturating increase toward 1.0, doubled when
    /// the memory was marked important at capture time. Bumps
    /// `reinforcement_count` and `timestamp_last_seen`.
    pub fn reinforce(&self, memory: &mut Memory) {
        let delta = if memory.user_marked_important {
            self.config.delta_reinforce * 2.0
        } else {
            self.config.delta_reinforce
        };
        memory.trust = saturating_increase(memory.trust, delta);
        memory.reinforcement_count = memory.reinforcement_count.saturating_add(1);
        memory.timestamp_last_seen = crate::current_timestamp();
    }

    /// Penalizes `memory` for having been contradicted: saturating
    /// decrease toward 0.0, floored for `Source::System` memories at
    /// `config.system_trust_floor`. Bumps `timestamp_last_seen`.
    pub fn contradict(&self, memory: &mut Memory) {
        let floor = if memory.source == Source::System {
            self.config.system_trust_floor
        } else {
            0.0
        };
        let decreased = saturating_decrease(memory.trust, self.config.delta_contradict);
        memory.trust = decreased.max(floor);
        memory.timestamp_last_seen = crate::current_timestamp();
    }

    /// Applies multiplicative decay if `memory` has gone stale (untouched
    /// for at least `config.decay_window_secs`), floored the same way as
    /// [`TrustEvolver::contradict`]. Does not update `timestamp_last_seen`
    /// — decay reflects the absence of a touch, not a touch itself.
    pub fn decay_if_stale(&self, memory: &mut Memory, now: u64) {
        let age = now.saturating_sub(memory.timestamp_last_seen);
        if age < self.config.decay_window_secs {
            return;
        }
        let floor = if memory.source == Source::System {
            self.config.system_trust_floor
        } else {
            0.0
        };
        memory.trust = (memory.trust * self.config.decay_epsilon).max(floor);
    }
}

/// Saturating increase toward 1.0: `trust + delta * (1 - trust)`, so
/// repeated reinforcement approaches but never reaches the ceiling.
fn saturating_increase(trust: f64, delta: f64) -> f64 {
    (trust + delta * (1.0 - trust)).clamp(0.0, 1.0)
}

/// Saturating decrease toward 0.0: `trust - delta * trust`, so repeated
/// contradiction approaches but never reaches zero on its own.
fn saturating_decrease(trust: f64, delta: f64) -> f64 {
    (trust - delta * trust).clamp(0.0, 1.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn evolver() -> TrustEvolver {
        TrustEvolver::new(TrustConfig::default())
    }

    fn memory(source: Source) -> Memory {
        Memory::new("test", source, vec![1.0], 0.8, HashMap::new(), false)
    }

    #[test]
    fn test_reinforce_increases_trust_and_count() {
        let evolver = evolver();
        let mut m = memory(Source::User);
        let before = m.trust;
        evolver.reinforce(&mut m);
        assert!(m.trust > before);
        assert_eq!(m.reinforcement_count, 1);
    }

    #[test]
    fn test_reinforce_doubled_when_marked_important() {
        let evolver = evolver();
        let mut plain = memory(Source::User);
        let mut important = memory(Source::User);
        important.user_marked_important = true;
        evolver.reinforce(&mut plain);
        evolver.reinforce(&mut important);
        assert!(important.trust > plain.trust);
    }

    #[test]
    fn test_trust_never_exceeds_one() {
        let evolver = evolver();
        let mut m = memory(Source::User);
        for _ in 0..10_000 {
            evolver.reinforce(&mut m);
        }
        assert!(m.trust <= 1.0);
    }

    #[test]
    fn test_contradict_decreases_trust() {
        let evolver = evolver();
        let mut m = memory(Source::User);
        let before = m.trust;
        evolver.contradict(&mut m);
        assert!(m.trust < before);
    }

    #[test]
    fn test_contradict_respects_system_floor() {
        let evolver = evolver();
        let mut m = memory(Source::System);
        for _ in 0..10_000 {
            evolver.contradict(&mut m);
        }
        assert!(m.trust >= evolver.config.system_trust_floor - 1e-9);
    }

    #[test]
    fn test_contradict_non_system_can_approach_zero() {
        let evolver = evolver();
        let mut m = memory(Source::User);
        for _ in 0..10_000 {
            evolver.contradict(&mut m);
        }
        assert!(m.trust < 0.01);
    }

    #[test]
    fn test_decay_applies_only_when_stale() {
        let evolver = evolver();
        let mut fresh = memory(Source::User);
        fresh.timestamp_last_seen = crate::current_timestamp();
        let before = fresh.trust;
        evolver.decay_if_stale(&mut fresh, crate::current_timestamp());
        assert!((fresh.trust - before).abs() < 1e-9);

        let mut stale = memory(Source::User);
        stale.timestamp_last_seen = 0;
        evolver.decay_if_stale(&mut stale, 1_000_000_000);
        assert!(stale.trust < before);
    }
}
