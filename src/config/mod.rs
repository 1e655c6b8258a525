//! Configuration: thresholds, deltas, intervals, and feature toggles,
//! loaded from TOML with `${VAR}`-style environment overrides.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Trust-evolver tuning: reinforcement/contradiction deltas, decay, and
/// the per-source floor (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Reinforcement delta applied on agreement (doubled when the memory
    /// is `user_marked_important`).
    pub delta_reinforce: f64,
    /// Contradiction penalty applied on disagreement.
    pub delta_contradict: f64,
    /// Multiplicative decay factor applied per stale-touch window.
    pub decay_epsilon: f64,
    /// Decay window, in seconds, after which a stale memory is decayed
    /// once more on next touch.
    pub decay_window_secs: u64,
    /// Trust floor that `Source::System` memories never decay below.
    pub system_trust_floor: f64,
    /// Minimum alignment score α for the reinforcement band (`α >
    /// theta_align`).
    pub theta_align: f64,
    /// Alignment score magnitude for the contradiction band (`α <
    /// -theta_contra`).
    pub theta_contra: f64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            delta_reinforce: 0.05,
            delta_contradict: 0.15,
            decay_epsilon: 0.98,
            decay_window_secs: 86_400,
            system_trust_floor: 0.5,
            theta_align: 0.3,
            theta_contra: 0.3,
        }
    }
}

/// Retrieval tuning: the similarity cutoff and ranking shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Minimum cosine similarity for a memory to be a retrieval candidate.
    pub theta_retrieve: f64,
    /// Maximum memories returned by one retrieval call.
    pub top_k: usize,
    /// Recency-boost half-life, in seconds, applied on top of trust when
    /// scoring (`score = similarity * trust * (1 + recency_boost)`).
    pub recency_half_life_secs: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            theta_retrieve: 0.3,
            top_k: 8,
            recency_half_life_secs: 604_800.0,
        }
    }
}

/// Two-tier extraction tuning (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Minimum confidence for a Tier B open tuple to survive.
    pub open_tuple_confidence_threshold: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            open_tuple_confidence_threshold: 0.6,
        }
    }
}

/// Contradiction detector tuning (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContradictionConfig {
    /// Cosine pre-filter threshold below which a pair is never sent to NLI.
    pub cosine_prefilter_theta: f64,
}

impl Default for ContradictionConfig {
    fn default() -> Self {
        Self {
            cosine_prefilter_theta: 0.2,
        }
    }
}

/// Gate protocol thresholds (spec.md §4.7). `intent_alignment` is
/// computed and reported alongside the gates but is not itself gated —
/// the three checked gates are `memory_alignment`, `confidence`, and
/// zero unresolved hard contradictions for the queried slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum `memory_alignment` (`theta_align`) to pass the memory gate.
    pub theta_align: f64,
    /// Minimum `confidence` (`theta_min`) to pass the confidence gate.
    pub theta_min: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            theta_align: 0.30,
            theta_min: 0.25,
        }
    }
}

/// SSE chunking/claim tuning (spec.md §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SseConfig {
    /// Maximum characters per chunk.
    pub max_chunk_chars: usize,
    /// Overlap, in characters, between consecutive chunks.
    pub chunk_overlap_chars: usize,
    /// Cosine-similarity floor for claim dedup.
    pub dedup_cosine_theta: f64,
    /// Text-similarity floor for claim dedup (normalized Levenshtein ratio).
    pub dedup_text_similarity_theta: f64,
    /// Minimum string similarity for an LLM-proposed quote to be accepted.
    pub llm_quote_similarity_theta: f64,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 800,
            chunk_overlap_chars: 200,
            dedup_cosine_theta: 0.99,
            dedup_text_similarity_theta: 0.8,
            llm_quote_similarity_theta: 0.90,
        }
    }
}

/// Continuous background loop intervals (spec.md §4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopsConfig {
    /// Whether the reflection loop runs at all.
    pub reflection_enabled: bool,
    /// Reflection loop interval, in seconds.
    pub reflection_interval_secs: u64,
    /// Whether the personality loop runs at all.
    pub personality_enabled: bool,
    /// Personality loop interval, in seconds.
    pub personality_interval_secs: u64,
    /// Number of recent messages per thread considered by each loop pass.
    pub message_window: usize,
}

impl Default for LoopsConfig {
    fn default() -> Self {
        Self {
            reflection_enabled: true,
            reflection_interval_secs: 900,
            personality_enabled: true,
            personality_interval_secs: 1200,
            message_window: 20,
        }
    }
}

/// Storage write-retry schedule (spec.md §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    pub database_path: String,
    /// Initial retry backoff, in milliseconds.
    pub retry_initial_backoff_ms: u64,
    /// Backoff multiplier applied on each retry.
    pub retry_backoff_factor: f64,
    /// Backoff cap, in milliseconds.
    pub retry_backoff_cap_ms: u64,
    /// Maximum number of attempts before surfacing `StorageBusy`.
    pub retry_max_attempts: u32,
    /// SQLite busy-timeout, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "crt.sqlite3".to_string(),
            retry_initial_backoff_ms: 100,
            retry_backoff_factor: 2.0,
            retry_backoff_cap_ms: 2_000,
            retry_max_attempts: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Top-level configuration for a `crt-core` session, loaded once at
/// startup and threaded through constructors for the process lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrtConfig {
    /// Trust evolution tuning.
    pub trust: TrustConfig,
    /// Retrieval tuning.
    pub retrieval: RetrievalConfig,
    /// Extraction tuning.
    pub extraction: ExtractionConfig,
    /// Contradiction detector tuning.
    pub contradiction: ContradictionConfig,
    /// Gate protocol tuning.
    pub gate: GateConfig,
    /// SSE tuning.
    pub sse: SseConfig,
    /// Continuous loop tuning.
    pub loops: LoopsConfig,
    /// Storage tuning.
    pub storage: StorageConfig,
}

impl CrtConfig {
    /// Loads configuration from a TOML file, expanding `${VAR}`-style
    /// environment references in string values first.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigInvalid` if the file cannot be read or does
    /// not parse as valid TOML for this shape.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigInvalid(format!(
                "failed to read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses configuration from a TOML string, after env-var expansion.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigInvalid` if the string does not parse.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let expanded = expand_env_vars(raw);
        toml::from_str(&expanded)
            .map_err(|e| Error::ConfigInvalid(format!("failed to parse config: {e}")))
    }

    /// Validates cross-field invariants not expressible via `serde`
    /// defaults alone.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigInvalid` if any threshold is out of `[0, 1]`
    /// or any interval/backoff value is zero.
    pub fn validate(&self) -> Result<()> {
        let unit_fields: &[(&str, f64)] = &[
            ("trust.delta_reinforce", self.trust.delta_reinforce),
            ("trust.delta_contradict", self.trust.delta_contradict),
            ("trust.decay_epsilon", self.trust.decay_epsilon),
            ("trust.system_trust_floor", self.trust.system_trust_floor),
            ("retrieval.theta_retrieve", self.retrieval.theta_retrieve),
            (
                "extraction.open_tuple_confidence_threshold",
                self.extraction.open_tuple_confidence_threshold,
            ),
            (
                "contradiction.cosine_prefilter_theta",
                self.contradiction.cosine_prefilter_theta,
            ),
            ("gate.theta_align", self.gate.theta_align),
            ("gate.theta_min", self.gate.theta_min),
            ("sse.dedup_cosine_theta", self.sse.dedup_cosine_theta),
            (
                "sse.dedup_text_similarity_theta",
                self.sse.dedup_text_similarity_theta,
            ),
            (
                "sse.llm_quote_similarity_theta",
                self.sse.llm_quote_similarity_theta,
            ),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(value) {
                return Err(Error::ConfigInvalid(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if self.storage.retry_max_attempts == 0 {
            return Err(Error::ConfigInvalid(
                "storage.retry_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.sse.max_chunk_chars == 0 {
            return Err(Error::ConfigInvalid(
                "sse.max_chunk_chars must be positive".to_string(),
            ));
        }
        if self.sse.chunk_overlap_chars >= self.sse.max_chunk_chars {
            return Err(Error::ConfigInvalid(
                "sse.chunk_overlap_chars must be smaller than max_chunk_chars".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expands `${VAR}` references in `raw` against the process environment,
/// leaving unset variables as empty strings. Grounded on subcog's
/// `expand_env_vars` helper.
fn expand_env_vars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '$' && raw.as_bytes().get(i + 1) == Some(&b'{') {
            if let Some(end) = raw[i + 2..].find('}') {
                let var_name = &raw[i + 2..i + 2 + end];
                out.push_str(&std::env::var(var_name).unwrap_or_default());
                for _ in 0..=end + 1 {
                    chars.next();
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = CrtConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut config = CrtConfig::default();
        config.gate.theta_min = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_env_vars_substitutes_set_variable() {
        // Relies on PATH being set in any sane test environment, to avoid
        // mutating process-global env state (`set_var` is unsafe and this
        // crate forbids unsafe code even in tests).
        let path = std::env::var("PATH").unwrap_or_default();
        let out = expand_env_vars("path = \"${PATH}/db.sqlite3\"");
        assert_eq!(out, format!("path = \"{path}/db.sqlite3\""));
    }

    #[test]
    fn test_expand_env_vars_unset_becomes_empty() {
        let out = expand_env_vars("${CRT_TEST_DEFINITELY_UNSET_VAR_XYZ}value");
        assert_eq!(out, "value");
    }

    #[test]
    fn test_from_toml_str_round_trips_defaults() {
        let config = CrtConfig::default();
        let serialized = toml::to_string(&config).expect("serialize default config");
        let parsed = CrtConfig::from_toml_str(&serialized).expect("parse serialized config");
        assert_eq!(parsed.storage.database_path, config.storage.database_path);
    }
}
