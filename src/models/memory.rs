//! Memory records: the primary entity of the Memory & Trust Engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable, content-addressed identifier for a [`Memory`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    /// Creates a memory ID from an arbitrary string (already-computed
    /// content hash, UUID, or otherwise).
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives a stable, content-addressed ID from the memory's text and
    /// source. Same `(text, source)` always yields the same ID, so storing
    /// the same belief twice updates the existing row rather than creating
    /// a duplicate.
    #[must_use]
    pub fn content_address(text: &str, source: Source) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(source.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(text.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Provenance of a memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Asserted directly by the user.
    User,
    /// Injected by the system (e.g. a profile fact promoted from config).
    System,
    /// Produced by a reflection/consolidation pass over prior turns.
    Reflection,
    /// Ingested from an external document (SSE-adjacent, not a belief).
    External,
}

impl Source {
    /// The initial trust assigned to a freshly stored memory of this
    /// source, per spec.md §3: user ≈ 0.7, reflection ≈ 0.5, system ≈ 0.9.
    #[must_use]
    pub const fn initial_trust(self) -> f64 {
        match self {
            Self::User => 0.7,
            Self::Reflection => 0.5,
            Self::System => 0.9,
            Self::External => 0.6,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
            Self::Reflection => "reflection",
            Self::External => "external",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            "reflection" => Ok(Self::Reflection),
            "external" => Ok(Self::External),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown memory source: {other}"
            ))),
        }
    }
}

/// Last-observed coherence status of a memory, as last set by SSE/gate
/// evaluation touching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SseMode {
    /// No unresolved contradiction touches this memory.
    #[default]
    Stable,
    /// Retrieval or gate evaluation flagged ambiguity but no hard conflict.
    Uncertain,
    /// This memory is one side of an open or asked contradiction.
    Contradicted,
}

/// A persisted belief record.
///
/// Invariants (spec.md §3): `trust` changes only via the trust evolver;
/// `id` and `embedding` are immutable once stored; records are never
/// deleted, only retired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Stable, content-addressed identifier.
    pub id: MemoryId,
    /// Canonical text of the belief.
    pub text: String,
    /// Where this belief came from.
    pub source: Source,
    /// Dense unit-norm embedding of `text`.
    pub embedding: Vec<f32>,
    /// Evolving trust score in `[0, 1]`.
    pub trust: f64,
    /// Extraction or speaker-declared confidence in `[0, 1]`.
    pub confidence_declared: f64,
    /// Creation timestamp (Unix epoch seconds).
    pub timestamp_created: u64,
    /// Last-touched timestamp (Unix epoch seconds); used for decay.
    pub timestamp_last_seen: u64,
    /// How many times this memory has been reinforced.
    pub reinforcement_count: u32,
    /// Opaque metadata (thread id, originating utterance id, ...).
    pub context: HashMap<String, String>,
    /// Last-observed coherence status.
    pub sse_mode: SseMode,
    /// `true` once retired. Retired memories are never returned by
    /// retrieval but are never physically removed.
    pub retired: bool,
    /// Whether the user explicitly flagged this as important at capture
    /// time (doubles the reinforcement delta, per the trust evolver).
    pub user_marked_important: bool,
}

impl Memory {
    /// Constructs a freshly captured memory, assigning its ID, initial
    /// trust (per [`Source::initial_trust`]), and both timestamps to now.
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        source: Source,
        embedding: Vec<f32>,
        confidence_declared: f64,
        context: HashMap<String, String>,
        user_marked_important: bool,
    ) -> Self {
        let text = text.into();
        let now = crate::current_timestamp();
        Self {
            id: MemoryId::content_address(&text, source),
            text,
            source,
            embedding,
            trust: source.initial_trust(),
            confidence_declared: confidence_declared.clamp(0.0, 1.0),
            timestamp_created: now,
            timestamp_last_seen: now,
            reinforcement_count: 0,
            context,
            sse_mode: SseMode::Stable,
            retired: false,
            user_marked_important,
        }
    }
}

/// A memory together with its retrieval similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    /// The memory itself.
    pub memory: Memory,
    /// Cosine similarity between the query embedding and `memory.embedding`.
    pub similarity: f64,
    /// Final ranking score: `similarity * f(trust)`.
    pub score: f64,
}
