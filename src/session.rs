//! Ties the Memory & Trust Engine, the Contradiction Ledger, and the Gate
//! Protocol together for one conversational thread. Grounded on
//! `original_source/personal_agent/two_tier_facts.py`'s
//! `TwoTierFactSystem.extract_facts` call site (one turn: extract, then
//! reconcile against prior state) and subcog's session-orchestration
//! constructor pattern of threading one loaded config through every
//! collaborator rather than re-reading it per call.

use crate::config::CrtConfig;
use crate::contradiction::{self, Candidate, Detector, Label};
use crate::embedding::{cosine_similarity, Embedder};
use crate::extraction::open_tuples::TwoTierExtractor;
use crate::gate::{GateMetrics, GateOutcome, GateProtocol};
use crate::ledger::ContradictionLedger;
use crate::llm::FactTupleProvider;
use crate::models::{LedgerEntry, Memory, MemoryId, ScoredMemory, SemanticAnchor, Source, TwoTierResult};
use crate::storage::{GlobalStore, ProfileMultiStore};
use crate::trust::TrustEvolver;
use crate::{Error, Result};
use std::collections::HashMap;
use std::collections::HashSet;

/// What kind of turn this was, attached to the response so a caller can
/// render belief and uncertainty differently without inspecting the gate
/// metrics itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// All gates passed; the turn may speak from belief.
    Belief,
    /// At least one gate failed; the turn admits uncertainty.
    Uncertainty,
}

/// One processed turn's input.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// The raw utterance text.
    pub text: String,
    /// Whether the user explicitly flagged this utterance as important
    /// (doubles the reinforcement delta for any memory it touches).
    pub user_marked_important: bool,
}

impl QueryRequest {
    /// Builds a request from plain text, with no importance flag.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_marked_important: false,
        }
    }
}

/// Everything computed for one turn.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    /// Belief or uncertainty.
    pub response_type: ResponseType,
    /// The computed alignment/confidence metrics.
    pub metrics: GateMetrics,
    /// A clarification question, present only for `Uncertainty` turns
    /// when the ledger's goal queue had one to offer.
    pub clarification_question: Option<String>,
    /// Reason the gate failed, present only for `Uncertainty` turns.
    pub uncertainty_reason: Option<String>,
    /// Retrieved candidates (real memories plus synthetic profile facts)
    /// that informed this turn's gate evaluation.
    pub retrieved: Vec<ScoredMemory>,
    /// The two-tier extraction result for this utterance.
    pub extraction: TwoTierResult,
    /// Ledger entries newly recorded (or re-idempotently matched) this
    /// turn.
    pub ledger_entries: Vec<LedgerEntry>,
    /// Set when the embedding capability was unavailable this turn;
    /// retrieval degraded to an empty candidate set rather than erroring.
    pub embedding_unavailable: bool,
    /// The resolved slot value for a `Belief` turn that queried a hard
    /// slot (spec.md §6's Query interface `answer` field), e.g. `"amazon"`
    /// for "Where do I work?" once the employer contradiction resolves to
    /// that value. `None` when the turn didn't target a recognized slot,
    /// or for any `Uncertainty` turn — this is slot-value lookup over
    /// already-extracted/resolved facts, never generated text.
    pub answer: Option<String>,
}

/// Keyword groups used to guess which hard slot an interrogative
/// utterance is asking about, so the gate can check that slot's
/// unresolved-contradiction count rather than refusing to gate at all.
/// Not itself an extraction mechanism — [`crate::extraction`] never
/// guesses, it only matches; this exists solely to pick a gate target.
const SLOT_QUERY_KEYWORDS: &[(&str, &[&str])] = &[
    ("name", &["name"]),
    ("employer", &["work", "employer", "company", "job"]),
    ("title", &["title", "role"]),
    ("occupation", &["occupation", "profession"]),
    ("location", &["live", "location", "where", "based"]),
    ("medical_diagnosis", &["diagnosis", "diagnosed"]),
    ("account_status", &["account"]),
    ("legal_status", &["legal"]),
    ("relationship_status", &["married", "relationship", "single"]),
    ("undergrad_school", &["undergrad"]),
    ("masters_school", &["master"]),
    ("school", &["school", "college", "university"]),
    ("graduation_year", &["graduate", "graduation"]),
    ("age", &["age", "old"]),
    ("programming_years", &["programming"]),
    ("first_language", &["language"]),
];

/// Guesses the hard slot an interrogative utterance is asking about, by
/// keyword overlap against [`SLOT_QUERY_KEYWORDS`]. Returns `None` if no
/// slot's keywords appear.
#[must_use]
fn infer_queried_slot(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    SLOT_QUERY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(slot, _)| *slot)
}

/// Builds the synthetic memory text used for both profile-fact promotion
/// and slot-conflict ledger entries, so the two stay content-addressable
/// against each other.
fn slot_memory_text(slot: &str, value: &str) -> String {
    format!("{slot}: {value}")
}

/// Resolves `slot`'s current value among this turn's retrieved candidates:
/// the highest-scoring retrieved memory carrying `context["slot"] == slot`
/// (always a synthetic profile candidate — see
/// [`Session::synthetic_profile_candidates`] — since that's the only path
/// that tags a candidate with its slot), reporting its normalized value.
/// `retrieved` is already sorted by descending score, so the first match
/// wins. Returns `None` if no retrieved candidate answers `slot`.
fn resolve_slot_answer(slot: &str, retrieved: &[ScoredMemory]) -> Option<String> {
    retrieved
        .iter()
        .find(|scored| scored.memory.context.get("slot").map(String::as_str) == Some(slot))
        .and_then(|scored| scored.memory.context.get("value").cloned())
}

/// One conversational thread's live state: the Memory & Trust Engine, the
/// Contradiction Ledger, the global profile-fact store, and the
/// capabilities (embedder, optional Tier B provider) injected at
/// construction.
pub struct Session {
    thread_id: String,
    config: CrtConfig,
    memory: Box<dyn crate::memory::MemoryStore>,
    ledger: ContradictionLedger,
    profile: ProfileMultiStore,
    global: Option<GlobalStore>,
    embedder: Box<dyn Embedder>,
    extractor: TwoTierExtractor<Box<dyn FactTupleProvider>>,
    detector: Detector,
    trust: TrustEvolver,
    gate: GateProtocol,
    asked_this_session: HashSet<String>,
}

impl Session {
    /// Assembles a session from already-constructed collaborators. Most
    /// callers should prefer a higher-level constructor in the `crt`
    /// binary that wires up concrete SQLite stores and a real embedder;
    /// this one is the seam tests and alternative front-ends use
    /// directly.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        thread_id: impl Into<String>,
        config: CrtConfig,
        memory: Box<dyn crate::memory::MemoryStore>,
        ledger: ContradictionLedger,
        profile: ProfileMultiStore,
        global: Option<GlobalStore>,
        embedder: Box<dyn Embedder>,
        extractor: TwoTierExtractor<Box<dyn FactTupleProvider>>,
        detector: Detector,
    ) -> Self {
        let trust = TrustEvolver::new(config.trust.clone());
        let gate = GateProtocol::new(config.gate.clone());
        Self {
            thread_id: thread_id.into(),
            config,
            memory,
            ledger,
            profile,
            global,
            embedder,
            extractor,
            detector,
            trust,
            gate,
            asked_this_session: HashSet::new(),
        }
    }

    /// The thread this session represents.
    #[must_use]
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Processes one turn: extracts facts, retrieves relevant memories
    /// (real and synthetic profile facts), detects contradictions,
    /// persists the utterance and any newly-learned profile facts,
    /// evolves trust on touched memories, and evaluates the gate
    /// protocol.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails after exhausting its
    /// retry budget.
    pub fn respond(&mut self, request: &QueryRequest) -> Result<QueryResponse> {
        let span = tracing::debug_span!("session_respond", thread_id = %self.thread_id);
        let _guard = span.enter();

        let utterance_id = uuid::Uuid::new_v4().to_string();
        let extraction = self.extractor.extract(&request.text, &utterance_id);
        let interrogative = contradiction::is_interrogative(&request.text);

        let (utterance_embedding, embedding_unavailable) = match self.embedder.embed(&request.text) {
            Ok(embedding) => (embedding, false),
            Err(err) => {
                tracing::warn!(error = %err, "embedding capability unavailable, retrieval degraded");
                (Vec::new(), true)
            }
        };

        let retrieved = if embedding_unavailable {
            Vec::new()
        } else {
            self.retrieve_candidates(&utterance_embedding)?
        };

        let mut ledger_entries = Vec::new();
        if !interrogative && !embedding_unavailable {
            ledger_entries.extend(self.reconcile_slot_conflicts(&extraction, &request.text)?);
            ledger_entries.extend(self.reconcile_semantic_contradictions(
                &utterance_id,
                &request.text,
                &utterance_embedding,
                &retrieved,
            )?);
        }

        if !embedding_unavailable {
            self.persist_utterance(&request.text, &utterance_embedding, request.user_marked_important)?;
            self.evolve_touched_trust(&utterance_embedding, &retrieved, &ledger_entries)?;
        }

        let slot: Option<String> = if !extraction.hard_facts.is_empty() {
            extraction.hard_facts.keys().next().cloned()
        } else if interrogative {
            infer_queried_slot(&request.text).map(str::to_string)
        } else {
            None
        };
        let unresolved = slot.as_deref().map_or(Ok(0), |s| self.ledger.unresolved_count_for_slot(s))?;

        let outcome = self.gate.evaluate(
            &utterance_embedding,
            &retrieved,
            unresolved,
            &self.ledger,
            &self.asked_this_session,
        )?;

        if let Some(global) = &self.global {
            global.touch_thread(&self.thread_id)?;
        }

        if !ledger_entries.is_empty() {
            tracing::info!(count = ledger_entries.len(), "recorded contradiction ledger entries");
        }
        match &outcome {
            GateOutcome::Belief(metrics) => {
                tracing::debug!(confidence = metrics.confidence, "turn resolved to belief");
            }
            GateOutcome::Uncertainty { reason, .. } => {
                tracing::debug!(reason = %reason, "turn resolved to uncertainty");
            }
        }

        Ok(Self::response_from_outcome(
            outcome,
            slot.as_deref(),
            retrieved,
            extraction,
            ledger_entries,
            embedding_unavailable,
        ))
    }

    fn response_from_outcome(
        outcome: GateOutcome,
        slot: Option<&str>,
        retrieved: Vec<ScoredMemory>,
        extraction: TwoTierResult,
        ledger_entries: Vec<LedgerEntry>,
        embedding_unavailable: bool,
    ) -> QueryResponse {
        match outcome {
            GateOutcome::Belief(metrics) => {
                let answer = slot.and_then(|s| resolve_slot_answer(s, &retrieved));
                QueryResponse {
                    response_type: ResponseType::Belief,
                    metrics,
                    clarification_question: None,
                    uncertainty_reason: None,
                    retrieved,
                    extraction,
                    ledger_entries,
                    embedding_unavailable,
                    answer,
                }
            }
            GateOutcome::Uncertainty {
                metrics,
                reason,
                clarification_question,
            } => QueryResponse {
                response_type: ResponseType::Uncertainty,
                metrics,
                clarification_question,
                uncertainty_reason: Some(reason),
                retrieved,
                extraction,
                ledger_entries,
                embedding_unavailable,
                answer: None,
            },
        }
    }

    fn retrieve_candidates(&self, utterance_embedding: &[f32]) -> Result<Vec<ScoredMemory>> {
        let retrieval = &self.config.retrieval;
        let mut candidates = self.memory.retrieve(
            utterance_embedding,
            retrieval.theta_retrieve,
            retrieval.top_k,
            retrieval.recency_half_life_secs,
        )?;
        candidates.extend(self.synthetic_profile_candidates(utterance_embedding)?);
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(retrieval.top_k);
        Ok(candidates)
    }

    /// Reconstructs every active `profile_multi` fact as a synthetic,
    /// non-persisted [`ScoredMemory`] so global profile facts participate
    /// in retrieval and gating alongside ordinary thread memories,
    /// without ever being written back as a `memories` row (spec.md
    /// §4.2).
    fn synthetic_profile_candidates(&self, utterance_embedding: &[f32]) -> Result<Vec<ScoredMemory>> {
        let retrieval = &self.config.retrieval;
        let now = crate::current_timestamp();
        let mut candidates = Vec::new();
        for fact in self.profile.list_active()? {
            let text = slot_memory_text(&fact.slot, &fact.value);
            let Ok(embedding) = self.embedder.embed(&text) else {
                continue;
            };
            let similarity = cosine_similarity(utterance_embedding, &embedding);
            if similarity < retrieval.theta_retrieve {
                continue;
            }
            let mut context = HashMap::new();
            context.insert("slot".to_string(), fact.slot.clone());
            context.insert("value".to_string(), fact.normalized.clone());
            context.insert("synthetic_profile_fact".to_string(), "true".to_string());
            let mut memory = Memory::new(text, Source::System, embedding, fact.confidence, context, false);
            memory.trust = crate::storage::PROFILE_MEMORY_TRUST;
            memory.timestamp_last_seen = fact.ts;
            let boost = crate::memory::recency_boost(fact.ts, now, retrieval.recency_half_life_secs);
            let score_value = crate::memory::score(similarity, memory.trust, boost);
            candidates.push(ScoredMemory {
                memory,
                similarity,
                score: score_value,
            });
        }
        Ok(candidates)
    }

    /// Path (a) of contradiction detection: a newly asserted hard-slot
    /// value that differs from the active `profile_multi` value for the
    /// same slot. The losing row is left active until the entry resolves
    /// (spec.md §4.6's "transient conflict window"), so a concurrent
    /// query correctly sees an unresolved contradiction rather than
    /// silently picking the newer value.
    fn reconcile_slot_conflicts(
        &self,
        extraction: &TwoTierResult,
        _utterance_text: &str,
    ) -> Result<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        let active = self.profile.list_active()?;
        for fact in extraction.hard_facts.values() {
            let existing = active
                .iter()
                .find(|p| p.slot == fact.slot && p.normalized != fact.normalized);
            if let Some(existing) = existing {
                let old_text = slot_memory_text(&existing.slot, &existing.value);
                let new_text = slot_memory_text(&fact.slot, &fact.value);
                let drift = 1.0 - crate::sse::claims::string_similarity(&existing.value, &fact.value);
                let question = format!(
                    "You previously said your {} is {}, but just said {}. Which is current?",
                    fact.slot, existing.value, fact.value
                );
                let entry = self.ledger.record_candidate(
                    &MemoryId::content_address(&old_text, Source::System),
                    &MemoryId::content_address(&new_text, Source::User),
                    Some(fact.slot.as_str()),
                    drift,
                    Some(question.clone()),
                    Some(SemanticAnchor {
                        contradiction_type: "slot_conflict".to_string(),
                        clarification_prompt: question,
                    }),
                )?;
                entries.push(entry);
            }
            self.profile.upsert(fact, &self.thread_id)?;
        }
        Ok(entries)
    }

    /// Path (b): general semantic contradictions between the new
    /// utterance and previously retrieved real memories, via the shared
    /// [`Detector`]. Synthetic profile candidates are excluded — a
    /// conflicting profile fact is already caught, with better
    /// diagnostics, by [`Session::reconcile_slot_conflicts`].
    fn reconcile_semantic_contradictions(
        &self,
        utterance_id: &str,
        utterance_text: &str,
        utterance_embedding: &[f32],
        retrieved: &[ScoredMemory],
    ) -> Result<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        let mut candidates: Vec<Candidate<'_>> = vec![Candidate {
            id: utterance_id,
            text: utterance_text,
            embedding: utterance_embedding,
        }];
        for scored in retrieved {
            if scored.memory.context.contains_key("synthetic_profile_fact") {
                continue;
            }
            candidates.push(Candidate {
                id: scored.memory.id.as_str(),
                text: &scored.memory.text,
                embedding: &scored.memory.embedding,
            });
        }

        for pair in self.detector.detect(&candidates) {
            if pair.label != Label::Contradiction {
                continue;
            }
            let Some(other) = retrieved.iter().find(|scored| {
                scored.memory.id.as_str() == pair.id_a.as_str()
                    || scored.memory.id.as_str() == pair.id_b.as_str()
            }) else {
                continue;
            };
            let new_id = MemoryId::content_address(utterance_text, Source::User);
            let drift = 1.0 - crate::sse::claims::string_similarity(&other.memory.text, utterance_text);
            let entry = self.ledger.record_candidate(
                &other.memory.id,
                &new_id,
                None,
                drift,
                None,
                Some(SemanticAnchor {
                    contradiction_type: "semantic_opposition".to_string(),
                    clarification_prompt: String::new(),
                }),
            )?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn persist_utterance(&self, text: &str, embedding: &[f32], user_marked_important: bool) -> Result<()> {
        let mut context = HashMap::new();
        context.insert("thread_id".to_string(), self.thread_id.clone());
        let memory = Memory::new(
            text,
            Source::User,
            embedding.to_vec(),
            0.8,
            context,
            user_marked_important,
        );
        self.memory.store(&memory)
    }

    /// Applies the three trust-evolution bands of spec.md §4.3 to every
    /// non-synthetic retrieved memory: an alignment score α (signed
    /// cosine similarity between the utterance and the memory) above
    /// `theta_align` reinforces, below `-theta_contra` contradicts, and
    /// anything in between is left untouched. A memory this turn's
    /// reconciliation flagged as contradicted in the ledger is always
    /// contradicted regardless of α. Each touched memory is first decayed
    /// if stale, so the decay rule actually fires on its next touch
    /// rather than only in its own unit tests.
    fn evolve_touched_trust(&self, utterance_embedding: &[f32], retrieved: &[ScoredMemory], ledger_entries: &[LedgerEntry]) -> Result<()> {
        let contradicted: HashSet<&str> = ledger_entries
            .iter()
            .flat_map(|entry| [entry.old_memory_id.as_str(), entry.new_memory_id.as_str()])
            .collect();
        let now = crate::current_timestamp();
        for scored in retrieved {
            if scored.memory.context.contains_key("synthetic_profile_fact") {
                continue;
            }
            let mut memory = scored.memory.clone();
            self.trust.decay_if_stale(&mut memory, now);

            let alpha = cosine_similarity(utterance_embedding, &memory.embedding);
            if contradicted.contains(memory.id.as_str()) || alpha < -self.config.trust.theta_contra {
                self.trust.contradict(&mut memory);
            } else if alpha > self.config.trust.theta_align {
                self.trust.reinforce(&mut memory);
            }
            self.memory.touch(&memory)?;
        }
        Ok(())
    }

    /// Returns the next clarification question the ledger's goal queue
    /// would offer, without evaluating a full turn. Does not mark
    /// anything asked.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger query fails.
    pub fn ledger_next(&self) -> Result<Option<LedgerEntry>> {
        self.ledger.next(&self.asked_this_session)
    }

    /// Marks a ledger entry `Asked` and records it so
    /// [`Session::ledger_next`]/the gate protocol won't offer it again
    /// this session.
    ///
    /// # Errors
    ///
    /// Returns `Error::LedgerInvariant` if the entry isn't `Open`.
    pub fn ledger_mark_asked(&mut self, id: &crate::models::LedgerId) -> Result<LedgerEntry> {
        let entry = self.ledger.mark_asked(id)?;
        self.asked_this_session.insert(id.as_str().to_string());
        Ok(entry)
    }

    /// Resolves a ledger entry with the given winning value, deactivating
    /// the losing `profile_multi` row for the entry's slot (if any) so
    /// the transient conflict window closes.
    ///
    /// # Errors
    ///
    /// Returns `Error::LedgerInvariant` if the entry is already terminal,
    /// or `Error::InvalidInput` if it doesn't exist.
    pub fn ledger_resolve(
        &mut self,
        id: &crate::models::LedgerId,
        winning_value: Option<String>,
    ) -> Result<LedgerEntry> {
        let entry = self.ledger.get(id)?.ok_or_else(|| {
            Error::InvalidInput(format!("no ledger entry with id {id}"))
        })?;
        if let Some(slot) = &entry.slot {
            if let Some(winner) = &winning_value {
                let winner_normalized = crate::models::normalize(winner);
                for fact in self.profile.list_active()? {
                    if fact.slot == *slot && fact.normalized != winner_normalized {
                        self.profile.deactivate(&fact.slot, &fact.normalized)?;
                    }
                }
            }
        }
        self.ledger.resolve(id, winning_value)
    }

    /// Dismisses a ledger entry without a trust-affecting outcome.
    ///
    /// # Errors
    ///
    /// Returns `Error::LedgerInvariant` if the entry is already terminal.
    pub fn ledger_dismiss(&mut self, id: &crate::models::LedgerId) -> Result<LedgerEntry> {
        self.ledger.dismiss(id)
    }

    /// Clears this session's in-memory record of what's been asked,
    /// without touching persisted state. A fresh process would start
    /// with the same empty set; this exists so a long-lived session can
    /// be reset without restarting.
    pub fn reset(&mut self) {
        self.asked_this_session.clear();
    }
}
