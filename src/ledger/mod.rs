//! The contradiction ledger (spec.md §4.6): an append-only record of
//! conflicting memory pairs with a strict `Open -> Asked -> {Resolved,
//! Dismissed}` lifecycle (Invariant VI) and a goal-queue `next()` that
//! hands the session the highest-drift open entry it hasn't already
//! asked about.
//!
//! Grounded on subcog's append-only lifecycle tables (`storage::sqlite`
//! row-mapping conventions); the state machine itself has no
//! `original_source/` counterpart (ledger semantics live in the
//! Python original's `belief_revision/` package, filtered out of the
//! provided pack) so it follows spec.md §4.6 directly.

use crate::config::StorageConfig;
use crate::models::{LedgerEntry, LedgerId, LedgerState, MemoryId, SemanticAnchor};
use crate::storage::retry_with_backoff;
use crate::{current_timestamp, Error, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Mutex;

/// SQLite-backed contradiction ledger.
pub struct ContradictionLedger {
    conn: Mutex<Connection>,
    config: StorageConfig,
}

impl ContradictionLedger {
    /// Opens (or creates) the database at `config.database_path` and runs
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationFailed` if the database cannot be opened.
    pub fn open(config: StorageConfig) -> Result<Self> {
        let conn = crate::storage::open_connection(&config.database_path, &config)?;
        crate::storage::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Opens an in-memory ledger, for tests.
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationFailed` if the connection cannot be set up.
    pub fn open_in_memory() -> Result<Self> {
        let config = StorageConfig::default();
        let conn = crate::storage::connection::open_in_memory(&config)?;
        crate::storage::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::OperationFailed {
            operation: "lock_connection".to_string(),
            cause: "connection mutex poisoned".to_string(),
        })
    }

    fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
        let ledger_id: String = row.get("ledger_id")?;
        let old_memory_id: String = row.get("old_memory_id")?;
        let new_memory_id: String = row.get("new_memory_id")?;
        let slot: Option<String> = row.get("slot")?;
        let drift: f64 = row.get("drift")?;
        let state: String = row.get("state")?;
        let suggested_question: Option<String> = row.get("suggested_question")?;
        let semantic_anchor_json: Option<String> = row.get("semantic_anchor")?;
        let timestamp_created: i64 = row.get("timestamp_created")?;
        let timestamp_asked: Option<i64> = row.get("timestamp_asked")?;
        let timestamp_resolved: Option<i64> = row.get("timestamp_resolved")?;
        let winning_value: Option<String> = row.get("winning_value")?;

        let state = LedgerState::from_str(&state).unwrap_or(LedgerState::Open);
        let semantic_anchor = semantic_anchor_json
            .and_then(|json| serde_json::from_str::<SemanticAnchor>(&json).ok());

        Ok(LedgerEntry {
            ledger_id: LedgerId::new(ledger_id),
            old_memory_id: MemoryId::new(old_memory_id),
            new_memory_id: MemoryId::new(new_memory_id),
            slot,
            drift,
            state,
            suggested_question,
            semantic_anchor,
            timestamp_created: timestamp_created.max(0) as u64,
            timestamp_asked: timestamp_asked.map(|ts| ts.max(0) as u64),
            timestamp_resolved: timestamp_resolved.map(|ts| ts.max(0) as u64),
            winning_value,
        })
    }

    /// Records a candidate contradiction, idempotent on
    /// [`LedgerEntry::canonical_key`]: a repeated call with the same
    /// `(old, new, slot, drift)` returns the existing entry rather than
    /// inserting a duplicate.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageBusy` if every retry attempt fails.
    #[allow(clippy::too_many_arguments)]
    pub fn record_candidate(
        &self,
        old_memory_id: &MemoryId,
        new_memory_id: &MemoryId,
        slot: Option<&str>,
        drift: f64,
        suggested_question: Option<String>,
        semantic_anchor: Option<SemanticAnchor>,
    ) -> Result<LedgerEntry> {
        let canonical_key = LedgerEntry::canonical_key(old_memory_id, new_memory_id, slot, drift);
        let conn = self.lock()?;

        if let Some(existing) = conn
            .query_row(
                "SELECT * FROM contradiction_ledger WHERE canonical_key = ?1",
                params![canonical_key],
                Self::row_to_entry,
            )
            .optional()
            .map_err(|e| Error::OperationFailed {
                operation: "lookup_canonical_ledger_entry".to_string(),
                cause: e.to_string(),
            })?
        {
            return Ok(existing);
        }

        let ledger_id = LedgerId::generate();
        let now = current_timestamp();
        let semantic_anchor_json = semantic_anchor
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::OperationFailed {
                operation: "serialize_semantic_anchor".to_string(),
                cause: e.to_string(),
            })?;

        retry_with_backoff("record_ledger_candidate", &self.config, || {
            conn.execute(
                "INSERT INTO contradiction_ledger (
                    ledger_id, old_memory_id, new_memory_id, slot, drift, state,
                    suggested_question, semantic_anchor, timestamp_created,
                    timestamp_asked, timestamp_resolved, winning_value, canonical_key
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, NULL, NULL, ?10)",
                params![
                    ledger_id.as_str(),
                    old_memory_id.as_str(),
                    new_memory_id.as_str(),
                    slot,
                    drift,
                    LedgerState::Open.to_string(),
                    suggested_question,
                    semantic_anchor_json,
                    now as i64,
                    canonical_key,
                ],
            )
        })?;

        Ok(LedgerEntry {
            ledger_id,
            old_memory_id: old_memory_id.clone(),
            new_memory_id: new_memory_id.clone(),
            slot: slot.map(str::to_string),
            drift,
            state: LedgerState::Open,
            suggested_question,
            semantic_anchor,
            timestamp_created: now,
            timestamp_asked: None,
            timestamp_resolved: None,
            winning_value: None,
        })
    }

    /// Fetches one entry by id.
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationFailed` if the query fails.
    pub fn get(&self, id: &LedgerId) -> Result<Option<LedgerEntry>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM contradiction_ledger WHERE ledger_id = ?1",
            params![id.as_str()],
            Self::row_to_entry,
        )
        .optional()
        .map_err(|e| Error::OperationFailed {
            operation: "get_ledger_entry".to_string(),
            cause: e.to_string(),
        })
    }

    /// Lists open entries, most recently created first.
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationFailed` if the query fails.
    pub fn list_open(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM contradiction_ledger WHERE state = 'open'
                 ORDER BY timestamp_created DESC LIMIT ?1",
            )
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_list_open".to_string(),
                cause: e.to_string(),
            })?;
        let rows = stmt
            .query_map(params![limit as i64], Self::row_to_entry)
            .map_err(|e| Error::OperationFailed {
                operation: "query_list_open".to_string(),
                cause: e.to_string(),
            })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| Error::OperationFailed {
                operation: "map_list_open_row".to_string(),
                cause: e.to_string(),
            })?);
        }
        Ok(entries)
    }

    /// Counts entries in `Open` or `Asked` state for `slot` — the
    /// "unresolved hard contradictions for this slot" the gate protocol
    /// checks before allowing a belief response (spec.md §4.7).
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationFailed` if the query fails.
    pub fn unresolved_count_for_slot(&self, slot: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM contradiction_ledger
                 WHERE slot = ?1 AND state IN ('open', 'asked')",
                params![slot],
                |row| row.get(0),
            )
            .map_err(|e| Error::OperationFailed {
                operation: "count_unresolved_for_slot".to_string(),
                cause: e.to_string(),
            })?;
        Ok(count.max(0) as usize)
    }

    /// Returns the highest-drift open entry whose id isn't in
    /// `exclude_ids`, i.e. the next clarification question the gate
    /// protocol should consider asking. `exclude_ids` is owned by the
    /// session (in-memory, not persisted) so a dismissed-for-now entry
    /// can resurface in a later session.
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationFailed` if the query fails.
    pub fn next(&self, exclude_ids: &HashSet<String>) -> Result<Option<LedgerEntry>> {
        let open = self.list_open(usize::MAX)?;
        Ok(open
            .into_iter()
            .filter(|entry| !exclude_ids.contains(entry.ledger_id.as_str()))
            .max_by(|a, b| a.drift.partial_cmp(&b.drift).unwrap_or(std::cmp::Ordering::Equal)))
    }

    /// Transitions an entry from `Open` to `Asked`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the entry doesn't exist, or
    /// `Error::LedgerInvariant` if it isn't currently `Open`.
    pub fn mark_asked(&self, id: &LedgerId) -> Result<LedgerEntry> {
        let entry = self.require_entry(id)?;
        if entry.state != LedgerState::Open {
            return Err(Error::LedgerInvariant {
                from: entry.state.to_string(),
                to: LedgerState::Asked.to_string(),
            });
        }
        let now = current_timestamp();
        let conn = self.lock()?;
        retry_with_backoff("ledger_mark_asked", &self.config, || {
            conn.execute(
                "UPDATE contradiction_ledger SET state = 'asked', timestamp_asked = ?1
                 WHERE ledger_id = ?2",
                params![now as i64, id.as_str()],
            )
        })?;
        Ok(LedgerEntry {
            state: LedgerState::Asked,
            timestamp_asked: Some(now),
            ..entry
        })
    }

    /// Transitions an entry to `Resolved`, optionally recording the
    /// winning value. Valid from `Open` or `Asked` (automatic
    /// reinforcement can resolve an entry the user was never asked
    /// about).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the entry doesn't exist, or
    /// `Error::LedgerInvariant` if it's already terminal.
    pub fn resolve(&self, id: &LedgerId, winning_value: Option<String>) -> Result<LedgerEntry> {
        self.terminate(id, LedgerState::Resolved, winning_value)
    }

    /// Transitions an entry to `Dismissed`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the entry doesn't exist, or
    /// `Error::LedgerInvariant` if it's already terminal.
    pub fn dismiss(&self, id: &LedgerId) -> Result<LedgerEntry> {
        self.terminate(id, LedgerState::Dismissed, None)
    }

    fn terminate(
        &self,
        id: &LedgerId,
        target: LedgerState,
        winning_value: Option<String>,
    ) -> Result<LedgerEntry> {
        let entry = self.require_entry(id)?;
        if matches!(entry.state, LedgerState::Resolved | LedgerState::Dismissed) {
            return Err(Error::LedgerInvariant {
                from: entry.state.to_string(),
                to: target.to_string(),
            });
        }
        let now = current_timestamp();
        let conn = self.lock()?;
        retry_with_backoff("ledger_terminate", &self.config, || {
            conn.execute(
                "UPDATE contradiction_ledger
                 SET state = ?1, timestamp_resolved = ?2, winning_value = ?3
                 WHERE ledger_id = ?4",
                params![target.to_string(), now as i64, winning_value, id.as_str()],
            )
        })?;
        Ok(LedgerEntry {
            state: target,
            timestamp_resolved: Some(now),
            winning_value,
            ..entry
        })
    }

    fn require_entry(&self, id: &LedgerId) -> Result<LedgerEntry> {
        self.get(id)?.ok_or_else(|| {
            Error::InvalidInput(format!("no ledger entry with id {id}"))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn memory_id(seed: &str) -> MemoryId {
        MemoryId::content_address(seed, crate::models::Source::User)
    }

    #[test]
    fn test_record_candidate_is_idempotent() {
        let ledger = ContradictionLedger::open_in_memory().unwrap();
        let old = memory_id("old text");
        let new = memory_id("new text");
        let first = ledger
            .record_candidate(&old, &new, Some("employer"), 0.4, None, None)
            .unwrap();
        let second = ledger
            .record_candidate(&old, &new, Some("employer"), 0.4, None, None)
            .unwrap();
        assert_eq!(first.ledger_id, second.ledger_id);
        assert_eq!(ledger.list_open(10).unwrap().len(), 1);
    }

    #[test]
    fn test_next_returns_highest_drift_open_entry() {
        let ledger = ContradictionLedger::open_in_memory().unwrap();
        ledger
            .record_candidate(&memory_id("a1"), &memory_id("a2"), Some("location"), 0.2, None, None)
            .unwrap();
        let high = ledger
            .record_candidate(&memory_id("b1"), &memory_id("b2"), Some("employer"), 0.9, None, None)
            .unwrap();
        let next = ledger.next(&HashSet::new()).unwrap().unwrap();
        assert_eq!(next.ledger_id, high.ledger_id);
    }

    #[test]
    fn test_next_excludes_already_asked_this_session() {
        let ledger = ContradictionLedger::open_in_memory().unwrap();
        let entry = ledger
            .record_candidate(&memory_id("c1"), &memory_id("c2"), Some("title"), 0.5, None, None)
            .unwrap();
        let mut excluded = HashSet::new();
        excluded.insert(entry.ledger_id.as_str().to_string());
        assert!(ledger.next(&excluded).unwrap().is_none());
    }

    #[test]
    fn test_lifecycle_open_asked_resolved() {
        let ledger = ContradictionLedger::open_in_memory().unwrap();
        let entry = ledger
            .record_candidate(&memory_id("d1"), &memory_id("d2"), None, 0.3, None, None)
            .unwrap();
        let asked = ledger.mark_asked(&entry.ledger_id).unwrap();
        assert_eq!(asked.state, LedgerState::Asked);
        let resolved = ledger
            .resolve(&entry.ledger_id, Some("new value".to_string()))
            .unwrap();
        assert_eq!(resolved.state, LedgerState::Resolved);
        assert_eq!(resolved.winning_value.as_deref(), Some("new value"));
    }

    #[test]
    fn test_resolve_from_open_is_allowed() {
        let ledger = ContradictionLedger::open_in_memory().unwrap();
        let entry = ledger
            .record_candidate(&memory_id("e1"), &memory_id("e2"), None, 0.1, None, None)
            .unwrap();
        let resolved = ledger.resolve(&entry.ledger_id, None).unwrap();
        assert_eq!(resolved.state, LedgerState::Resolved);
    }

    #[test]
    fn test_terminal_state_rejects_further_transitions() {
        let ledger = ContradictionLedger::open_in_memory().unwrap();
        let entry = ledger
            .record_candidate(&memory_id("f1"), &memory_id("f2"), None, 0.1, None, None)
            .unwrap();
        ledger.dismiss(&entry.ledger_id).unwrap();
        let err = ledger.mark_asked(&entry.ledger_id).unwrap_err();
        assert!(matches!(err, Error::LedgerInvariant { .. }));
    }

    #[test]
    fn test_unknown_id_is_invalid_input() {
        let ledger = ContradictionLedger::open_in_memory().unwrap();
        let err = ledger.mark_asked(&LedgerId::generate()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_unresolved_count_for_slot_excludes_terminal_entries() {
        let ledger = ContradictionLedger::open_in_memory().unwrap();
        let open = ledger
            .record_candidate(&memory_id("g1"), &memory_id("g2"), Some("employer"), 0.5, None, None)
            .unwrap();
        ledger
            .record_candidate(&memory_id("h1"), &memory_id("h2"), Some("employer"), 0.6, None, None)
            .unwrap();
        let resolved = ledger
            .record_candidate(&memory_id("i1"), &memory_id("i2"), Some("employer"), 0.7, None, None)
            .unwrap();
        ledger.mark_asked(&open.ledger_id).unwrap();
        ledger.resolve(&resolved.ledger_id, Some("amazon".to_string())).unwrap();
        assert_eq!(ledger.unresolved_count_for_slot("employer").unwrap(), 2);
        assert_eq!(ledger.unresolved_count_for_slot("location").unwrap(), 0);
    }
}
