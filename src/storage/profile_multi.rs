//! Global, slot-keyed user-profile facts (spec.md §6's `profile_multi`
//! table), promoted into the retrieval pool as synthetic high-trust
//! memories rather than stored as ordinary per-thread memories (spec.md
//! §4.2).

use crate::config::StorageConfig;
use crate::models::Fact;
use crate::storage::retry_with_backoff;
use crate::{current_timestamp, Error, Result};
use rusqlite::{params, Connection};
use std::sync::Mutex;

/// One active `profile_multi` row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileFact {
    /// The hard slot this fact fills.
    pub slot: String,
    /// The raw value as stated.
    pub value: String,
    /// The normalized value, unique together with `slot`.
    pub normalized: String,
    /// When this value was last written.
    pub ts: u64,
    /// Thread the value was learned from.
    pub source_thread: String,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Trust assigned to a `profile_multi` fact promoted into a synthetic
/// memory, per spec.md §4.2's "global profile facts surface as
/// high-trust (>=0.9) memories" note.
pub const PROFILE_MEMORY_TRUST: f64 = 0.9;

/// SQLite-backed store for global profile facts, sharing the connection
/// conventions of [`crate::memory::sqlite_store::SqliteMemoryStore`].
pub struct ProfileMultiStore {
    conn: Mutex<Connection>,
    config: StorageConfig,
}

impl ProfileMultiStore {
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

    /// Opens an in-memory store, for tests.
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

    /// Upserts a fact into `profile_multi`, keyed on `(slot, normalized)`.
    /// A later write for the same `(slot, normalized)` pair refreshes
    /// `ts`/`source_thread`/`confidence` rather than duplicating the row.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageBusy` if every retry attempt fails.
    pub fn upsert(&self, fact: &Fact, source_thread: &str) -> Result<()> {
        let conn = self.lock()?;
        let now = current_timestamp();
        retry_with_backoff("upsert_profile_fact", &self.config, || {
            conn.execute(
                "INSERT INTO profile_multi (
                    slot, value, normalized, ts, source_thread, confidence, active
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
                ON CONFLICT(slot, normalized) DO UPDATE SET
                    value = excluded.value,
                    ts = excluded.ts,
                    source_thread = excluded.source_thread,
                    confidence = excluded.confidence,
                    active = 1",
                params![fact.slot, fact.value, fact.normalized, now as i64, source_thread, 1.0_f64],
            )
        })?;
        Ok(())
    }

    /// Marks a `(slot, normalized)` row inactive without deleting it,
    /// preserving the append-only spirit of the rest of the schema.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageBusy` if every retry attempt fails.
    pub fn deactivate(&self, slot: &str, normalized: &str) -> Result<()> {
        let conn = self.lock()?;
        retry_with_backoff("deactivate_profile_fact", &self.config, || {
            conn.execute(
                "UPDATE profile_multi SET active = 0 WHERE slot = ?1 AND normalized = ?2",
                params![slot, normalized],
            )
        })?;
        Ok(())
    }

    /// Lists every active profile fact, for promotion into the retrieval
    /// pool as synthetic high-trust memories.
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationFailed` if the query fails.
    pub fn list_active(&self) -> Result<Vec<ProfileFact>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT slot, value, normalized, ts, source_thread, confidence
                 FROM profile_multi WHERE active = 1",
            )
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_list_profile_facts".to_string(),
                cause: e.to_string(),
            })?;
        let rows = stmt
            .query_map([], |row| {
                let ts: i64 = row.get(3)?;
                Ok(ProfileFact {
                    slot: row.get(0)?,
                    value: row.get(1)?,
                    normalized: row.get(2)?,
                    ts: ts.max(0) as u64,
                    source_thread: row.get(4)?,
                    confidence: row.get(5)?,
                })
            })
            .map_err(|e| Error::OperationFailed {
                operation: "query_list_profile_facts".to_string(),
                cause: e.to_string(),
            })?;
        let mut facts = Vec::new();
        for row in rows {
            facts.push(row.map_err(|e| Error::OperationFailed {
                operation: "map_profile_fact_row".to_string(),
                cause: e.to_string(),
            })?);
        }
        Ok(facts)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::ExtractionMethod;

    #[test]
    fn test_upsert_then_list_active() {
        let store = ProfileMultiStore::open_in_memory().unwrap();
        let fact = Fact::new("employer", "Acme Corp", "u1", ExtractionMethod::Regex);
        store.upsert(&fact, "thread-1").unwrap();
        let active = store.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].slot, "employer");
    }

    #[test]
    fn test_upsert_same_slot_normalized_does_not_duplicate() {
        let store = ProfileMultiStore::open_in_memory().unwrap();
        let fact = Fact::new("employer", "Acme Corp", "u1", ExtractionMethod::Regex);
        store.upsert(&fact, "thread-1").unwrap();
        let mut updated = fact.clone();
        updated.value = "Acme Corporation".to_string();
        store.upsert(&updated, "thread-2").unwrap();
        let active = store.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].value, "Acme Corporation");
    }

    #[test]
    fn test_deactivate_excludes_from_list_active() {
        let store = ProfileMultiStore::open_in_memory().unwrap();
        let fact = Fact::new("location", "Seattle", "u1", ExtractionMethod::Regex);
        store.upsert(&fact, "thread-1").unwrap();
        store.deactivate("location", &fact.normalized).unwrap();
        assert!(store.list_active().unwrap().is_empty());
    }
}
