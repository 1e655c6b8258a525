//! The process-wide store shared across threads: the thread registry the
//! continuous loops use to discover which per-thread memory databases to
//! scan, plus the `reflection_scorecards`/`personality_profiles` tables
//! those loops write into (spec.md §4.11). Sibling to
//! [`crate::storage::profile_multi::ProfileMultiStore`], which shares the
//! same connection conventions and — per this crate's per-thread-database
//! layout — typically lives in the same physical file as this store.

use crate::config::StorageConfig;
use crate::storage::retry_with_backoff;
use crate::{current_timestamp, Error, Result};
use rusqlite::{params, Connection};
use std::sync::Mutex;

/// SQLite-backed registry of known conversation threads plus the two
/// append-style tables the reflection and personality loops populate.
pub struct GlobalStore {
    conn: Mutex<Connection>,
    config: StorageConfig,
}

impl GlobalStore {
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

    /// Records `thread_id` as active as of now. Called by [`crate::session::Session`]
    /// on every turn so the loops can discover which threads to scan.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageBusy` if every retry attempt fails.
    pub fn touch_thread(&self, thread_id: &str) -> Result<()> {
        let conn = self.lock()?;
        let now = current_timestamp();
        retry_with_backoff("touch_thread", &self.config, || {
            conn.execute(
                "INSERT INTO threads (thread_id, last_active) VALUES (?1, ?2)
                 ON CONFLICT(thread_id) DO UPDATE SET last_active = excluded.last_active",
                params![thread_id, now as i64],
            )
        })?;
        Ok(())
    }

    /// Lists the `limit` most recently active thread ids, most recent
    /// first, mirroring the original's `session_db.list_threads(limit=200)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationFailed` if the query fails.
    pub fn list_threads(&self, limit: usize) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT thread_id FROM threads ORDER BY last_active DESC LIMIT ?1")
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_list_threads".to_string(),
                cause: e.to_string(),
            })?;
        let rows = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .map_err(|e| Error::OperationFailed {
                operation: "query_list_threads".to_string(),
                cause: e.to_string(),
            })?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| Error::OperationFailed {
                operation: "map_list_threads_row".to_string(),
                cause: e.to_string(),
            })?);
        }
        Ok(ids)
    }

    /// Appends a reflection scorecard for `thread_id`, grounded on
    /// `ThreadSessionDB.store_reflection_scorecard`.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageBusy` if every retry attempt fails, or
    /// `Error::OperationFailed` if `payload` cannot be serialized.
    pub fn store_reflection_scorecard(&self, thread_id: &str, payload: &serde_json::Value) -> Result<()> {
        self.store_payload("reflection_scorecards", thread_id, payload)
    }

    /// Appends a personality profile for `thread_id`, grounded on
    /// `ThreadSessionDB.store_personality_profile`.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageBusy` if every retry attempt fails, or
    /// `Error::OperationFailed` if `payload` cannot be serialized.
    pub fn store_personality_profile(&self, thread_id: &str, payload: &serde_json::Value) -> Result<()> {
        self.store_payload("personality_profiles", thread_id, payload)
    }

    fn store_payload(&self, table: &str, thread_id: &str, payload: &serde_json::Value) -> Result<()> {
        let conn = self.lock()?;
        let now = current_timestamp();
        let payload_json = serde_json::to_string(payload).map_err(|e| Error::OperationFailed {
            operation: "serialize_loop_payload".to_string(),
            cause: e.to_string(),
        })?;
        let sql = format!(
            "INSERT INTO {table} (thread_id, generated_at, payload) VALUES (?1, ?2, ?3)"
        );
        retry_with_backoff("store_loop_payload", &self.config, || {
            conn.execute(&sql, params![thread_id, now as i64, payload_json])
        })?;
        Ok(())
    }

    /// Returns the most recently generated payload for `thread_id` from
    /// `table` (`"reflection_scorecards"` or `"personality_profiles"`), if
    /// any, decoded from its stored JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationFailed` if the query fails or the stored
    /// payload is not valid JSON.
    pub fn latest_payload(&self, table: &str, thread_id: &str) -> Result<Option<serde_json::Value>> {
        if table != "reflection_scorecards" && table != "personality_profiles" {
            return Err(Error::InvalidInput(format!("unknown loop table: {table}")));
        }
        let conn = self.lock()?;
        let sql = format!(
            "SELECT payload FROM {table} WHERE thread_id = ?1 ORDER BY generated_at DESC LIMIT 1"
        );
        let payload_json: Option<String> = conn
            .query_row(&sql, params![thread_id], |row| row.get(0))
            .optional_or_none()
            .map_err(|e| Error::OperationFailed {
                operation: "get_latest_loop_payload".to_string(),
                cause: e.to_string(),
            })?;
        payload_json
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| Error::OperationFailed {
                    operation: "deserialize_loop_payload".to_string(),
                    cause: e.to_string(),
                })
            })
            .transpose()
    }
}

/// Small adapter so [`GlobalStore::latest_payload`] can use `?` the same
/// way the rest of this module does, without importing
/// `rusqlite::OptionalExtension` just for one call site with a different
/// row type than the rest of the file.
trait OptionalOrNone<T> {
    fn optional_or_none(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalOrNone<T> for rusqlite::Result<T> {
    fn optional_or_none(self) -> rusqlite::Result<Option<T>> {
        use rusqlite::OptionalExtension;
        self.optional()
    }
}
