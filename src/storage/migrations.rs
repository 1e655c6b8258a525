//! Schema migrations, grounded on subcog's `storage::sqlite::migrations`
//! versioned-schema pattern, collapsed to a single `user_version` bump
//! since CRT ships one schema revision.

use crate::{Error, Result};
use rusqlite::Connection;

const SCHEMA_VERSION: i64 = 1;

/// Creates all tables if they don't already exist and records the schema
/// version. Idempotent: safe to call on every startup.
///
/// # Errors
///
/// Returns `Error::OperationFailed` if any statement fails.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| Error::OperationFailed {
            operation: "read_schema_version".to_string(),
            cause: e.to_string(),
        })?;
    if current >= SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS memories (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            source TEXT NOT NULL,
            embedding BLOB NOT NULL,
            trust REAL NOT NULL,
            confidence_declared REAL NOT NULL,
            timestamp_created INTEGER NOT NULL,
            timestamp_last_seen INTEGER NOT NULL,
            reinforcement_count INTEGER NOT NULL DEFAULT 0,
            context TEXT NOT NULL DEFAULT '{}',
            sse_mode TEXT NOT NULL DEFAULT 'stable',
            retired INTEGER NOT NULL DEFAULT 0,
            user_marked_important INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_memories_retired ON memories(retired);
        CREATE INDEX IF NOT EXISTS idx_memories_source ON memories(source);

        CREATE TABLE IF NOT EXISTS contradiction_ledger (
            ledger_id TEXT PRIMARY KEY,
            old_memory_id TEXT NOT NULL,
            new_memory_id TEXT NOT NULL,
            slot TEXT,
            drift REAL NOT NULL,
            state TEXT NOT NULL,
            suggested_question TEXT,
            semantic_anchor TEXT,
            timestamp_created INTEGER NOT NULL,
            timestamp_asked INTEGER,
            timestamp_resolved INTEGER,
            winning_value TEXT,
            canonical_key TEXT NOT NULL UNIQUE
        );
        CREATE INDEX IF NOT EXISTS idx_ledger_state ON contradiction_ledger(state);
        CREATE INDEX IF NOT EXISTS idx_ledger_drift ON contradiction_ledger(drift);

        CREATE TABLE IF NOT EXISTS reflection_scorecards (
            thread_id TEXT NOT NULL,
            generated_at INTEGER NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (thread_id, generated_at)
        );

        CREATE TABLE IF NOT EXISTS personality_profiles (
            thread_id TEXT NOT NULL,
            generated_at INTEGER NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (thread_id, generated_at)
        );

        CREATE TABLE IF NOT EXISTS threads (
            thread_id TEXT PRIMARY KEY,
            last_active INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS profile_multi (
            slot TEXT NOT NULL,
            value TEXT NOT NULL,
            normalized TEXT NOT NULL,
            ts INTEGER NOT NULL,
            source_thread TEXT NOT NULL,
            confidence REAL NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (slot, normalized)
        );
        CREATE INDEX IF NOT EXISTS idx_profile_multi_active ON profile_multi(active);
        ",
    )
    .map_err(|e| Error::OperationFailed {
        operation: "run_migrations".to_string(),
        cause: e.to_string(),
    })?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| Error::OperationFailed {
            operation: "bump_schema_version".to_string(),
            cause: e.to_string(),
        })?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'memories'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_all_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        for table in [
            "memories",
            "contradiction_ledger",
            "reflection_scorecards",
            "personality_profiles",
            "profile_multi",
            "threads",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "table {table} should exist");
        }
    }
}
