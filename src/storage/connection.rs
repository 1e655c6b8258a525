//! Connection setup: WAL mode and busy-timeout, grounded on subcog's
//! `storage::sqlite::connection` module.

use crate::config::StorageConfig;
use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;

/// Opens a SQLite connection at `path`, configured for concurrent access:
/// WAL journal mode and a busy-timeout matching `config.busy_timeout_ms`
/// so a writer backs off instead of failing immediately against a
/// concurrently-held lock.
///
/// # Errors
///
/// Returns `Error::OperationFailed` if the connection cannot be opened or
/// the pragmas cannot be set.
pub fn open_connection(path: impl AsRef<Path>, config: &StorageConfig) -> Result<Connection> {
    let conn = Connection::open(path.as_ref()).map_err(|e| Error::OperationFailed {
        operation: "open_connection".to_string(),
        cause: e.to_string(),
    })?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| Error::OperationFailed {
            operation: "set_journal_mode".to_string(),
            cause: e.to_string(),
        })?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(|e| Error::OperationFailed {
            operation: "set_synchronous".to_string(),
            cause: e.to_string(),
        })?;
    conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|e| Error::OperationFailed {
            operation: "set_busy_timeout".to_string(),
            cause: e.to_string(),
        })?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| Error::OperationFailed {
            operation: "set_foreign_keys".to_string(),
            cause: e.to_string(),
        })?;
    Ok(conn)
}

/// Opens an in-memory connection with the same pragmas, for tests.
///
/// # Errors
///
/// Returns `Error::OperationFailed` if the connection cannot be opened.
pub fn open_in_memory(config: &StorageConfig) -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
        operation: "open_in_memory".to_string(),
        cause: e.to_string(),
    })?;
    conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|e| Error::OperationFailed {
            operation: "set_busy_timeout".to_string(),
            cause: e.to_string(),
        })?;
    Ok(conn)
}
