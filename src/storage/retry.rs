//! Write-retry-with-backoff, grounded on subcog's
//! `storage::resilience::retry_connection` pattern (the function itself
//! is not actually present in that module; this reimplements the shape
//! subcog's `storage::bulkhead`/`resilience` modules establish, using the
//! exact backoff schedule spec.md §4.2 mandates).

use crate::config::StorageConfig;
use crate::{Error, Result};
use std::time::Duration;

/// Returns `true` if `err` represents a transient SQLite contention error
/// (`SQLITE_BUSY`/`SQLITE_LOCKED`) worth retrying, as opposed to a
/// logical or schema error that retrying cannot fix.
#[must_use]
pub fn is_retryable(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

/// Runs `operation`, retrying on a retryable SQLite error with exponential
/// backoff (`config.retry_initial_backoff_ms`, doubling, capped at
/// `config.retry_backoff_cap_ms`, up to `config.retry_max_attempts`
/// attempts total).
///
/// # Errors
///
/// Returns `Error::StorageBusy` once the retry budget is exhausted, or
/// `Error::OperationFailed` immediately on a non-retryable error.
pub fn retry_with_backoff<T>(
    operation_name: &str,
    config: &StorageConfig,
    mut operation: impl FnMut() -> rusqlite::Result<T>,
) -> Result<T> {
    let mut backoff_ms = config.retry_initial_backoff_ms;
    let mut attempts = 0_u32;
    loop {
        attempts += 1;
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(&err) && attempts < config.retry_max_attempts => {
                std::thread::sleep(Duration::from_millis(backoff_ms));
                backoff_ms = (backoff_ms.saturating_mul(
                    (config.retry_backoff_factor as u64).max(1),
                ))
                .min(config.retry_backoff_cap_ms);
            }
            Err(err) if is_retryable(&err) => {
                return Err(Error::StorageBusy {
                    operation: operation_name.to_string(),
                    attempts,
                });
            }
            Err(err) => {
                return Err(Error::OperationFailed {
                    operation: operation_name.to_string(),
                    cause: err.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_succeeds_on_first_try() {
        let config = StorageConfig::default();
        let result = retry_with_backoff("test_op", &config, || Ok::<_, rusqlite::Error>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_non_retryable_error_fails_immediately() {
        let config = StorageConfig::default();
        let calls = Cell::new(0);
        let result: Result<()> = retry_with_backoff("test_op", &config, || {
            calls.set(calls.get() + 1);
            Err(rusqlite::Error::InvalidQuery)
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
        match result {
            Err(Error::OperationFailed { operation, .. }) => assert_eq!(operation, "test_op"),
            other => panic!("expected OperationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_exhausts_retry_budget_and_reports_attempts() {
        let mut config = StorageConfig::default();
        config.retry_initial_backoff_ms = 1;
        config.retry_max_attempts = 3;
        let calls = Cell::new(0);
        let result: Result<()> = retry_with_backoff("busy_op", &config, || {
            calls.set(calls.get() + 1);
            Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: rusqlite::ErrorCode::DatabaseBusy,
                    extended_code: 5,
                },
                None,
            ))
        });
        assert_eq!(calls.get(), 3);
        match result {
            Err(Error::StorageBusy { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected StorageBusy, got {other:?}"),
        }
    }
}
