//! Structured logging setup. Grounded on `zeroaltitude-vestige`'s stderr
//! `EnvFilter`-driven `tracing_subscriber::fmt()` init (stdout is reserved
//! for command output, never log lines), generalized to the JSON/pretty
//! format switch and optional file sink the teacher's own (stubbed)
//! `observability::logging` module gestures at but never implements.

use crate::{Error, Result};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::EnvFilter;

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for an interactive terminal.
    Pretty,
    /// Newline-delimited JSON, for log aggregation.
    Json,
}

/// Logging setup, built either from explicit fields or from environment
/// variables via [`LoggingConfig::from_env`].
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Line format.
    pub format: LogFormat,
    /// `tracing_subscriber::EnvFilter` directive string (e.g. `"info"`,
    /// `"crt_core=debug,warn"`).
    pub filter: String,
    /// Optional file to append log lines to, instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info".to_string(),
            file: None,
        }
    }
}

/// Parses the `CRT_LOG_FORMAT` value (anything but `"json"`, including
/// unset, means pretty). Pulled out of `from_env` so the parsing rule
/// can be unit-tested without mutating process-global environment state.
fn parse_log_format(value: Option<&str>) -> LogFormat {
    match value {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

impl LoggingConfig {
    /// Builds a config from `CRT_LOG_FORMAT` (`"json"` or `"pretty"`,
    /// default `"pretty"`), `RUST_LOG` (default `"info"`), and
    /// `CRT_LOG_FILE` (unset means stderr).
    #[must_use]
    pub fn from_env() -> Self {
        let format = parse_log_format(std::env::var("CRT_LOG_FORMAT").ok().as_deref());
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let file = std::env::var("CRT_LOG_FILE").ok().map(PathBuf::from);
        Self { format, filter, file }
    }
}

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

/// Thread-safe append-mode file writer for `tracing_subscriber::fmt`.
#[derive(Clone)]
struct LogFileWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.file.lock().map_err(|e| io::Error::other(e.to_string()))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self.file.lock().map_err(|e| io::Error::other(e.to_string()))?;
        guard.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn open_log_file(path: &Path) -> Result<LogFileWriter> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_log_dir".to_string(),
            cause: e.to_string(),
        })?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::OperationFailed {
            operation: "open_log_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
    Ok(LogFileWriter {
        file: Arc::new(Mutex::new(file)),
    })
}

/// Initializes the global `tracing` subscriber from `config`. Safe to call
/// once per process; a second call returns `Error::OperationFailed` rather
/// than panicking, so library embedders that already set up their own
/// subscriber can detect and ignore the conflict.
///
/// # Errors
///
/// Returns `Error::OperationFailed` if a subscriber is already installed,
/// the filter directive is malformed, or the log file cannot be opened.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(Error::OperationFailed {
            operation: "observability_init".to_string(),
            cause: "observability already initialized".to_string(),
        });
    }

    let filter = EnvFilter::try_new(&config.filter).map_err(|e| Error::ConfigInvalid(format!("invalid log filter {:?}: {e}", config.filter)))?;

    let result = match (&config.file, config.format) {
        (Some(path), LogFormat::Json) => {
            let writer = open_log_file(path)?;
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).json().try_init()
        }
        (Some(path), LogFormat::Pretty) => {
            let writer = open_log_file(path)?;
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).try_init()
        }
        (None, LogFormat::Json) => tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_ansi(false).json().try_init(),
        (None, LogFormat::Pretty) => tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).try_init(),
    };
    result.map_err(|e| Error::OperationFailed {
        operation: "observability_init".to_string(),
        cause: e.to_string(),
    })?;

    OBSERVABILITY_INIT.set(()).map_err(|()| Error::OperationFailed {
        operation: "observability_init".to_string(),
        cause: "failed to mark observability initialized".to_string(),
    })
}

/// Initializes logging using [`LoggingConfig::from_env`].
///
/// # Errors
///
/// See [`init`].
pub fn init_from_env() -> Result<()> {
    init(&LoggingConfig::from_env())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_pretty_stderr() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file.is_none());
        assert_eq!(config.filter, "info");
    }

    // `from_env`'s format parsing is covered via the pure `parse_log_format`
    // helper rather than through `std::env::set_var`, which is `unsafe` as
    // of Rust 1.82 and this crate forbids unsafe code even in tests (see
    // config::tests::test_expand_env_vars_substitutes_set_variable).

    #[test]
    fn test_parse_log_format_recognizes_json() {
        assert_eq!(parse_log_format(Some("json")), LogFormat::Json);
    }

    #[test]
    fn test_parse_log_format_defaults_to_pretty_for_unknown_or_unset() {
        assert_eq!(parse_log_format(Some("xml")), LogFormat::Pretty);
        assert_eq!(parse_log_format(None), LogFormat::Pretty);
    }
}
