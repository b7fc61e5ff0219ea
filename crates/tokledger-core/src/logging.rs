//! Logging infrastructure for tokledger.
//!
//! This module provides structured logging using the `tracing` ecosystem.
//! Reports go to stdout; diagnostics go to a JSON log file and, filtered, to
//! stderr, so scheduled runs leave a machine-readable trail without
//! cluttering the terminal.
//!
//! ## Features
//!
//! - JSON lines format for machine parsing
//! - File output to `~/.tokledger/logs/tokledger.log` (rotated daily)
//! - Console output on stderr: warnings only, everything with `-v`
//! - `RUST_LOG` overrides the file filter
//!
//! ## Example
//!
//! ```no_run
//! use tokledger_core::logging;
//!
//! // Initialize logging (call once at startup)
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!("scan started");
//! tracing::debug!(file = "session.jsonl", "reading log");
//! ```

use std::path::PathBuf;

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::{LedgerError, Result};
use crate::paths;

/// Guard that must be held to ensure log flushing on shutdown.
///
/// When this guard is dropped, it flushes any pending log entries.
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the tokledger logging system.
///
/// This sets up:
/// - File logging to `<log_dir>/tokledger.log` (JSON lines format)
/// - Console logging to stderr (human-readable format)
///
/// # Arguments
///
/// * `log_dir` - Optional custom log directory. Defaults to `~/.tokledger/logs/`
/// * `verbose` - If true, logs DEBUG and above everywhere. Otherwise the
///   file gets INFO and the console only WARN.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| LedgerError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "tokledger.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tokledger={default_level}")));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(verbose)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact()
        .with_filter(console_level);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Get the default log directory path.
///
/// Returns `~/.tokledger/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(paths::app_dir()?.join("logs"))
}

/// Log a ledger mutation under the `tokledger::ledger` target.
///
/// # Example
///
/// ```ignore
/// log_ledger_event!("merge", new_sessions = 3, duplicates = 12);
/// ```
#[macro_export]
macro_rules! log_ledger_event {
    ($action:expr) => {
        tracing::info!(
            target: "tokledger::ledger",
            action = $action,
            "ledger event"
        )
    };
    ($action:expr, $($field:tt)*) => {
        tracing::info!(
            target: "tokledger::ledger",
            action = $action,
            $($field)*,
            "ledger event"
        )
    };
}
