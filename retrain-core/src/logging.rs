//! Run-scoped logging — a console layer plus a log file under the run
//! directory.
//!
//! The subscriber is installed once per process, but its file half is bound
//! to a single run's `log.txt` and the returned guard scopes the writer to
//! the run: dropping it flushes and closes the file.

use crate::error::{TrainError, TrainResult};
use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Keeps the log file flushing for as long as the run lives.
pub struct LogGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Install a console + file subscriber for one run.
///
/// The file layer appends to `log_path`; the console layer writes
/// human-readable lines to stderr. `filter` is an `EnvFilter` directive
/// such as "info" or "debug".
pub fn init_run_logging(log_path: &Path, filter: &str) -> TrainResult<LogGuard> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| TrainError::filesystem(log_path, e))?;
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| TrainError::config(format!("logging already initialized: {e}")))?;

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}
