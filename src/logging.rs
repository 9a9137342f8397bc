//! Logging setup for pipeline runs.
//!
//! Nothing is installed globally: callers build a [`Dispatch`] and scope it
//! with [`tracing::dispatcher::with_default`]. Before the run directory exists
//! only stdout is used; afterwards the run also writes `pipeline.log`.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::Dispatch;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::error::{PipelineError, Result};

/// Name of the per-run log file.
pub const LOG_FILE_NAME: &str = "pipeline.log";

/// Local wall-clock timestamps, e.g. `2024-03-01 14:02:11`.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// `RUST_LOG` if set and valid, otherwise `info`.
fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Stdout-only dispatcher used until the run directory exists.
pub fn console_dispatch() -> Dispatch {
    let stdout_layer = fmt::layer().with_timer(LocalTimer).with_writer(std::io::stdout);
    Dispatch::new(Registry::default().with(build_env_filter()).with(stdout_layer))
}

/// Dispatcher writing to stdout and to `<run_dir>/pipeline.log`.
///
/// Returns the dispatcher and the log file path.
pub fn run_dispatch<P: AsRef<Path>>(run_dir: P) -> Result<(Dispatch, PathBuf)> {
    let run_dir = run_dir.as_ref();
    let log_path = run_dir.join(LOG_FILE_NAME);
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_NAME)
        .build(run_dir)
        .map_err(|e| PipelineError::write(&log_path, std::io::Error::other(e)))?;

    let stdout_layer = fmt::layer().with_timer(LocalTimer).with_writer(std::io::stdout);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_timer(LocalTimer)
        .with_writer(file_appender);

    let subscriber = Registry::default()
        .with(build_env_filter())
        .with(stdout_layer)
        .with(file_layer);
    Ok((Dispatch::new(subscriber), log_path))
}
