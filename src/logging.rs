//! Logging setup for the binary.
//!
//! Everything allowed by the filter goes to a daily rolling file in the data
//! directory; warnings and errors are echoed to stderr as well.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the filter directives, e.g. `cbsbooks_sync=debug`.
pub const LOG_ENV: &str = "CBSBOOKS_LOG";

const DEFAULT_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "cbsbooks.log";

fn env_filter(directives: Option<&str>) -> EnvFilter {
  directives
    .and_then(|d| EnvFilter::try_new(d).ok())
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Keep the returned guard alive until exit so
/// buffered lines reach the file.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
  let (file_writer, guard) = tracing_appender::non_blocking(appender);

  let directives = std::env::var(LOG_ENV).ok();
  tracing_subscriber::registry()
    .with(env_filter(directives.as_deref()))
    .with(
      fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(false),
    )
    .with(
      fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(LevelFilter::WARN),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
