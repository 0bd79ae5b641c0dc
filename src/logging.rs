//! Process-wide tracing subscriber.
//!
//! Events are filtered by `RUST_LOG` (default `info`) and written twice: compact and colored to
//! stdout, and as plain text appended to [`Config::log_file`] when one is configured.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, util::TryInitError};

use crate::config::Config;

const DEFAULT_FILTER: &str = "info";

/// Flushes the file writer on shutdown; lives as long as the process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber described by `config`.
///
/// A log file that cannot be opened only disables the file layer. Fails if a global subscriber
/// is already installed.
pub fn init_tracing(config: &Config) -> Result<(), TryInitError> {
    let file_layer = config
        .log_file
        .as_deref()
        .and_then(|path| match open_log_file(path) {
            Ok(writer) => Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .compact(),
            ),
            Err(error) => {
                eprintln!("File logging disabled, cannot open {}: {error}", path.display());
                None
            }
        });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .try_init()?;

    match &config.log_file {
        Some(path) => tracing::debug!(path = %path.display(), "Logging to file"),
        None => tracing::debug!("File logging off"),
    }
    Ok(())
}

/// Open `path` for appending behind a non-blocking writer, creating parent directories.
fn open_log_file(path: &Path) -> std::io::Result<NonBlocking> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let _ = FILE_GUARD.set(guard);
    Ok(writer)
}
