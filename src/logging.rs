//! Log output
//!
//! Installs a `tracing` subscriber writing human-readable lines to stderr
//! and, unless disabled, appending to `~/.hebrew-trainer/logs/hebrew-trainer.log`.
//! Stdout is left to the presenter.

use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const LOG_FILE_NAME: &str = "hebrew-trainer.log";

/// Format timestamps using the system's local time via chrono
struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Directory holding log files (~/.hebrew-trainer/logs)
pub fn get_log_dir() -> PathBuf {
    crate::config::get_config_dir().join("logs")
}

/// `RUST_LOG` if set, otherwise the configured level
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

fn open_log_file() -> Option<(std::fs::File, PathBuf)> {
    let log_dir = get_log_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory {:?}: {}", log_dir, e);
        return None;
    }
    let path = log_dir.join(LOG_FILE_NAME);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()
        .map(|file| (file, path))
}

/// Install the global subscriber
///
/// Returns the log file path when file logging is active. Fails if a
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<PathBuf>, TryInitError> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTimer);

    let log_file = if config.log_to_file {
        open_log_file()
    } else {
        None
    };

    match log_file {
        Some((file, path)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_timer(LocalTimer)
                .with_ansi(false);
            tracing_subscriber::registry()
                .with(build_filter(config))
                .with(stderr_layer)
                .with(file_layer)
                .try_init()?;
            Ok(Some(path))
        }
        None => {
            tracing_subscriber::registry()
                .with(build_filter(config))
                .with(stderr_layer)
                .try_init()?;
            Ok(None)
        }
    }
}
