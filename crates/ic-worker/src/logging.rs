//! Logging setup and structured phase logging.
//!
//! [`init`] installs the process-wide subscriber once, from `main`.
//! [`PhaseLogger`] carries the episode and phase into every message a
//! phase emits.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogConfig, LogFormat};
use crate::error::{WorkerError, WorkerResult};
use crate::phases::Phase;

/// Path of the log file for a run started at `now`:
/// `<dir>/YYYY_MM_DD/YYYY_MM_DD_HH_MM_SS.log`.
pub fn log_file_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    dir.join(now.format("%Y_%m_%d").to_string())
        .join(format!("{}.log", now.format("%Y_%m_%d_%H_%M_%S")))
}

/// Install the global subscriber.
///
/// JSON output is used when configured or when `LOG_FORMAT=json`;
/// `RUST_LOG` overrides the configured filter. Returns the log file path
/// when file logging is enabled.
pub fn init(config: &LogConfig) -> WorkerResult<Option<PathBuf>> {
    let use_json = config.format == LogFormat::Json
        || std::env::var("LOG_FORMAT")
            .map(|v| v.to_lowercase() == "json")
            .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let (file_layer, file_path) = match &config.directory {
        Some(dir) => {
            let path = log_file_path(dir, Local::now());
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = File::create(&path)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    let installed = if use_json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init()
    };
    installed.map_err(|e| WorkerError::config_error(format!("Failed to install logger: {e}")))?;

    Ok(file_path)
}

/// Phase logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct PhaseLogger {
    episode: u32,
    phase: Phase,
}

impl PhaseLogger {
    pub fn new(episode: u32, phase: Phase) -> Self {
        Self { episode, phase }
    }

    /// Log the start of a phase.
    pub fn log_start(&self, message: &str) {
        info!(
            episode = self.episode,
            phase = %self.phase,
            "Phase started: {}", message
        );
    }

    /// Log a progress update during a phase.
    pub fn log_progress(&self, message: &str) {
        info!(
            episode = self.episode,
            phase = %self.phase,
            "Phase progress: {}", message
        );
    }

    /// Log a warning during a phase.
    pub fn log_warning(&self, message: &str) {
        warn!(
            episode = self.episode,
            phase = %self.phase,
            "Phase warning: {}", message
        );
    }

    /// Log an error during a phase.
    pub fn log_error(&self, message: &str) {
        error!(
            episode = self.episode,
            phase = %self.phase,
            "Phase error: {}", message
        );
    }

    /// Log the completion of a phase.
    pub fn log_completion(&self, message: &str) {
        info!(
            episode = self.episode,
            phase = %self.phase,
            "Phase completed: {}", message
        );
    }

    /// Create a tracing span for this phase.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "phase",
            episode = self.episode,
            phase = %self.phase
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_path() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let path = log_file_path(Path::new("/var/log/ic"), now);

        assert_eq!(
            path,
            PathBuf::from("/var/log/ic/2024_03_09/2024_03_09_07_05_01.log")
        );
    }
}
