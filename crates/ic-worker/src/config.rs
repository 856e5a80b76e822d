//! Pipeline configuration.
//!
//! Loaded once at startup from a TOML file, with `IC__SECTION__KEY`
//! environment variables taking precedence, e.g.
//! `IC__PHASE1__CONFIDENCE_THRESHOLD=0.7`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, Environment, File};
use ic_models::{episode_number_from_filename, EpisodeNameError, DEFAULT_EPISODE_PATTERN};
use ic_store::SubjectPolicy;
use serde::Deserialize;

use crate::error::{WorkerError, WorkerResult};
use crate::phases::Phase;
use crate::retry::RetryConfig;

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pipeline: PipelineSettings,
    pub log: LogConfig,
    pub phase1: Phase1Config,
    pub phase2: Phase2Config,
    pub phase3: Phase3Config,
}

/// Settings shared by every phase.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Local directory holding one `episode<N>` directory per episode.
    pub work_dir: PathBuf,
    /// Root of the remote storage.
    pub remote_dir: PathBuf,
    /// Name of the results table inside an episode directory.
    pub results_filename: String,
    /// Whether subject results may create entries.
    pub subject_policy: SubjectPolicy,
    /// Regex whose first capture group is the episode number.
    pub episode_pattern: String,
    /// Retries for transfers and the bulk insert.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    pub retry_base_delay_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("work"),
            remote_dir: PathBuf::from("remote"),
            results_filename: "results.csv".to_string(),
            subject_policy: SubjectPolicy::AutoCreate,
            episode_pattern: DEFAULT_EPISODE_PATTERN.to_string(),
            max_retries: 3,
            retry_base_delay_ms: 100,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory for dated log files. Logs go to stdout only when unset.
    pub directory: Option<PathBuf>,
    pub format: LogFormat,
    /// Filter directives used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: None,
            format: LogFormat::Pretty,
            filter: "info".to_string(),
        }
    }
}

/// Skull detection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Phase1Config {
    /// Directory of recorded detections, one `episode<N>.json` per episode.
    pub detections_dir: Option<PathBuf>,
    /// Minimum prediction probability.
    pub confidence_threshold: f64,
    /// Prediction tag that marks a skull.
    pub tag: String,
    pub upload_results: bool,
}

impl Default for Phase1Config {
    fn default() -> Self {
        Self {
            detections_dir: None,
            confidence_threshold: 0.5,
            tag: "skull".to_string(),
            upload_results: true,
        }
    }
}

/// Face identification.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Phase2Config {
    /// Directory of recorded identifications, one `episode<N>.json` per episode.
    pub identities_dir: Option<PathBuf>,
    pub upload_results: bool,
}

impl Default for Phase2Config {
    fn default() -> Self {
        Self {
            identities_dir: None,
            upload_results: true,
        }
    }
}

/// Attribution and export.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Phase3Config {
    /// Relational table receiving the final projection.
    pub table: String,
    /// Directory backing the local results sink.
    pub table_dir: PathBuf,
    /// Optional copy of the final results table.
    pub export_path: Option<PathBuf>,
    /// Attribute entries without skulls as `NO_EVENT_FOUND`.
    pub mark_missing_events: bool,
    pub upload_results: bool,
}

impl Default for Phase3Config {
    fn default() -> Self {
        Self {
            table: "skull_events".to_string(),
            table_dir: PathBuf::from("tables"),
            export_path: None,
            mark_missing_events: false,
            upload_results: true,
        }
    }
}

impl PipelineConfig {
    /// Load from a file plus `IC__` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> WorkerResult<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("IC").separator("__"))
            .build()?;
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that every phase relies on.
    pub fn validate(&self) -> WorkerResult<()> {
        let name = &self.pipeline.results_filename;
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(WorkerError::config_error(format!(
                "results_filename must be a plain file name, got '{name}'"
            )));
        }

        if let Err(e @ EpisodeNameError::InvalidPattern { .. }) =
            episode_number_from_filename("", &self.pipeline.episode_pattern)
        {
            return Err(e.into());
        }

        let threshold = self.phase1.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(WorkerError::config_error(format!(
                "phase1.confidence_threshold must be within [0, 1], got {threshold}"
            )));
        }
        if self.phase1.tag.trim().is_empty() {
            return Err(WorkerError::config_error("phase1.tag must not be empty"));
        }
        if self.phase3.table.trim().is_empty() {
            return Err(WorkerError::config_error("phase3.table must not be empty"));
        }

        Ok(())
    }

    /// Check the settings a specific phase needs.
    pub fn validate_phase(&self, phase: Phase) -> WorkerResult<()> {
        match phase {
            Phase::Detect if self.phase1.detections_dir.is_none() => Err(
                WorkerError::config_error("phase1.detections_dir is required for phase1"),
            ),
            Phase::Identify if self.phase2.identities_dir.is_none() => Err(
                WorkerError::config_error("phase2.identities_dir is required for phase2"),
            ),
            _ => Ok(()),
        }
    }

    /// Episode number for an episode file.
    pub fn episode_number(&self, episode_file: &Path) -> WorkerResult<u32> {
        let filename = episode_file
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        Ok(episode_number_from_filename(
            &filename,
            &self.pipeline.episode_pattern,
        )?)
    }

    /// Local directory for an episode.
    pub fn episode_dir(&self, episode: u32) -> PathBuf {
        self.pipeline.work_dir.join(format!("episode{episode}"))
    }

    /// Local results table for an episode.
    pub fn results_path(&self, episode: u32) -> PathBuf {
        self.episode_dir(episode)
            .join(&self.pipeline.results_filename)
    }

    /// Remote path of a phase's results snapshot.
    pub fn remote_results_path(&self, episode: u32, phase: Phase) -> String {
        format!("episode{episode}_output/{}_results.csv", phase.name())
    }

    /// Retry settings for one operation.
    pub fn retry_config(&self, operation: &str) -> RetryConfig {
        RetryConfig::new(operation)
            .with_max_retries(self.pipeline.max_retries)
            .with_base_delay(Duration::from_millis(self.pipeline.retry_base_delay_ms))
    }
}
