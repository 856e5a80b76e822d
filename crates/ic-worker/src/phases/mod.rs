//! The three pipeline phases.
//!
//! Phases run as separate invocations in strict order and hand the
//! episode's results table over through its file:
//!
//! 1. [`detect`]: record skull boxes for every frame that has any
//! 2. [`identify`]: record the faces of every frame with skulls
//! 3. [`attribute`]: derive attributions, insert the projection into the
//!    results table sink and export the final file

use std::fmt;
use std::path::{Path, PathBuf};

use ic_store::EntryStore;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::PhaseLogger;
use crate::providers::RemoteStorage;
use crate::retry::retry_async;

mod attribute;
mod detect;
mod identify;

pub use attribute::attribute;
pub use detect::detect;
pub use identify::identify;

/// Pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    Detect,
    Identify,
    Attribute,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 3] = [Phase::Detect, Phase::Identify, Phase::Attribute];

    /// Name used in logs and remote file names.
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Detect => "phase1",
            Phase::Identify => "phase2",
            Phase::Attribute => "phase3",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a phase did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseSummary {
    /// Entries created in the results table.
    pub created: usize,
    /// Entries that already existed and were updated.
    pub updated: usize,
    /// Entries that could not be processed.
    pub failed: usize,
    /// Rows handed to the results sink.
    pub inserted: usize,
    /// Remote path of the uploaded results snapshot.
    pub uploaded: Option<String>,
}

/// Everything a phase needs to know about the episode it runs on.
pub struct EpisodeContext<'a> {
    pub config: &'a PipelineConfig,
    pub storage: &'a dyn RemoteStorage,
    pub episode: u32,
    pub episode_file: PathBuf,
}

impl<'a> EpisodeContext<'a> {
    /// Derive the episode number from the episode file name.
    pub fn new(
        config: &'a PipelineConfig,
        storage: &'a dyn RemoteStorage,
        episode_file: impl Into<PathBuf>,
    ) -> WorkerResult<Self> {
        let episode_file = episode_file.into();
        let episode = config.episode_number(&episode_file)?;
        Ok(Self {
            config,
            storage,
            episode,
            episode_file,
        })
    }

    pub fn logger(&self, phase: Phase) -> PhaseLogger {
        PhaseLogger::new(self.episode, phase)
    }

    pub fn results_path(&self) -> PathBuf {
        self.config.results_path(self.episode)
    }

    /// Open the episode's results table.
    pub fn open_store(&self, logger: &PhaseLogger) -> WorkerResult<EntryStore> {
        let path = self.results_path();
        let outcome = EntryStore::open(&path, self.config.pipeline.subject_policy)?;
        if outcome.reset {
            logger.log_warning(&format!(
                "results table {} had an invalid header and was reset",
                path.display()
            ));
        }
        if outcome.skipped_rows > 0 {
            logger.log_warning(&format!(
                "{} unreadable rows dropped from {}",
                outcome.skipped_rows,
                path.display()
            ));
        }
        Ok(outcome.store)
    }

    /// Upload a results snapshot for `phase`, with retries.
    pub async fn upload_results(&self, phase: Phase, local: &Path) -> WorkerResult<String> {
        let remote = self.config.remote_results_path(self.episode, phase);
        let retry = self.config.retry_config(&format!("{phase}_upload"));

        retry_async(&retry, WorkerError::is_retryable, || {
            self.storage.upload(local, &remote)
        })
        .await
        .map_failure(|e, attempts| {
            WorkerError::transfer_failed(format!(
                "upload of {} to {remote} failed after {attempts} attempts: {e}",
                local.display()
            ))
        })?;

        Ok(remote)
    }
}
