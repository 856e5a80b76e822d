//! Worker error types.

use ic_models::EpisodeNameError;
use ic_store::StoreError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    #[error("Identification failed: {0}")]
    IdentificationFailed(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Results sink failed: {0}")]
    SinkFailed(String),

    #[error("Invalid recording {path}: {reason}")]
    InvalidRecording { path: String, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Episode error: {0}")]
    Episode(#[from] EpisodeNameError),

    #[error("Config error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn detection_failed(msg: impl Into<String>) -> Self {
        Self::DetectionFailed(msg.into())
    }

    pub fn identification_failed(msg: impl Into<String>) -> Self {
        Self::IdentificationFailed(msg.into())
    }

    pub fn transfer_failed(msg: impl Into<String>) -> Self {
        Self::TransferFailed(msg.into())
    }

    pub fn sink_failed(msg: impl Into<String>) -> Self {
        Self::SinkFailed(msg.into())
    }

    pub fn invalid_recording(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRecording {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkerError::TransferFailed(_)
                | WorkerError::SinkFailed(_)
                | WorkerError::DetectionFailed(_)
                | WorkerError::IdentificationFailed(_)
                | WorkerError::Io(_)
        )
    }

    /// Errors that concern a single entry and should not stop a batch.
    pub fn is_entry_scoped(&self) -> bool {
        match self {
            WorkerError::IdentificationFailed(_) => true,
            WorkerError::Store(e) => e.is_validation(),
            _ => false,
        }
    }
}
