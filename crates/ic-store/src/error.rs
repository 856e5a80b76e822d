//! Store error types.

use ic_models::{EntryError, EntryKey, GeometryError};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing the results table.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid entry key: {0}")]
    InvalidKey(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(EntryKey),

    #[error("Invalid subject label '{label}': {reason}")]
    InvalidLabel { label: String, reason: &'static str },

    #[error("Malformed {column} cell '{cell}': {reason}")]
    MalformedCell {
        column: &'static str,
        cell: String,
        reason: String,
    },

    #[error(transparent)]
    Entry(#[from] EntryError),

    #[error("Malformed bounding box: {0}")]
    Geometry(#[from] GeometryError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    pub fn invalid_label(label: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidLabel {
            label: label.into(),
            reason,
        }
    }

    pub fn malformed_cell(
        column: &'static str,
        cell: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedCell {
            column,
            cell: cell.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is an input validation failure.
    ///
    /// Validation failures reject a single entry and leave the store
    /// untouched; the rest of a batch can proceed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidKey(_)
                | StoreError::InvalidLabel { .. }
                | StoreError::MalformedCell { .. }
                | StoreError::Entry(_)
                | StoreError::Geometry(_)
        )
    }
}
