//! Collaborator traits.
//!
//! The phases only talk to the outside world through these traits, so the
//! detection services, remote storage and the relational sink can be
//! swapped without touching phase logic. Local implementations live in
//! [`crate::local`].

use async_trait::async_trait;
use std::path::Path;

use ic_attribution::AttributionRow;
use ic_models::{BoundingBox, EntryKey, IdentifiedSubject, Timestamp};

use crate::error::WorkerResult;

/// Skull detections for one sampled frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameEvents {
    pub time: Timestamp,
    pub boxes: Vec<BoundingBox>,
}

/// Skull detection provider.
#[async_trait]
pub trait EventDetector: Send + Sync {
    /// Detect skulls in an episode.
    ///
    /// # Returns
    /// One entry per frame in which at least one skull was found.
    async fn detect_events(&self, episode: u32, video_path: &Path)
        -> WorkerResult<Vec<FrameEvents>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Face identification provider.
#[async_trait]
pub trait SubjectIdentifier: Send + Sync {
    /// Detect and identify the faces in the frame at `key`.
    ///
    /// Unrecognised faces carry the label `unknown`.
    async fn identify(&self, key: &EntryKey) -> WorkerResult<Vec<IdentifiedSubject>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Remote storage used at phase boundaries.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    async fn upload(&self, local_path: &Path, remote_path: &str) -> WorkerResult<()>;

    async fn download(&self, remote_path: &str, local_path: &Path) -> WorkerResult<()>;
}

/// Relational sink for the final projection.
#[async_trait]
pub trait ResultsSink: Send + Sync {
    /// Insert all rows into `table`. Returns the number of rows written.
    async fn bulk_insert(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[AttributionRow],
    ) -> WorkerResult<usize>;
}
