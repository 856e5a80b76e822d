//! Shared data models for the skull attribution pipeline.
//!
//! This crate provides:
//! - Frame timestamps with a canonical, order-preserving rendering
//! - Bounding boxes and the geometry used for attribution
//! - Results-table entries, sparse updates and attribution values
//! - Episode filename parsing

pub mod entry;
pub mod geometry;
pub mod timestamp;
pub mod utils;

// Re-export common types
pub use entry::{
    Attribution, Entry, EntryError, EntryKey, EntryResult, EntryUpdate, IdentifiedSubject,
    UNKNOWN_LABEL,
};
pub use geometry::{center, centroid, distance, BoundingBox, GeometryError, GeometryResult, Point};
pub use timestamp::{Timestamp, TimestampError};
pub use utils::{episode_number_from_filename, EpisodeNameError, DEFAULT_EPISODE_PATTERN};
