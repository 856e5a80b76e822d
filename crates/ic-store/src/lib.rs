//! Durable results table for the skull attribution pipeline.
//!
//! This crate provides:
//! - [`EntryStore`]: entries keyed by `(episode, time)` with merge semantics
//! - CSV export/import with header validation and self-healing
//! - An atomic write primitive shared by every rewrite of the file

pub mod atomic;
pub mod codec;
pub mod error;
pub mod store;

pub use atomic::write_atomic;
pub use codec::Column;
pub use error::{StoreError, StoreResult};
pub use store::{EntryStore, ImportOutcome, MergeReport, SubjectPolicy};
