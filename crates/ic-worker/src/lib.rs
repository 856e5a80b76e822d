//! Phase runner for the skull attribution pipeline.
//!
//! This crate provides:
//! - Typed configuration loaded from TOML and environment
//! - Logging setup and structured per-phase logging
//! - Collaborator traits and local implementations of them
//! - The detection, identification and attribution phases

pub mod config;
pub mod error;
pub mod fs_utils;
pub mod local;
pub mod logging;
pub mod phases;
pub mod providers;
pub mod retry;

pub use config::{LogConfig, LogFormat, PipelineConfig};
pub use error::{WorkerError, WorkerResult};
pub use logging::PhaseLogger;
pub use phases::{attribute, detect, identify, EpisodeContext, Phase, PhaseSummary};
pub use providers::{EventDetector, FrameEvents, RemoteStorage, ResultsSink, SubjectIdentifier};
pub use retry::{retry_async, RetryConfig, RetryResult};
