//! Pipeline worker binary.
//!
//! Runs one phase, or all three in order, for a single episode file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use ic_worker::local::{
    recording_path, CsvResultsSink, LocalDirStorage, ReplayEventDetector, ReplaySubjectIdentifier,
};
use ic_worker::{attribute, detect, identify, logging, EpisodeContext, Phase, PipelineConfig};

/// Which phases to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PhaseArg {
    Phase1,
    Phase2,
    Phase3,
    All,
}

impl PhaseArg {
    fn phases(self) -> Vec<Phase> {
        match self {
            PhaseArg::Phase1 => vec![Phase::Detect],
            PhaseArg::Phase2 => vec![Phase::Identify],
            PhaseArg::Phase3 => vec![Phase::Attribute],
            PhaseArg::All => Phase::ALL.to_vec(),
        }
    }
}

/// Command-line arguments for ic-worker
#[derive(Parser, Debug)]
#[command(name = "ic-worker")]
#[command(about = "Attributes skull events in episodes to the nearest cast member")]
#[command(version)]
struct Args {
    /// Pipeline configuration file
    #[arg(short, long, default_value = "pipeline.toml", env = "IC_CONFIG")]
    config: PathBuf,

    /// Phase to run
    #[arg(value_enum)]
    phase: PhaseArg,

    /// Episode video file, e.g. episode12.mp4
    episode_file: PathBuf,
}

async fn run(args: Args, config: PipelineConfig) -> Result<()> {
    let phases = args.phase.phases();
    for phase in &phases {
        config.validate_phase(*phase)?;
    }

    let storage = LocalDirStorage::new(&config.pipeline.remote_dir);
    let ctx = EpisodeContext::new(&config, &storage, &args.episode_file)
        .context("Failed to determine episode number")?;
    info!(episode = ctx.episode, file = %ctx.episode_file.display(), "Processing episode");

    for phase in phases {
        let summary = match phase {
            Phase::Detect => {
                let phase1 = &config.phase1;
                let dir = phase1.detections_dir.clone().unwrap_or_default();
                let detector =
                    ReplayEventDetector::new(dir, &phase1.tag, phase1.confidence_threshold);
                detect(&ctx, &detector).await
            }
            Phase::Identify => {
                let dir = config.phase2.identities_dir.clone().unwrap_or_default();
                let identifier =
                    ReplaySubjectIdentifier::load(&recording_path(&dir, ctx.episode)).await?;
                identify(&ctx, &identifier).await
            }
            Phase::Attribute => {
                let sink = CsvResultsSink::new(&config.phase3.table_dir);
                attribute(&ctx, &sink).await
            }
        }
        .inspect_err(|e| ctx.logger(phase).log_error(&e.to_string()))
        .with_context(|| format!("{phase} failed"))?;

        info!(
            phase = %phase,
            created = summary.created,
            updated = summary.updated,
            failed = summary.failed,
            inserted = summary.inserted,
            "Phase finished"
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = PipelineConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    if let Some(path) = logging::init(&config.log)? {
        info!(path = %path.display(), "Logging to file");
    }
    info!("Starting ic-worker");

    if let Err(e) = run(args, config).await {
        error!("{:#}", e);
        return Err(e);
    }

    info!("Worker finished");
    Ok(())
}
