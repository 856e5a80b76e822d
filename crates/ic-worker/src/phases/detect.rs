//! Phase 1: skull detection.

use ic_models::{EntryKey, EntryUpdate};
use tracing::Instrument;

use crate::error::{WorkerError, WorkerResult};
use crate::phases::{EpisodeContext, Phase, PhaseSummary};
use crate::providers::EventDetector;
use crate::retry::retry_async;

/// Detect skulls in the episode and record them in the results table.
///
/// When the episode file is not available locally it is downloaded from
/// `episodes/<file name>` in remote storage first. An episode without any
/// skulls completes with nothing recorded.
pub async fn detect(
    ctx: &EpisodeContext<'_>,
    detector: &dyn EventDetector,
) -> WorkerResult<PhaseSummary> {
    let logger = ctx.logger(Phase::Detect);
    let span = logger.create_span();

    async move {
        logger.log_start(&format!(
            "finding frames with skulls in {} using {}",
            ctx.episode_file.display(),
            detector.name()
        ));

        let video = ensure_local_episode(ctx).await?;
        let frames = detector.detect_events(ctx.episode, &video).await?;
        logger.log_progress(&format!("{} frames with skulls", frames.len()));

        let mut store = ctx.open_store(&logger)?;
        let merged = store.bulk_merge(frames.into_iter().map(|frame| {
            EntryUpdate::new(EntryKey::new(ctx.episode, frame.time)).with_event_boxes(frame.boxes)
        }))?;

        let mut summary = PhaseSummary {
            created: merged.created,
            updated: merged.updated,
            ..Default::default()
        };

        if ctx.config.phase1.upload_results {
            summary.uploaded = Some(ctx.upload_results(Phase::Detect, &ctx.results_path()).await?);
        }

        logger.log_completion(&format!(
            "{} entries created, {} updated",
            summary.created, summary.updated
        ));
        Ok(summary)
    }
    .instrument(span)
    .await
}

async fn ensure_local_episode(ctx: &EpisodeContext<'_>) -> WorkerResult<std::path::PathBuf> {
    if ctx.episode_file.exists() {
        return Ok(ctx.episode_file.clone());
    }

    let file_name = ctx
        .episode_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            WorkerError::config_error(format!(
                "episode file {} has no file name",
                ctx.episode_file.display()
            ))
        })?;
    let remote = format!("episodes/{file_name}");
    let local = ctx.config.episode_dir(ctx.episode).join(&file_name);
    let retry = ctx.config.retry_config("episode_download");

    retry_async(&retry, WorkerError::is_retryable, || {
        ctx.storage.download(&remote, &local)
    })
    .await
    .map_failure(|e, attempts| {
        WorkerError::transfer_failed(format!(
            "download of {remote} failed after {attempts} attempts: {e}"
        ))
    })?;

    Ok(local)
}
