//! Phase 2: face identification.

use ic_models::{EntryKey, IdentifiedSubject};
use tracing::Instrument;

use crate::error::WorkerResult;
use crate::phases::{EpisodeContext, Phase, PhaseSummary};
use crate::providers::SubjectIdentifier;

/// Identify the faces in every frame that has skulls.
///
/// A frame that cannot be identified, or whose result is rejected by the
/// results table, is reported and skipped; the other frames still go in.
pub async fn identify(
    ctx: &EpisodeContext<'_>,
    identifier: &dyn SubjectIdentifier,
) -> WorkerResult<PhaseSummary> {
    let logger = ctx.logger(Phase::Identify);
    let span = logger.create_span();

    async move {
        logger.log_start(&format!("identifying faces using {}", identifier.name()));

        let mut store = ctx.open_store(&logger)?;
        let keys: Vec<EntryKey> = store
            .all_entries()
            .iter()
            .filter(|e| e.key.episode == ctx.episode && e.has_events())
            .map(|e| e.key)
            .collect();
        logger.log_progress(&format!("{} frames with skulls to process", keys.len()));

        let mut summary = PhaseSummary::default();
        for key in keys {
            let faces = match identifier.identify(&key).await {
                Ok(faces) => faces,
                Err(e) if e.is_entry_scoped() => {
                    logger.log_warning(&format!("skipping {key}: {e}"));
                    summary.failed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let (boxes, labels): (Vec<_>, Vec<_>) = faces
                .into_iter()
                .map(|IdentifiedSubject { label, bbox }| (bbox, label))
                .unzip();

            match store.upsert_subjects(key.episode, key.time, boxes, labels) {
                Ok(merged) => {
                    summary.created += merged.created;
                    summary.updated += merged.updated;
                }
                Err(e) if e.is_validation() => {
                    logger.log_warning(&format!("rejected faces for {key}: {e}"));
                    summary.failed += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if ctx.config.phase2.upload_results {
            summary.uploaded = Some(ctx.upload_results(Phase::Identify, &ctx.results_path()).await?);
        }

        logger.log_completion(&format!(
            "{} entries updated, {} failed",
            summary.updated, summary.failed
        ));
        Ok(summary)
    }
    .instrument(span)
    .await
}
