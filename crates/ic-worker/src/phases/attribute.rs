//! Phase 3: attribution and export.

use ic_attribution::{project, reconcile_store, AttributionRow, ReconcileOptions};
use tracing::Instrument;

use crate::error::{WorkerError, WorkerResult};
use crate::phases::{EpisodeContext, Phase, PhaseSummary};
use crate::providers::ResultsSink;
use crate::retry::retry_async;

/// Attribute every skull to the nearest face and publish the results.
///
/// The attribution column is rewritten in one pass, the
/// `(episode, time, attribution)` projection goes to the sink, and the
/// final table is optionally copied to the export path and uploaded.
pub async fn attribute(
    ctx: &EpisodeContext<'_>,
    sink: &dyn ResultsSink,
) -> WorkerResult<PhaseSummary> {
    let logger = ctx.logger(Phase::Attribute);
    let span = logger.create_span();
    let phase3 = &ctx.config.phase3;

    async move {
        logger.log_start("estimating attributions");

        let mut store = ctx.open_store(&logger)?;
        let options = ReconcileOptions {
            mark_missing_events: phase3.mark_missing_events,
        };
        let report = reconcile_store(&mut store, options)?;
        for (key, e) in &report.failures {
            logger.log_warning(&format!("could not attribute {key}: {e}"));
        }

        let mut summary = PhaseSummary {
            updated: report.attributions.len(),
            failed: report.failures.len(),
            ..Default::default()
        };

        let rows = project(&store);
        let retry = ctx.config.retry_config("bulk_insert");
        summary.inserted = retry_async(&retry, WorkerError::is_retryable, || {
            sink.bulk_insert(&phase3.table, &AttributionRow::COLUMNS, &rows)
        })
        .await
        .map_failure(|e, attempts| {
            WorkerError::sink_failed(format!(
                "insert into {} failed after {attempts} attempts: {e}",
                phase3.table
            ))
        })?;
        logger.log_progress(&format!("{} rows inserted into {}", summary.inserted, phase3.table));

        if let Some(export_path) = &phase3.export_path {
            store.save_to(export_path)?;
            logger.log_progress(&format!("results exported to {}", export_path.display()));
        }

        if phase3.upload_results {
            summary.uploaded =
                Some(ctx.upload_results(Phase::Attribute, &ctx.results_path()).await?);
        }

        logger.log_completion(&format!(
            "{} entries attributed, {} skipped, {} failed",
            summary.updated, report.skipped, summary.failed
        ));
        Ok(summary)
    }
    .instrument(span)
    .await
}
