//! Store-wide attribution.
//!
//! [`reconcile`] reads every entry and estimates its attribution without
//! modifying anything; [`apply`] merges the results back as a single
//! rewrite that touches only the attribution column. Running both twice on
//! an unchanged store produces the same column.

use ic_models::{Attribution, EntryKey, EntryUpdate, Timestamp};
use ic_store::{EntryStore, MergeReport, StoreResult};
use serde::{Serialize, Serializer};
use tracing::{info, warn};

use crate::estimator::{estimate_entry, EstimateError};

/// Reconciliation behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Attribute entries without event boxes as
    /// [`Attribution::NoEventFound`] instead of skipping them.
    pub mark_missing_events: bool,
}

/// Attribution derived for one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub key: EntryKey,
    pub attribution: Attribution,
    pub distance: Option<f64>,
}

/// Everything a reconciliation pass produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Attributions in store order.
    pub attributions: Vec<Reconciled>,
    /// Entries without event boxes that were left alone.
    pub skipped: usize,
    /// Entries whose fields could not be estimated.
    pub failures: Vec<(EntryKey, EstimateError)>,
}

/// Estimate the attribution of every entry in the store.
///
/// One malformed entry is logged and reported; it does not stop the rest
/// of the batch.
pub fn reconcile(store: &EntryStore, options: ReconcileOptions) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for entry in store.all_entries() {
        match estimate_entry(entry) {
            Ok(Some(estimate)) => {
                info!(
                    key = %entry.key,
                    attribution = %estimate.attribution,
                    distance = ?estimate.distance,
                    "Estimated attribution"
                );
                report.attributions.push(Reconciled {
                    key: entry.key,
                    attribution: estimate.attribution,
                    distance: estimate.distance,
                });
            }
            Ok(None) if options.mark_missing_events => {
                report.attributions.push(Reconciled {
                    key: entry.key,
                    attribution: Attribution::NoEventFound,
                    distance: None,
                });
            }
            Ok(None) => {
                report.skipped += 1;
            }
            Err(e) => {
                warn!(key = %entry.key, error = %e, "Unable to estimate attribution");
                report.failures.push((entry.key, e));
            }
        }
    }

    report
}

/// Write attributions back, leaving every other field untouched.
pub fn apply(store: &mut EntryStore, attributions: &[Reconciled]) -> StoreResult<MergeReport> {
    store.bulk_merge(
        attributions
            .iter()
            .map(|r| EntryUpdate::new(r.key).with_attribution(r.attribution.clone())),
    )
}

/// [`reconcile`] followed by [`apply`].
pub fn reconcile_store(
    store: &mut EntryStore,
    options: ReconcileOptions,
) -> StoreResult<ReconcileReport> {
    let report = reconcile(store, options);
    let merged = apply(store, &report.attributions)?;
    info!(
        attributed = merged.updated,
        skipped = report.skipped,
        failed = report.failures.len(),
        "Attribution column updated"
    );
    Ok(report)
}

/// Row of the final `(episode, time, attribution)` projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionRow {
    pub episode: u32,
    #[serde(serialize_with = "serialize_display")]
    pub time: Timestamp,
    #[serde(serialize_with = "serialize_attribution")]
    pub attribution: Option<Attribution>,
}

impl AttributionRow {
    /// Column names of the projection.
    pub const COLUMNS: [&'static str; 3] = ["episode", "time", "attribution"];
}

fn serialize_display<S: Serializer>(value: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

fn serialize_attribution<S: Serializer>(
    value: &Option<Attribution>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_ref().map(Attribution::as_str).unwrap_or(""))
}

/// Project the store onto `(episode, time, attribution)`, in store order.
pub fn project(store: &EntryStore) -> Vec<AttributionRow> {
    store
        .all_entries()
        .iter()
        .map(|e| AttributionRow {
            episode: e.key.episode,
            time: e.key.time,
            attribution: e.attribution.clone(),
        })
        .collect()
}
