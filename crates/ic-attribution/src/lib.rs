//! Attribution of skull events to the nearest identified subject.
//!
//! - [`estimator`]: the per-entry nearest-centroid rule
//! - [`reconciler`]: runs the estimator across a whole store and writes
//!   the attribution column back

pub mod estimator;
pub mod reconciler;

pub use estimator::{estimate, estimate_entry, Estimate, EstimateError, EstimateResult};
pub use reconciler::{
    apply, project, reconcile, reconcile_store, AttributionRow, Reconciled, ReconcileOptions,
    ReconcileReport,
};
