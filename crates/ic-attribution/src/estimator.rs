//! Nearest-subject estimation for a single frame.
//!
//! The skull position is the centroid of all event boxes in the frame. Each
//! identified subject is scored by the distance from the center of its face
//! box to that centroid, and the closest subject wins.
//!
//! Exact ties prefer a named subject over [`UNKNOWN_LABEL`]; otherwise the
//! subject listed first keeps the win.

use ic_models::{center, centroid, distance, Attribution, BoundingBox, Entry, UNKNOWN_LABEL};
use thiserror::Error;
use tracing::debug;

/// Result type for estimation.
pub type EstimateResult<T> = Result<T, EstimateError>;

/// Estimation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EstimateError {
    #[error("{boxes} subject boxes but {labels} subject labels")]
    LengthMismatch { boxes: usize, labels: usize },
}

/// Outcome of estimation for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub attribution: Attribution,
    /// Distance from the winning subject to the skull centroid. `None` for
    /// [`Attribution::NoSubjectFound`].
    pub distance: Option<f64>,
}

/// Attribute the skull events of one frame to the nearest subject.
///
/// Returns `Ok(None)` when there are no event boxes, since there is nothing
/// to attribute. Fails only when subject boxes and labels differ in length.
pub fn estimate(
    event_boxes: &[BoundingBox],
    subject_boxes: &[BoundingBox],
    subject_labels: &[String],
) -> EstimateResult<Option<Estimate>> {
    if subject_boxes.len() != subject_labels.len() {
        return Err(EstimateError::LengthMismatch {
            boxes: subject_boxes.len(),
            labels: subject_labels.len(),
        });
    }

    let Some(skull) = centroid(event_boxes) else {
        return Ok(None);
    };

    let mut best: Option<(&str, f64)> = None;
    for (label, bbox) in subject_labels.iter().map(String::as_str).zip(subject_boxes) {
        let d = distance(center(bbox), skull);
        best = match best {
            None => Some((label, d)),
            Some((_, best_d)) if d < best_d => Some((label, d)),
            Some((best_label, best_d))
                if d == best_d && best_label == UNKNOWN_LABEL && label != UNKNOWN_LABEL =>
            {
                debug!(
                    kept = %label,
                    discarded = %best_label,
                    distance = d,
                    "Subjects are equally close to the skull centroid"
                );
                Some((label, d))
            }
            keep => keep,
        };
    }

    Ok(Some(match best {
        Some((label, d)) => Estimate {
            attribution: Attribution::Subject(label.to_string()),
            distance: Some(d),
        },
        None => Estimate {
            attribution: Attribution::NoSubjectFound,
            distance: None,
        },
    }))
}

/// [`estimate`] over an entry's fields, absent fields counting as empty.
pub fn estimate_entry(entry: &Entry) -> EstimateResult<Option<Estimate>> {
    estimate(
        entry.event_boxes.as_deref().unwrap_or_default(),
        entry.subject_boxes.as_deref().unwrap_or_default(),
        entry.subject_labels.as_deref().unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_nearest_subject_wins() {
        let result = estimate(
            &[BoundingBox::new(0.0, 0.0, 10.0, 10.0)],
            &[
                BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                BoundingBox::new(100.0, 100.0, 110.0, 110.0),
            ],
            &labels(&["alice", "bob"]),
        )
        .unwrap()
        .unwrap();

        assert_eq!(result.attribution, Attribution::Subject("alice".into()));
        assert_eq!(result.distance, Some(0.0));
    }

    #[test]
    fn test_centroid_of_multiple_skulls() {
        // Skull centers (5, 5) and (25, 5) average to (15, 5).
        let result = estimate(
            &[
                BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                BoundingBox::new(0.0, 20.0, 10.0, 30.0),
            ],
            &[
                BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                BoundingBox::new(0.0, 12.0, 10.0, 18.0),
            ],
            &labels(&["alice", "bob"]),
        )
        .unwrap()
        .unwrap();

        assert_eq!(result.attribution, Attribution::Subject("bob".into()));
        assert_eq!(result.distance, Some(0.0));
    }

    #[test]
    fn test_no_subjects_is_sentinel() {
        let result = estimate(&[BoundingBox::new(0.0, 0.0, 10.0, 10.0)], &[], &[])
            .unwrap()
            .unwrap();
        assert_eq!(result.attribution, Attribution::NoSubjectFound);
        assert_eq!(result.distance, None);
    }

    #[test]
    fn test_no_events_is_none() {
        let result = estimate(
            &[],
            &[BoundingBox::new(0.0, 0.0, 10.0, 10.0)],
            &labels(&["alice"]),
        )
        .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_length_mismatch() {
        let err = estimate(
            &[BoundingBox::new(0.0, 0.0, 10.0, 10.0)],
            &[BoundingBox::new(0.0, 0.0, 10.0, 10.0)],
            &labels(&["alice", "bob"]),
        )
        .unwrap_err();
        assert_eq!(err, EstimateError::LengthMismatch { boxes: 1, labels: 2 });
    }

    #[test]
    fn test_tie_prefers_named_over_unknown() {
        let skull = [BoundingBox::new(0.0, 0.0, 10.0, 10.0)];
        // Both faces are 10 units from the skull center (5, 5).
        let faces = [
            BoundingBox::new(0.0, 10.0, 10.0, 20.0),
            BoundingBox::new(0.0, -10.0, 10.0, 0.0),
        ];

        let unknown_first = estimate(&skull, &faces, &labels(&["unknown", "carol"]))
            .unwrap()
            .unwrap();
        assert_eq!(unknown_first.attribution, Attribution::Subject("carol".into()));

        let carol_first = estimate(&skull, &faces, &labels(&["carol", "unknown"]))
            .unwrap()
            .unwrap();
        assert_eq!(carol_first.attribution, Attribution::Subject("carol".into()));
    }

    #[test]
    fn test_tie_between_named_keeps_first() {
        let skull = [BoundingBox::new(0.0, 0.0, 10.0, 10.0)];
        let faces = [
            BoundingBox::new(0.0, 10.0, 10.0, 20.0),
            BoundingBox::new(0.0, -10.0, 10.0, 0.0),
        ];

        let result = estimate(&skull, &faces, &labels(&["dave", "erin"]))
            .unwrap()
            .unwrap();
        assert_eq!(result.attribution, Attribution::Subject("dave".into()));
    }

    #[test]
    fn test_tie_between_unknowns_keeps_first() {
        let skull = [BoundingBox::new(0.0, 0.0, 10.0, 10.0)];
        let faces = [
            BoundingBox::new(0.0, 10.0, 10.0, 20.0),
            BoundingBox::new(0.0, -10.0, 10.0, 0.0),
        ];

        let result = estimate(&skull, &faces, &labels(&["unknown", "unknown"]))
            .unwrap()
            .unwrap();
        assert_eq!(result.attribution, Attribution::Subject("unknown".into()));
        assert_eq!(result.distance, Some(10.0));
    }

    #[test]
    fn test_unknown_can_win_when_strictly_closer() {
        let result = estimate(
            &[BoundingBox::new(0.0, 0.0, 10.0, 10.0)],
            &[
                BoundingBox::new(0.0, 1.0, 10.0, 11.0),
                BoundingBox::new(0.0, 50.0, 10.0, 60.0),
            ],
            &labels(&["unknown", "frank"]),
        )
        .unwrap()
        .unwrap();
        assert_eq!(result.attribution, Attribution::Subject("unknown".into()));
    }

    #[test]
    fn test_estimate_entry_absent_fields() {
        use ic_models::{EntryKey, Timestamp};

        let mut entry = Entry::new(EntryKey::new(1, Timestamp::new(0, 0, 1, 0)));
        assert_eq!(estimate_entry(&entry).unwrap(), None);

        entry.event_boxes = Some(vec![BoundingBox::new(0.0, 0.0, 2.0, 2.0)]);
        let result = estimate_entry(&entry).unwrap().unwrap();
        assert_eq!(result.attribution, Attribution::NoSubjectFound);
    }
}
