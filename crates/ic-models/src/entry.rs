//! Results-table entries.
//!
//! An [`Entry`] aggregates everything known about one sampled frame: the
//! event (skull) boxes from the first phase, the identified subjects from
//! the second, and the attribution derived in the last.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::BoundingBox;
use crate::timestamp::Timestamp;

/// Label the identification service assigns to unrecognised faces.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Result type for entry validation.
pub type EntryResult<T> = Result<T, EntryError>;

/// Entry validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("{key}: {boxes} subject boxes but {labels} subject labels")]
    SubjectLengthMismatch {
        key: EntryKey,
        boxes: usize,
        labels: usize,
    },
}

/// Primary key of an entry: episode number plus frame timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub episode: u32,
    pub time: Timestamp,
}

impl EntryKey {
    pub fn new(episode: u32, time: Timestamp) -> Self {
        Self { episode, time }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} @ ep{}]", self.time, self.episode)
    }
}

/// Derived attribution for an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Attribution {
    /// The subject judged closest to the event.
    Subject(String),
    /// Events were detected but nobody was identified in the frame.
    NoSubjectFound,
    /// No event boxes were recorded for the frame.
    NoEventFound,
}

impl Attribution {
    pub const NO_SUBJECT_FOUND: &'static str = "NO_SUBJECT_FOUND";
    pub const NO_EVENT_FOUND: &'static str = "NO_EVENT_FOUND";

    /// Textual form stored in the results table.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Subject(label) => label,
            Self::NoSubjectFound => Self::NO_SUBJECT_FOUND,
            Self::NoEventFound => Self::NO_EVENT_FOUND,
        }
    }

    /// Parse a stored cell. An empty cell means "not attributed yet".
    pub fn from_cell(cell: &str) -> Option<Self> {
        match cell {
            "" => None,
            Self::NO_SUBJECT_FOUND => Some(Self::NoSubjectFound),
            Self::NO_EVENT_FOUND => Some(Self::NoEventFound),
            label => Some(Self::Subject(label.to_string())),
        }
    }

    /// The attributed label, if this is a concrete subject.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Subject(label) => Some(label),
            _ => None,
        }
    }
}

impl fmt::Display for Attribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Attribution {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_cell(&value).ok_or_else(|| "attribution cannot be empty".to_string())
    }
}

impl From<Attribution> for String {
    fn from(value: Attribution) -> Self {
        value.as_str().to_string()
    }
}

/// A face recognised by the identification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifiedSubject {
    pub label: String,
    pub bbox: BoundingBox,
}

impl IdentifiedSubject {
    pub fn new(label: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            bbox,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}

/// One row of the results table.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: EntryKey,
    pub event_boxes: Option<Vec<BoundingBox>>,
    pub subject_boxes: Option<Vec<BoundingBox>>,
    pub subject_labels: Option<Vec<String>>,
    pub attribution: Option<Attribution>,
}

impl Entry {
    /// Create an entry with every value field absent.
    pub fn new(key: EntryKey) -> Self {
        Self {
            key,
            event_boxes: None,
            subject_boxes: None,
            subject_labels: None,
            attribution: None,
        }
    }

    /// Whether at least one event box was recorded.
    pub fn has_events(&self) -> bool {
        self.event_boxes.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// Check that subject boxes and labels line up when both are present.
    pub fn check_subjects(&self) -> EntryResult<()> {
        if let (Some(boxes), Some(labels)) = (&self.subject_boxes, &self.subject_labels) {
            if boxes.len() != labels.len() {
                return Err(EntryError::SubjectLengthMismatch {
                    key: self.key,
                    boxes: boxes.len(),
                    labels: labels.len(),
                });
            }
        }
        Ok(())
    }

    /// Produce the entry that results from applying `update`.
    ///
    /// Fields the update leaves as `None` keep their current value. The
    /// merged entry is validated; `self` is never modified.
    pub fn merged(&self, update: &EntryUpdate) -> EntryResult<Self> {
        let mut next = self.clone();
        if let Some(boxes) = &update.event_boxes {
            next.event_boxes = Some(boxes.clone());
        }
        if let Some(boxes) = &update.subject_boxes {
            next.subject_boxes = Some(boxes.clone());
        }
        if let Some(labels) = &update.subject_labels {
            next.subject_labels = Some(labels.clone());
        }
        if let Some(attribution) = &update.attribution {
            next.attribution = Some(attribution.clone());
        }
        next.check_subjects()?;
        Ok(next)
    }
}

/// Sparse update for one entry. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryUpdate {
    pub key: EntryKey,
    pub event_boxes: Option<Vec<BoundingBox>>,
    pub subject_boxes: Option<Vec<BoundingBox>>,
    pub subject_labels: Option<Vec<String>>,
    pub attribution: Option<Attribution>,
}

impl EntryUpdate {
    pub fn new(key: EntryKey) -> Self {
        Self {
            key,
            event_boxes: None,
            subject_boxes: None,
            subject_labels: None,
            attribution: None,
        }
    }

    pub fn with_event_boxes(mut self, boxes: Vec<BoundingBox>) -> Self {
        self.event_boxes = Some(boxes);
        self
    }

    pub fn with_subjects(mut self, boxes: Vec<BoundingBox>, labels: Vec<String>) -> Self {
        self.subject_boxes = Some(boxes);
        self.subject_labels = Some(labels);
        self
    }

    pub fn with_attribution(mut self, attribution: Attribution) -> Self {
        self.attribution = Some(attribution);
        self
    }

    /// Labels carried by this update, if any.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.subject_labels.iter().flatten().map(String::as_str)
    }

    /// Event and subject boxes carried by this update.
    pub fn boxes(&self) -> impl Iterator<Item = &BoundingBox> {
        self.event_boxes
            .iter()
            .chain(self.subject_boxes.iter())
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> EntryKey {
        EntryKey::new(12, Timestamp::new(0, 1, 2, 300))
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key().to_string(), "[00:01:02.300 @ ep12]");
    }

    #[test]
    fn test_attribution_cells() {
        assert_eq!(Attribution::from_cell(""), None);
        assert_eq!(
            Attribution::from_cell("NO_SUBJECT_FOUND"),
            Some(Attribution::NoSubjectFound)
        );
        assert_eq!(
            Attribution::from_cell("NO_EVENT_FOUND"),
            Some(Attribution::NoEventFound)
        );
        assert_eq!(
            Attribution::from_cell("alice"),
            Some(Attribution::Subject("alice".to_string()))
        );
        assert_eq!(Attribution::NoSubjectFound.as_str(), "NO_SUBJECT_FOUND");
        assert_eq!(Attribution::Subject("bob".into()).label(), Some("bob"));
        assert_eq!(Attribution::NoEventFound.label(), None);
    }

    #[test]
    fn test_merge_preserves_untouched_fields() {
        let events = vec![BoundingBox::new(0.0, 0.0, 10.0, 10.0)];
        let entry = Entry::new(key())
            .merged(&EntryUpdate::new(key()).with_event_boxes(events.clone()))
            .unwrap();

        let subjects = vec![BoundingBox::new(1.0, 1.0, 2.0, 2.0)];
        let merged = entry
            .merged(&EntryUpdate::new(key()).with_subjects(subjects.clone(), vec!["alice".into()]))
            .unwrap();

        assert_eq!(merged.event_boxes, Some(events));
        assert_eq!(merged.subject_boxes, Some(subjects));
        assert_eq!(merged.subject_labels, Some(vec!["alice".to_string()]));
        assert_eq!(merged.attribution, None);
    }

    #[test]
    fn test_merge_rejects_length_mismatch() {
        let update = EntryUpdate::new(key()).with_subjects(
            vec![BoundingBox::new(1.0, 1.0, 2.0, 2.0)],
            vec!["alice".into(), "bob".into()],
        );
        let err = Entry::new(key()).merged(&update).unwrap_err();
        assert_eq!(
            err,
            EntryError::SubjectLengthMismatch {
                key: key(),
                boxes: 1,
                labels: 2
            }
        );
    }

    #[test]
    fn test_has_events() {
        let mut entry = Entry::new(key());
        assert!(!entry.has_events());
        entry.event_boxes = Some(vec![]);
        assert!(!entry.has_events());
        entry.event_boxes = Some(vec![BoundingBox::new(0.0, 0.0, 1.0, 1.0)]);
        assert!(entry.has_events());
    }

    #[test]
    fn test_identified_subject_serde() {
        let json = r#"{"label":"unknown","bbox":{"top":1.0,"left":2.0,"bottom":3.0,"right":4.0}}"#;
        let subject: IdentifiedSubject = serde_json::from_str(json).unwrap();
        assert!(subject.is_unknown());
        assert_eq!(subject.bbox, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
    }
}
