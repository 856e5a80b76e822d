//! The results table.
//!
//! [`EntryStore`] holds one [`Entry`] per `(episode, time)` identity in
//! insertion order. Updates are merges: fields an update does not carry keep
//! their previous values. A file-backed store rewrites its file atomically
//! after every successful mutation, because the phases that share it run as
//! separate processes.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use ic_models::{Attribution, BoundingBox, Entry, EntryKey, EntryUpdate, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::codec::{self, Column};
use crate::error::{StoreError, StoreResult};

/// What to do with subject results for an identity that has no entry yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectPolicy {
    /// Create the entry with no event boxes.
    #[default]
    AutoCreate,
    /// Fail with [`StoreError::EntryNotFound`].
    Reject,
}

/// Counts of entries touched by a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub created: usize,
    pub updated: usize,
}

/// A store loaded from a file or reader.
#[derive(Debug)]
pub struct ImportOutcome {
    pub store: EntryStore,
    /// The source header did not match and the store starts empty.
    pub reset: bool,
    /// Rows dropped because they could not be parsed.
    pub skipped_rows: usize,
}

/// In-memory results table with optional write-through persistence.
#[derive(Debug, Clone)]
pub struct EntryStore {
    entries: Vec<Entry>,
    index: HashMap<EntryKey, usize>,
    backing: Option<PathBuf>,
    policy: SubjectPolicy,
}

impl EntryStore {
    /// Create an empty store with no backing file.
    pub fn in_memory(policy: SubjectPolicy) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            backing: None,
            policy,
        }
    }

    fn from_entries(entries: Vec<Entry>, policy: SubjectPolicy) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key, i))
            .collect();
        Self {
            entries,
            index,
            backing: None,
            policy,
        }
    }

    /// Open a file-backed store.
    ///
    /// A missing file is created with just the header. A file whose header
    /// does not match the schema is discarded and rewritten with a fresh
    /// header; this is reported through [`ImportOutcome::reset`].
    pub fn open(path: impl AsRef<Path>, policy: SubjectPolicy) -> StoreResult<ImportOutcome> {
        let path = path.as_ref();

        let mut outcome = if path.exists() {
            let file = File::open(path)?;
            Self::import(BufReader::new(file), policy)?
        } else {
            info!(path = %path.display(), "Results file does not exist, creating it");
            ImportOutcome {
                store: Self::in_memory(policy),
                reset: false,
                skipped_rows: 0,
            }
        };

        outcome.store.backing = Some(path.to_path_buf());
        if outcome.reset {
            warn!(path = %path.display(), "Invalid headers, results file will be overwritten");
        }
        if outcome.reset || !path.exists() {
            outcome.store.persist()?;
        }
        Ok(outcome)
    }

    /// Load a store from any reader. The result has no backing file.
    pub fn import<R: Read>(source: R, policy: SubjectPolicy) -> StoreResult<ImportOutcome> {
        let imported = codec::import(source)?;
        if imported.skipped_rows > 0 {
            warn!(
                skipped_rows = imported.skipped_rows,
                "Some rows of the results file could not be read and were dropped"
            );
        }
        Ok(ImportOutcome {
            store: Self::from_entries(imported.entries, policy),
            reset: !imported.header_valid,
            skipped_rows: imported.skipped_rows,
        })
    }

    /// Write the header and all rows, in store order.
    pub fn export<W: Write>(&self, sink: W) -> StoreResult<usize> {
        codec::export(&self.entries, sink)
    }

    /// Atomically write the store to `path` without changing its backing.
    pub fn save_to(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        write_atomic(path, |w| self.export(w).map(|_| ()))?;
        info!(path = %path.display(), rows = self.entries.len(), "Results have been saved");
        Ok(())
    }

    /// Rewrite the backing file, if any.
    pub fn persist(&self) -> StoreResult<()> {
        match &self.backing {
            Some(path) => write_atomic(path, |w| self.export(w).map(|_| ())),
            None => Ok(()),
        }
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.backing.as_deref()
    }

    pub fn policy(&self) -> SubjectPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry. A missing identity is `None`, not an error.
    pub fn get(&self, episode: u32, time: Timestamp) -> Option<&Entry> {
        self.get_key(&EntryKey::new(episode, time))
    }

    pub fn get_key(&self, key: &EntryKey) -> Option<&Entry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    /// All entries in insertion (or file) order. Not sorted by key.
    pub fn all_entries(&self) -> &[Entry] {
        &self.entries
    }

    /// One column rendered as cell text, in store order.
    pub fn column(&self, column: Column) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| codec::render_cell(e, column))
            .collect()
    }

    /// Record event boxes for a frame, creating the entry if needed.
    ///
    /// Only the event-boxes field is replaced.
    pub fn upsert_event(
        &mut self,
        episode: u32,
        time: Timestamp,
        event_boxes: Vec<BoundingBox>,
    ) -> StoreResult<MergeReport> {
        let key = EntryKey::new(episode, time);
        self.bulk_merge([EntryUpdate::new(key).with_event_boxes(event_boxes)])
    }

    /// Record identified subjects for a frame.
    ///
    /// Fails with a validation error when the box and label counts differ.
    /// A missing entry is handled per the store's [`SubjectPolicy`].
    pub fn upsert_subjects(
        &mut self,
        episode: u32,
        time: Timestamp,
        subject_boxes: Vec<BoundingBox>,
        subject_labels: Vec<String>,
    ) -> StoreResult<MergeReport> {
        let key = EntryKey::new(episode, time);
        self.bulk_merge([EntryUpdate::new(key).with_subjects(subject_boxes, subject_labels)])
    }

    /// Set the derived attribution of an existing entry.
    pub fn set_attribution(
        &mut self,
        key: EntryKey,
        attribution: Attribution,
    ) -> StoreResult<MergeReport> {
        self.bulk_merge([EntryUpdate::new(key).with_attribution(attribution)])
    }

    /// Apply many sparse updates with a single rewrite.
    ///
    /// Every update is validated before anything changes; if one fails, the
    /// store is left exactly as it was. Entries no update refers to are
    /// untouched. Re-running the same batch yields the same store.
    pub fn bulk_merge<I>(&mut self, updates: I) -> StoreResult<MergeReport>
    where
        I: IntoIterator<Item = EntryUpdate>,
    {
        let staged = self.stage(updates)?;
        if staged.is_empty() {
            return Ok(MergeReport::default());
        }
        self.commit(staged)
    }

    /// Compute the merged entries without touching the store.
    fn stage<I>(&self, updates: I) -> StoreResult<Vec<Entry>>
    where
        I: IntoIterator<Item = EntryUpdate>,
    {
        let mut staged: Vec<Entry> = Vec::new();
        let mut staged_index: HashMap<EntryKey, usize> = HashMap::new();

        for update in updates {
            for label in update.labels() {
                codec::check_label(label)?;
            }
            if let Some(label) = update.attribution.as_ref().and_then(Attribution::label) {
                codec::check_label(label)?;
            }
            for bbox in update.boxes() {
                bbox.check_finite()?;
            }

            let base = match staged_index.get(&update.key) {
                Some(&i) => staged[i].clone(),
                None => match self.get_key(&update.key) {
                    Some(existing) => existing.clone(),
                    None if self.may_create(&update) => Entry::new(update.key),
                    None => return Err(StoreError::EntryNotFound(update.key)),
                },
            };

            let merged = base.merged(&update)?;
            match staged_index.get(&update.key) {
                Some(&i) => staged[i] = merged,
                None => {
                    staged_index.insert(update.key, staged.len());
                    staged.push(merged);
                }
            }
        }

        Ok(staged)
    }

    /// Event results always create entries; subject results only under
    /// [`SubjectPolicy::AutoCreate`]; an attribution never does.
    fn may_create(&self, update: &EntryUpdate) -> bool {
        if update.event_boxes.is_some() {
            return true;
        }
        let carries_subjects = update.subject_boxes.is_some() || update.subject_labels.is_some();
        carries_subjects && self.policy == SubjectPolicy::AutoCreate
    }

    /// Swap staged entries in, persist, and roll back if persisting fails.
    fn commit(&mut self, staged: Vec<Entry>) -> StoreResult<MergeReport> {
        let len_before = self.entries.len();
        let mut replaced: Vec<(usize, Entry)> = Vec::new();
        let mut report = MergeReport::default();

        for entry in staged {
            match self.index.get(&entry.key) {
                Some(&i) => {
                    debug!(key = %entry.key, "Entry was updated");
                    replaced.push((i, std::mem::replace(&mut self.entries[i], entry)));
                    report.updated += 1;
                }
                None => {
                    debug!(key = %entry.key, "Entry was created");
                    self.index.insert(entry.key, self.entries.len());
                    self.entries.push(entry);
                    report.created += 1;
                }
            }
        }

        if let Err(e) = self.persist() {
            for entry in self.entries.drain(len_before..) {
                self.index.remove(&entry.key);
            }
            for (i, previous) in replaced.into_iter().rev() {
                self.entries[i] = previous;
            }
            return Err(e);
        }

        if report.created + report.updated > 1 {
            info!(created = report.created, updated = report.updated, "Merged entries");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ic_models::GeometryError;

    fn t(s: u32) -> Timestamp {
        Timestamp::new(0, 0, s, 0)
    }

    fn bbox(v: f64) -> BoundingBox {
        BoundingBox::new(v, v, v + 1.0, v + 1.0)
    }

    #[test]
    fn test_upsert_event_creates_entry() {
        let mut store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        let report = store.upsert_event(1, t(1), vec![bbox(0.0)]).unwrap();
        assert_eq!(report, MergeReport { created: 1, updated: 0 });

        let entry = store.get(1, t(1)).unwrap();
        assert_eq!(entry.event_boxes, Some(vec![bbox(0.0)]));
        assert_eq!(entry.subject_boxes, None);
        assert_eq!(entry.subject_labels, None);
        assert_eq!(entry.attribution, None);
    }

    #[test]
    fn test_upsert_event_is_idempotent() {
        let mut once = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        once.upsert_event(1, t(1), vec![bbox(0.0)]).unwrap();

        let mut twice = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        twice.upsert_event(1, t(1), vec![bbox(0.0)]).unwrap();
        twice.upsert_event(1, t(1), vec![bbox(0.0)]).unwrap();

        assert_eq!(once.all_entries(), twice.all_entries());
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn test_event_and_subject_fields_are_preserved() {
        let mut store = EntryStore::in_memory(SubjectPolicy::Reject);
        store.upsert_event(1, t(1), vec![bbox(0.0)]).unwrap();
        store
            .upsert_subjects(1, t(1), vec![bbox(5.0)], vec!["alice".into()])
            .unwrap();
        store.upsert_event(1, t(1), vec![bbox(2.0)]).unwrap();

        let entry = store.get(1, t(1)).unwrap();
        assert_eq!(entry.event_boxes, Some(vec![bbox(2.0)]));
        assert_eq!(entry.subject_boxes, Some(vec![bbox(5.0)]));
        assert_eq!(entry.subject_labels, Some(vec!["alice".to_string()]));
    }

    #[test]
    fn test_subjects_auto_create_policy() {
        let mut store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        store
            .upsert_subjects(2, t(3), vec![bbox(1.0)], vec!["bob".into()])
            .unwrap();

        let entry = store.get(2, t(3)).unwrap();
        assert_eq!(entry.event_boxes, None);
        assert_eq!(entry.subject_labels, Some(vec!["bob".to_string()]));

        store.upsert_event(2, t(3), vec![bbox(0.0)]).unwrap();
        let entry = store.get(2, t(3)).unwrap();
        assert!(entry.has_events());
        assert_eq!(entry.subject_labels, Some(vec!["bob".to_string()]));
    }

    #[test]
    fn test_subjects_reject_policy() {
        let mut store = EntryStore::in_memory(SubjectPolicy::Reject);
        let err = store
            .upsert_subjects(2, t(3), vec![bbox(1.0)], vec!["bob".into()])
            .unwrap_err();
        assert!(matches!(err, StoreError::EntryNotFound(k) if k == EntryKey::new(2, t(3))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_length_mismatch_fails_before_mutation() {
        let mut store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        store.upsert_event(1, t(1), vec![bbox(0.0)]).unwrap();
        let before = store.all_entries().to_vec();

        let err = store
            .upsert_subjects(1, t(1), vec![bbox(1.0)], vec!["a".into(), "b".into()])
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.all_entries(), before.as_slice());
    }

    #[test]
    fn test_label_with_quote_is_rejected() {
        let mut store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        let err = store
            .upsert_subjects(1, t(1), vec![bbox(1.0)], vec!["o'neil".into()])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidLabel { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_non_finite_boxes_are_rejected() {
        let mut store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        store.upsert_event(1, t(1), vec![bbox(0.0)]).unwrap();
        let before = store.all_entries().to_vec();

        let err = store
            .upsert_event(1, t(2), vec![BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0)])
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Geometry(GeometryError::NonFinite(_))
        ));
        assert!(err.is_validation());

        let err = store
            .upsert_subjects(
                1,
                t(1),
                vec![BoundingBox::new(0.0, 0.0, f64::INFINITY, 1.0)],
                vec!["alice".into()],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Geometry(_)));
        assert_eq!(store.all_entries(), before.as_slice());

        let mut buf = Vec::new();
        store.export(&mut buf).unwrap();
        let outcome = EntryStore::import(buf.as_slice(), SubjectPolicy::AutoCreate).unwrap();
        assert_eq!(outcome.store.all_entries(), before.as_slice());
    }

    #[test]
    fn test_unrepresentable_attribution_is_rejected() {
        let mut store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        store.upsert_event(1, t(1), vec![bbox(0.0)]).unwrap();
        let key = EntryKey::new(1, t(1));

        for label in ["", "NO_SUBJECT_FOUND"] {
            let err = store
                .set_attribution(key, Attribution::Subject(label.into()))
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidLabel { .. }));
        }
        assert_eq!(store.get_key(&key).unwrap().attribution, None);
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        assert!(store.get(9, t(9)).is_none());
    }

    #[test]
    fn test_set_attribution_requires_entry() {
        let mut store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        let key = EntryKey::new(1, t(1));
        assert!(matches!(
            store.set_attribution(key, Attribution::NoSubjectFound),
            Err(StoreError::EntryNotFound(_))
        ));

        store.upsert_event(1, t(1), vec![bbox(0.0)]).unwrap();
        store.set_attribution(key, Attribution::NoSubjectFound).unwrap();
        let entry = store.get_key(&key).unwrap();
        assert_eq!(entry.attribution, Some(Attribution::NoSubjectFound));
        assert_eq!(entry.event_boxes, Some(vec![bbox(0.0)]));
    }

    #[test]
    fn test_all_entries_keeps_insertion_order() {
        let mut store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        store.upsert_event(2, t(5), vec![]).unwrap();
        store.upsert_event(1, t(9), vec![]).unwrap();
        store.upsert_event(1, t(1), vec![]).unwrap();
        store.upsert_event(2, t(5), vec![bbox(1.0)]).unwrap();

        let keys: Vec<EntryKey> = store.all_entries().iter().map(|e| e.key).collect();
        assert_eq!(
            keys,
            vec![
                EntryKey::new(2, t(5)),
                EntryKey::new(1, t(9)),
                EntryKey::new(1, t(1))
            ]
        );
    }

    #[test]
    fn test_bulk_merge_leaves_unreferenced_entries_alone() {
        let mut store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        for s in 1..=3 {
            store.upsert_event(1, t(s), vec![bbox(s as f64)]).unwrap();
        }
        let b_before = store.get(1, t(2)).cloned().unwrap();
        let b_row_before = store.column(Column::EventBoxes)[1].clone();

        let report = store
            .bulk_merge([
                EntryUpdate::new(EntryKey::new(1, t(1)))
                    .with_attribution(Attribution::Subject("alice".into())),
                EntryUpdate::new(EntryKey::new(1, t(3)))
                    .with_subjects(vec![bbox(7.0)], vec!["carol".into()]),
            ])
            .unwrap();

        assert_eq!(report, MergeReport { created: 0, updated: 2 });
        assert_eq!(store.get(1, t(2)), Some(&b_before));
        assert_eq!(store.column(Column::EventBoxes)[1], b_row_before);
        assert_eq!(
            store.get(1, t(1)).unwrap().attribution,
            Some(Attribution::Subject("alice".into()))
        );
        assert_eq!(store.get(1, t(3)).unwrap().event_boxes, Some(vec![bbox(3.0)]));
    }

    #[test]
    fn test_bulk_merge_is_all_or_nothing() {
        let mut store = EntryStore::in_memory(SubjectPolicy::Reject);
        store.upsert_event(1, t(1), vec![bbox(0.0)]).unwrap();
        let before = store.all_entries().to_vec();

        let result = store.bulk_merge([
            EntryUpdate::new(EntryKey::new(1, t(1))).with_attribution(Attribution::NoSubjectFound),
            EntryUpdate::new(EntryKey::new(1, t(2))).with_attribution(Attribution::NoSubjectFound),
        ]);

        assert!(matches!(result, Err(StoreError::EntryNotFound(_))));
        assert_eq!(store.all_entries(), before.as_slice());
    }

    #[test]
    fn test_bulk_merge_is_idempotent() {
        let mut store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        store.upsert_event(1, t(1), vec![bbox(0.0)]).unwrap();
        let updates = vec![
            EntryUpdate::new(EntryKey::new(1, t(1)))
                .with_subjects(vec![bbox(1.0)], vec!["dave".into()]),
            EntryUpdate::new(EntryKey::new(1, t(2))).with_event_boxes(vec![bbox(2.0)]),
        ];

        store.bulk_merge(updates.clone()).unwrap();
        let first = store.all_entries().to_vec();
        store.bulk_merge(updates).unwrap();
        assert_eq!(store.all_entries(), first.as_slice());
    }

    #[test]
    fn test_bulk_merge_repeated_key_in_batch() {
        let mut store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        let key = EntryKey::new(1, t(1));
        let report = store
            .bulk_merge([
                EntryUpdate::new(key).with_event_boxes(vec![bbox(0.0)]),
                EntryUpdate::new(key).with_subjects(vec![bbox(1.0)], vec!["erin".into()]),
            ])
            .unwrap();

        assert_eq!(report, MergeReport { created: 1, updated: 0 });
        let entry = store.get_key(&key).unwrap();
        assert!(entry.has_events());
        assert_eq!(entry.subject_labels, Some(vec!["erin".to_string()]));
    }

    #[test]
    fn test_column_extraction() {
        let mut store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
        store.upsert_event(4, t(1), vec![bbox(0.0)]).unwrap();
        store.upsert_event(3, t(2), vec![]).unwrap();

        assert_eq!(store.column(Column::Episode), vec!["4", "3"]);
        assert_eq!(
            store.column(Column::Time),
            vec!["00:00:01.000", "00:00:02.000"]
        );
        assert_eq!(
            store.column(Column::EventBoxes),
            vec!["[(0, 0, 1, 1)]", "[]"]
        );
        assert_eq!(store.column(Column::Attribution), vec!["", ""]);
    }
}
