//! File-backed store tests.

use std::fs;

use ic_models::{Attribution, BoundingBox, EntryKey, EntryUpdate, Timestamp};
use ic_store::{Column, EntryStore, SubjectPolicy};
use tempfile::TempDir;

const HEADER: &str = "episode,time,event_boxes,subject_boxes,subject_labels,attribution";

fn ts(seconds: u32, millis: u32) -> Timestamp {
    Timestamp::new(0, 1, seconds, millis)
}

#[test]
fn test_open_missing_file_writes_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("episode1").join("results.csv");

    let outcome = EntryStore::open(&path, SubjectPolicy::AutoCreate).unwrap();
    assert!(!outcome.reset);
    assert!(outcome.store.is_empty());
    assert_eq!(fs::read_to_string(&path).unwrap().trim_end(), HEADER);
}

#[test]
fn test_corrupt_header_is_reset() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    fs::write(&path, "foo,bar\n1,2\n").unwrap();

    let outcome = EntryStore::open(&path, SubjectPolicy::AutoCreate).unwrap();
    assert!(outcome.reset);
    assert!(outcome.store.is_empty());
    assert_eq!(fs::read_to_string(&path).unwrap().trim_end(), HEADER);
}

#[test]
fn test_mutations_write_through() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");

    let mut store = EntryStore::open(&path, SubjectPolicy::AutoCreate)
        .unwrap()
        .store;
    store
        .upsert_event(7, ts(2, 500), vec![BoundingBox::new(10.0, 10.0, 20.0, 20.0)])
        .unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(
        text,
        format!("{HEADER}\n7,00:01:02.500,\"[(10, 10, 20, 20)]\",,,\n")
    );

    // A second process picks the file up where the first left it.
    let mut next_phase = EntryStore::open(&path, SubjectPolicy::Reject).unwrap().store;
    next_phase
        .upsert_subjects(
            7,
            ts(2, 500),
            vec![BoundingBox::new(12.0, 12.0, 18.0, 18.0)],
            vec!["alice".to_string()],
        )
        .unwrap();

    let reloaded = EntryStore::open(&path, SubjectPolicy::Reject).unwrap().store;
    let entry = reloaded.get(7, ts(2, 500)).unwrap();
    assert_eq!(
        entry.event_boxes,
        Some(vec![BoundingBox::new(10.0, 10.0, 20.0, 20.0)])
    );
    assert_eq!(entry.subject_labels, Some(vec!["alice".to_string()]));
}

#[test]
fn test_failed_validation_does_not_touch_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    let mut store = EntryStore::open(&path, SubjectPolicy::AutoCreate)
        .unwrap()
        .store;
    store
        .upsert_event(1, ts(0, 0), vec![BoundingBox::new(0.0, 0.0, 1.0, 1.0)])
        .unwrap();
    let before = fs::read_to_string(&path).unwrap();

    let result = store.upsert_subjects(
        1,
        ts(0, 0),
        vec![],
        vec!["ghost".to_string()],
    );
    assert!(result.is_err());
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn test_export_import_roundtrip_keeps_order() {
    let mut store = EntryStore::in_memory(SubjectPolicy::AutoCreate);
    store
        .bulk_merge([
            EntryUpdate::new(EntryKey::new(2, ts(9, 1)))
                .with_event_boxes(vec![BoundingBox::new(0.125, 0.25, 0.5, 0.75)])
                .with_subjects(
                    vec![
                        BoundingBox::new(0.1, 0.1, 0.2, 0.2),
                        BoundingBox::new(0.3, 0.3, 0.4, 0.4),
                    ],
                    vec!["unknown".to_string(), "jae-suk".to_string()],
                )
                .with_attribution(Attribution::Subject("jae-suk".to_string())),
            EntryUpdate::new(EntryKey::new(1, ts(3, 0))).with_event_boxes(vec![]),
            EntryUpdate::new(EntryKey::new(1, ts(4, 0)))
                .with_event_boxes(vec![BoundingBox::new(1.0, 1.0, 2.0, 2.0)])
                .with_subjects(vec![], vec![])
                .with_attribution(Attribution::NoSubjectFound),
        ])
        .unwrap();

    let mut buf = Vec::new();
    store.export(&mut buf).unwrap();
    let outcome = EntryStore::import(buf.as_slice(), SubjectPolicy::AutoCreate).unwrap();

    assert!(!outcome.reset);
    assert_eq!(outcome.skipped_rows, 0);
    assert_eq!(outcome.store.all_entries(), store.all_entries());
    assert_eq!(
        outcome.store.column(Column::Episode),
        vec!["2", "1", "1"]
    );
}

#[test]
fn test_save_to_leaves_backing_unchanged() {
    let dir = TempDir::new().unwrap();
    let backing = dir.path().join("results.csv");
    let copy = dir.path().join("export").join("phase1_results.csv");

    let mut store = EntryStore::open(&backing, SubjectPolicy::AutoCreate)
        .unwrap()
        .store;
    store
        .upsert_event(3, ts(1, 0), vec![BoundingBox::new(0.0, 0.0, 4.0, 4.0)])
        .unwrap();
    store.save_to(&copy).unwrap();

    assert_eq!(store.path(), Some(backing.as_path()));
    assert_eq!(
        fs::read_to_string(&copy).unwrap(),
        fs::read_to_string(&backing).unwrap()
    );
}
