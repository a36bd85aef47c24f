use chrono::NaiveDate;
use praxis_core::store::{read_history, DocumentLock, DocumentStore, DOCUMENT_FILE};
use praxis_core::{Practice, PracticeId, StoreError};
use std::time::Duration;

fn sample_practice() -> Practice {
    let mut practice = Practice::new(PracticeId::new(1, 2025), "Client A");
    practice.opened_on = NaiveDate::from_ymd_opt(2025, 3, 1);
    practice.matter = Some("contract dispute".to_string());
    practice
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::new();
    let mut practice = sample_practice();

    let status = store.save(dir.path(), &mut practice, "tester").unwrap();
    assert!(status.is_written());
    assert!(practice.updated_at.is_some());

    let loaded = store.load(dir.path()).unwrap();
    assert_eq!(loaded, practice);
}

#[test]
fn identical_save_is_a_no_op_with_single_history_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::new();
    let mut practice = sample_practice();

    let first = store.save(dir.path(), &mut practice, "tester").unwrap();
    assert!(first.is_written());
    let stamp = practice.updated_at;

    let second = store.save(dir.path(), &mut practice, "tester").unwrap();
    assert!(!second.is_written());
    assert_eq!(practice.updated_at, stamp);

    assert_eq!(read_history(dir.path()).unwrap().len(), 1);
}

#[test]
fn changed_save_appends_history_and_bumps_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::new();
    let mut practice = sample_practice();

    store.save(dir.path(), &mut practice, "tester").unwrap();
    let first_stamp = practice.updated_at;

    practice.notes = Some("called the client".to_string());
    let status = store.save(dir.path(), &mut practice, "tester").unwrap();
    assert!(status.is_written());
    assert_ne!(practice.updated_at, first_stamp);

    let entries = read_history(dir.path()).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[1].before_hash.is_some());
    assert!(entries[1].diff.contains("called the client"));
}

#[test]
fn load_missing_document_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = DocumentStore::new().load(dir.path()).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn load_unparsable_document_is_corrupt_not_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(DOCUMENT_FILE), "{ not json").unwrap();

    let err = DocumentStore::new().load(dir.path()).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));
}

#[test]
fn save_refuses_to_clobber_corrupt_document() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(DOCUMENT_FILE), "{ not json").unwrap();

    let mut practice = sample_practice();
    let err = DocumentStore::new()
        .save(dir.path(), &mut practice, "tester")
        .unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));

    // The unreadable bytes are still there for manual recovery.
    let bytes = std::fs::read_to_string(dir.path().join(DOCUMENT_FILE)).unwrap();
    assert_eq!(bytes, "{ not json");
}

#[test]
fn save_times_out_while_another_writer_holds_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join(DOCUMENT_FILE);
    let _held = DocumentLock::acquire(&target, Duration::from_secs(1), Duration::from_secs(60))
        .unwrap();

    let store =
        DocumentStore::with_lock_timings(Duration::from_millis(250), Duration::from_secs(60));
    let mut practice = sample_practice();
    let err = store.save(dir.path(), &mut practice, "tester").unwrap_err();
    assert!(matches!(err, StoreError::LockTimeout(_)));
}

#[test]
fn abandoned_temp_file_does_not_affect_readers() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::new();
    let mut practice = sample_practice();
    store.save(dir.path(), &mut practice, "tester").unwrap();

    // A writer that died between temp-write and rename leaves only a stray
    // temp file behind; the canonical document stays fully readable.
    std::fs::write(dir.path().join(".tmpXYZ123"), "{\"half\": ").unwrap();

    let loaded = store.load(dir.path()).unwrap();
    assert_eq!(loaded, practice);
}

#[test]
fn invalid_practice_is_rejected_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    let mut practice = sample_practice();
    practice.name = String::new();

    let err = DocumentStore::new()
        .save(dir.path(), &mut practice, "tester")
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(!dir.path().join(DOCUMENT_FILE).exists());
}
