use chrono::NaiveDate;
use praxis_core::db::open_db_in_memory;
use praxis_core::store::DocumentStore;
use praxis_core::{
    reindex, Practice, PracticeId, PracticeRepository, SqlitePracticeRepository,
};
use std::path::Path;

fn store_practice(root: &Path, sequence: u32, name: &str) -> PracticeId {
    let id = PracticeId::new(sequence, 2025);
    let mut practice = Practice::new(id, name);
    practice.opened_on = NaiveDate::from_ymd_opt(2025, 1, 10);
    DocumentStore::new()
        .save(&root.join(id.storage_key()), &mut practice, "tester")
        .unwrap();
    id
}

#[test]
fn first_pass_inserts_every_stored_practice() {
    let dir = tempfile::tempdir().unwrap();
    for sequence in 1..=3 {
        store_practice(dir.path(), sequence, &format!("Client {sequence}"));
    }

    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();
    let report = reindex(&mut repo, dir.path(), false).unwrap();

    assert_eq!(report.inserted, 3);
    assert_eq!(report.updated, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(repo.list_ids().unwrap().len(), 3);
}

#[test]
fn unchanged_corpus_is_skipped_on_repeat_passes() {
    let dir = tempfile::tempdir().unwrap();
    store_practice(dir.path(), 1, "Client A");
    store_practice(dir.path(), 2, "Client B");

    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();
    reindex(&mut repo, dir.path(), false).unwrap();

    let second = reindex(&mut repo, dir.path(), false).unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.skipped, 2);
}

#[test]
fn edited_document_is_updated_not_reinserted() {
    let dir = tempfile::tempdir().unwrap();
    let id = store_practice(dir.path(), 1, "Client A");

    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();
    reindex(&mut repo, dir.path(), false).unwrap();

    let folder = dir.path().join(id.storage_key());
    let store = DocumentStore::new();
    let mut practice = store.load(&folder).unwrap();
    practice.notes = Some("new development".to_string());
    store.save(&folder, &mut practice, "tester").unwrap();

    let report = reindex(&mut repo, dir.path(), false).unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.inserted, 0);

    let mirrored = repo.load(&id).unwrap().unwrap();
    assert_eq!(mirrored.notes.as_deref(), Some("new development"));
}

#[test]
fn malformed_document_is_counted_and_does_not_abort() {
    let dir = tempfile::tempdir().unwrap();
    store_practice(dir.path(), 1, "Client A");

    let bad = dir.path().join("2_2025");
    std::fs::create_dir_all(&bad).unwrap();
    std::fs::write(bad.join("practice.json"), "{ not json").unwrap();

    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();
    let report = reindex(&mut repo, dir.path(), false).unwrap();

    assert_eq!(report.inserted, 1);
    assert_eq!(report.failed, 1);
}

#[test]
fn document_in_mismatched_folder_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("9_2025");
    std::fs::create_dir_all(&folder).unwrap();
    // Document claims 1/2025 but lives in 9_2025.
    std::fs::write(
        folder.join("practice.json"),
        r#"{"id": "1/2025", "name": "Client A", "opened_on": "2025-01-10"}"#,
    )
    .unwrap();

    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();
    let report = reindex(&mut repo, dir.path(), false).unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.failed, 1);
}

#[test]
fn purge_rebuilds_and_drops_stale_rows() {
    let dir = tempfile::tempdir().unwrap();
    let keep = store_practice(dir.path(), 1, "Client A");
    let gone = store_practice(dir.path(), 2, "Client B");

    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();
    reindex(&mut repo, dir.path(), false).unwrap();

    // Practice 2 deleted on disk; a plain pass leaves its mirror row behind.
    std::fs::remove_dir_all(dir.path().join(gone.storage_key())).unwrap();
    reindex(&mut repo, dir.path(), false).unwrap();
    assert_eq!(repo.list_ids().unwrap().len(), 2);

    let report = reindex(&mut repo, dir.path(), true).unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(repo.list_ids().unwrap(), vec![keep]);
}
