use chrono::NaiveDate;
use praxis_core::db::{open_db, open_db_in_memory};
use praxis_core::store::DocumentStore;
use praxis_core::{IdAllocator, IdentError, IdentResolution, Practice, PracticeId};
use std::collections::HashSet;
use std::path::Path;

fn store_practice(root: &Path, id: PracticeId, name: &str) {
    let mut practice = Practice::new(id, name);
    practice.opened_on = NaiveDate::from_ymd_opt(2025, 1, 15);
    let folder = root.join(id.storage_key());
    DocumentStore::new()
        .save(&folder, &mut practice, "tester")
        .unwrap();
}

#[test]
fn allocation_is_sequential_within_a_year() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = open_db_in_memory().unwrap();
    let mut allocator = IdAllocator::new(&mut conn);

    let first = allocator.allocate(dir.path(), 2025).unwrap();
    let second = allocator.allocate(dir.path(), 2025).unwrap();
    assert_eq!(first, PracticeId::new(1, 2025));
    assert_eq!(second, PracticeId::new(2, 2025));

    // Years are independent sequences.
    let other_year = allocator.allocate(dir.path(), 2024).unwrap();
    assert_eq!(other_year, PracticeId::new(1, 2024));
}

#[test]
fn allocation_seeds_from_stored_folders() {
    let dir = tempfile::tempdir().unwrap();
    store_practice(dir.path(), PracticeId::new(41, 2025), "Old matter");

    let mut conn = open_db_in_memory().unwrap();
    let id = IdAllocator::new(&mut conn).allocate(dir.path(), 2025).unwrap();
    assert_eq!(id, PracticeId::new(42, 2025));
}

#[test]
fn allocation_recovers_after_counter_reset() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = open_db_in_memory().unwrap();
    let mut allocator = IdAllocator::new(&mut conn);

    let id = allocator.allocate(dir.path(), 2025).unwrap();
    store_practice(dir.path(), id, "Client A");

    // Counter rolled back (restored database); stored folders win.
    allocator.override_counter(2025, 0).unwrap();
    let next = allocator.allocate(dir.path(), 2025).unwrap();
    assert_eq!(next, PracticeId::new(2, 2025));
}

#[test]
fn concurrent_allocators_never_issue_the_same_id() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("praxis.db");
    let root = dir.path().join("practices");
    drop(open_db(&db_path).unwrap());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let db_path = db_path.clone();
        let root = root.clone();
        handles.push(std::thread::spawn(move || {
            let mut conn = open_db(&db_path).unwrap();
            let mut allocator = IdAllocator::new(&mut conn);
            let mut issued = Vec::new();
            for _ in 0..10 {
                issued.push(allocator.allocate(&root, 2025).unwrap());
            }
            issued
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id), "identifier {id} issued twice");
        }
    }
    assert_eq!(seen.len(), 40);
}

#[test]
fn claim_of_free_identifier_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = open_db_in_memory().unwrap();

    let id = IdAllocator::new(&mut conn)
        .claim(dir.path(), PracticeId::new(5, 2025), "Client A", None)
        .unwrap();
    assert_eq!(id, PracticeId::new(5, 2025));
}

#[test]
fn claim_is_idempotent_for_the_same_practice_name() {
    let dir = tempfile::tempdir().unwrap();
    store_practice(dir.path(), PracticeId::new(5, 2025), "Client A");

    let mut conn = open_db_in_memory().unwrap();
    let id = IdAllocator::new(&mut conn)
        .claim(dir.path(), PracticeId::new(5, 2025), "Client A", None)
        .unwrap();
    assert_eq!(id, PracticeId::new(5, 2025));
}

#[test]
fn claim_collision_surfaces_conflict_until_resolved() {
    let dir = tempfile::tempdir().unwrap();
    store_practice(dir.path(), PracticeId::new(5, 2025), "Client A");

    let mut conn = open_db_in_memory().unwrap();
    let mut allocator = IdAllocator::new(&mut conn);

    let err = allocator
        .claim(dir.path(), PracticeId::new(5, 2025), "Client B", None)
        .unwrap_err();
    match err {
        IdentError::Conflict { id, existing_name } => {
            assert_eq!(id, PracticeId::new(5, 2025));
            assert_eq!(existing_name, "Client A");
        }
        other => panic!("unexpected error: {other}"),
    }

    // Overwrite keeps the proposed identifier.
    let kept = allocator
        .claim(
            dir.path(),
            PracticeId::new(5, 2025),
            "Client B",
            Some(IdentResolution::Overwrite),
        )
        .unwrap();
    assert_eq!(kept, PracticeId::new(5, 2025));

    // Next-available falls back past the highest stored sequence and raises
    // the counter so later allocations do not collide.
    let fallback = allocator
        .claim(
            dir.path(),
            PracticeId::new(5, 2025),
            "Client B",
            Some(IdentResolution::NextAvailable),
        )
        .unwrap();
    assert_eq!(fallback, PracticeId::new(6, 2025));

    let next = allocator.allocate(dir.path(), 2025).unwrap();
    assert_eq!(next, PracticeId::new(7, 2025));
}
