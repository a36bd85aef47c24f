use chrono::NaiveDate;
use praxis_core::db::open_db_in_memory;
use praxis_core::model::practice::{BillingLine, DeadlineEntry, StaffAssignment};
use praxis_core::{Practice, PracticeId, PracticeRepository, SqlitePracticeRepository};
use rusqlite::Connection;

fn sample_practice() -> Practice {
    let mut practice = Practice::new(PracticeId::new(7, 2025), "Client B");
    practice.opened_on = NaiveDate::from_ymd_opt(2025, 2, 14);
    practice.sector = Some("real estate".to_string());
    practice.staff.push(StaffAssignment::new(
        "lead",
        "ada@example.com",
        "Ada",
    ));
    practice.staff.push(StaffAssignment::new(
        "associate",
        "grace@example.com",
        "Grace",
    ));
    practice.billing.push(BillingLine {
        uid: uuid::Uuid::new_v4(),
        kind: Some("retainer".to_string()),
        amount: Some(1500.0),
        note: None,
    });
    practice
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn upsert_then_load_round_trips_ordered_children() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();

    let practice = sample_practice();
    repo.upsert(&practice).unwrap();

    let loaded = repo.load(&practice.id).unwrap().unwrap();
    assert_eq!(loaded.name, practice.name);
    assert_eq!(loaded.staff.len(), 2);
    assert_eq!(loaded.staff[0].uid, practice.staff[0].uid);
    assert_eq!(loaded.staff[1].uid, practice.staff[1].uid);
    assert_eq!(loaded.billing[0].amount, Some(1500.0));
}

#[test]
fn upserting_twice_converges_to_identical_rows() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();

    let practice = sample_practice();
    repo.upsert(&practice).unwrap();
    repo.upsert(&practice).unwrap();
    drop(repo);

    assert_eq!(count(&conn, "SELECT COUNT(*) FROM practices;"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM practice_staff;"), 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM practice_billing;"), 1);
}

#[test]
fn removed_child_row_is_deleted_by_uid_only() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();

    let mut practice = sample_practice();
    repo.upsert(&practice).unwrap();

    let survivor = practice.staff[1].uid;
    practice.staff.remove(0);
    repo.upsert(&practice).unwrap();
    drop(repo);

    let uids: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT uid FROM practice_staff ORDER BY pos;")
            .unwrap();
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        rows
    };
    assert_eq!(uids, vec![survivor.to_string()]);
}

#[test]
fn edited_row_keeps_its_uid_across_upserts() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();

    let mut practice = sample_practice();
    repo.upsert(&practice).unwrap();

    // Editing every visible field must not create a new row.
    let uid = practice.staff[0].uid;
    practice.staff[0].role = Some("of counsel".to_string());
    practice.staff[0].name = Some("Ada L.".to_string());
    practice.staff[0].contact = Some("ada@firm.example".to_string());
    repo.upsert(&practice).unwrap();
    drop(repo);

    assert_eq!(count(&conn, "SELECT COUNT(*) FROM practice_staff;"), 2);
    let role: String = conn
        .query_row(
            "SELECT role FROM practice_staff WHERE uid = ?1;",
            [uid.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(role, "of counsel");
}

#[test]
fn reordering_children_updates_pos_without_row_churn() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();

    let mut practice = sample_practice();
    repo.upsert(&practice).unwrap();

    practice.staff.swap(0, 1);
    repo.upsert(&practice).unwrap();

    let loaded = repo.load(&practice.id).unwrap().unwrap();
    assert_eq!(loaded.staff[0].uid, practice.staff[0].uid);
    assert_eq!(loaded.staff[1].uid, practice.staff[1].uid);
}

#[test]
fn delete_cascades_and_reports_existence() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();

    let practice = sample_practice();
    repo.upsert(&practice).unwrap();

    assert!(repo.delete(&practice.id).unwrap());
    assert!(!repo.delete(&practice.id).unwrap());
    drop(repo);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM practice_staff;"), 0);
}

#[test]
fn upsert_tolerates_missing_optional_parent_column() {
    let mut conn = open_db_in_memory().unwrap();
    // An older mirror file without the lead_contact column.
    conn.execute_batch("ALTER TABLE practices DROP COLUMN lead_contact;")
        .unwrap();

    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();
    let mut practice = sample_practice();
    practice.lead_contact = Some("Ada".to_string());
    repo.upsert(&practice).unwrap();
    drop(repo);

    assert_eq!(count(&conn, "SELECT COUNT(*) FROM practices;"), 1);
}

#[test]
fn content_hash_survives_parent_upsert() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();

    let practice = sample_practice();
    repo.upsert(&practice).unwrap();
    repo.record_content_hash(&practice.id, "abc123").unwrap();

    repo.upsert(&practice).unwrap();
    assert_eq!(
        repo.stored_content_hash(&practice.id).unwrap().as_deref(),
        Some("abc123")
    );
}

#[test]
fn deadline_dates_round_trip() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqlitePracticeRepository::try_new(&mut conn).unwrap();

    let mut practice = sample_practice();
    practice.deadlines.push(DeadlineEntry {
        uid: uuid::Uuid::new_v4(),
        due_on: NaiveDate::from_ymd_opt(2025, 9, 30),
        description: Some("file response".to_string()),
        done: false,
        note: None,
    });
    repo.upsert(&practice).unwrap();

    let loaded = repo.load(&practice.id).unwrap().unwrap();
    assert_eq!(loaded.deadlines[0].due_on, NaiveDate::from_ymd_opt(2025, 9, 30));
    assert!(!loaded.deadlines[0].done);
}
