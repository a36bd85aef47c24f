//! Practice mirror contract and SQLite implementation.
//!
//! # Responsibility
//! - Upsert whole practice aggregates into the relational schema and load
//!   them back, children ordered by advisory `pos`.
//! - Keep the reindexer's per-practice content hash alongside the parent row.
//!
//! # Invariants
//! - One upsert is one IMMEDIATE transaction; concurrent upserts for
//!   different practices do not block each other beyond SQLite's writer lock.
//! - Upserting the same aggregate twice leaves identical table contents.

use super::reconcile::{merge_children, table_columns, table_exists, ChildRow};
use super::{RepoError, RepoResult};
use crate::model::practice::{
    ActivityEntry, BillingLine, DeadlineEntry, DocumentRef, Practice, PracticeId, RowId,
    StaffAssignment,
};
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, TransactionBehavior};
use uuid::Uuid;

const PARENT_TABLE: &str = "practices";
const CHILD_TABLES: [&str; 5] = [
    "practice_staff",
    "practice_billing",
    "practice_activities",
    "practice_deadlines",
    "practice_documents",
];

/// Mirror interface for practice aggregates.
pub trait PracticeRepository {
    /// Upserts the whole aggregate: parent row plus reconciled children.
    fn upsert(&mut self, practice: &Practice) -> RepoResult<()>;
    /// Reconstructs one aggregate, or `None` when the mirror has no row.
    fn load(&self, id: &PracticeId) -> RepoResult<Option<Practice>>;
    /// Removes one practice and (via cascade) its children. Returns whether
    /// a row existed.
    fn delete(&mut self, id: &PracticeId) -> RepoResult<bool>;
    /// Content hash recorded by the last reindex/save for this practice.
    fn stored_content_hash(&self, id: &PracticeId) -> RepoResult<Option<String>>;
    /// Records the canonical content hash for reindex skip decisions.
    fn record_content_hash(&mut self, id: &PracticeId, hash: &str) -> RepoResult<()>;
    /// Deletes every mirrored practice (full-rebuild reindex).
    fn clear(&mut self) -> RepoResult<()>;
    /// Natural identifiers of all mirrored practices.
    fn list_ids(&self) -> RepoResult<Vec<PracticeId>>;
}

/// SQLite-backed mirror repository.
pub struct SqlitePracticeRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqlitePracticeRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        for table in std::iter::once(PARENT_TABLE).chain(CHILD_TABLES) {
            if !table_exists(conn, table)? {
                return Err(RepoError::MissingRequiredTable(table));
            }
        }
        Ok(Self { conn })
    }
}

impl PracticeRepository for SqlitePracticeRepository<'_> {
    fn upsert(&mut self, practice: &Practice) -> RepoResult<()> {
        practice.validate()?;
        let id = practice.id.to_string();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Parent columns are filtered against the live schema so optional
        // new fields never break an older mirror file.
        let schema_columns = table_columns(&tx, PARENT_TABLE)?;
        let mut columns: Vec<&'static str> = vec!["id"];
        let mut values: Vec<Value> = vec![Value::Text(id.clone())];
        for (column, value) in parent_values(practice) {
            if schema_columns.iter().any(|c| c == column) {
                columns.push(column);
                values.push(value);
            }
        }
        let placeholders = columns.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let updates = columns
            .iter()
            .skip(1)
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        tx.execute(
            &format!(
                "INSERT INTO practices ({}) VALUES ({placeholders})
                 ON CONFLICT(id) DO UPDATE SET {updates};",
                columns.join(", ")
            ),
            params_from_iter(values),
        )?;

        merge_children(&tx, "practice_staff", &id, &staff_rows(&practice.staff))?;
        merge_children(&tx, "practice_billing", &id, &billing_rows(&practice.billing))?;
        merge_children(
            &tx,
            "practice_activities",
            &id,
            &activity_rows(&practice.activities),
        )?;
        merge_children(
            &tx,
            "practice_deadlines",
            &id,
            &deadline_rows(&practice.deadlines),
        )?;
        merge_children(
            &tx,
            "practice_documents",
            &id,
            &document_rows(&practice.documents),
        )?;

        tx.commit()?;
        info!(
            "event=mirror_upsert module=repo status=ok id={} staff={} billing={} activities={} deadlines={} documents={}",
            practice.id,
            practice.staff.len(),
            practice.billing.len(),
            practice.activities.len(),
            practice.deadlines.len(),
            practice.documents.len()
        );
        Ok(())
    }

    fn load(&self, id: &PracticeId) -> RepoResult<Option<Practice>> {
        let id_text = id.to_string();
        let mut stmt = self.conn.prepare(
            "SELECT name, opened_on, closed_on, value, practice_type, sector, matter,
                    lead_contact, estimate_sent, notes, directory, updated_at
             FROM practices
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id_text.as_str()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let mut practice = parse_parent_row(*id, row)?;
        load_staff(self.conn, &id_text, &mut practice)?;
        load_billing(self.conn, &id_text, &mut practice)?;
        load_activities(self.conn, &id_text, &mut practice)?;
        load_deadlines(self.conn, &id_text, &mut practice)?;
        load_documents(self.conn, &id_text, &mut practice)?;
        Ok(Some(practice))
    }

    fn delete(&mut self, id: &PracticeId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM practices WHERE id = ?1;",
            [id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn stored_content_hash(&self, id: &PracticeId) -> RepoResult<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT content_hash FROM practices WHERE id = ?1;")?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(None),
        }
    }

    fn record_content_hash(&mut self, id: &PracticeId, hash: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE practices SET content_hash = ?2 WHERE id = ?1;",
            params![id.to_string(), hash],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(*id));
        }
        Ok(())
    }

    fn clear(&mut self) -> RepoResult<()> {
        // Children cascade from the parent delete.
        self.conn.execute("DELETE FROM practices;", [])?;
        Ok(())
    }

    fn list_ids(&self) -> RepoResult<Vec<PracticeId>> {
        let mut stmt = self.conn.prepare("SELECT id FROM practices ORDER BY id;")?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            ids.push(parse_practice_id(&text)?);
        }
        Ok(ids)
    }
}

fn parent_values(practice: &Practice) -> Vec<(&'static str, Value)> {
    vec![
        ("name", text(Some(&practice.name))),
        ("opened_on", date(practice.opened_on.as_ref())),
        ("closed_on", date(practice.closed_on.as_ref())),
        ("value", text(practice.value.as_deref())),
        ("practice_type", text(practice.practice_type.as_deref())),
        ("sector", text(practice.sector.as_deref())),
        ("matter", text(practice.matter.as_deref())),
        ("lead_contact", text(practice.lead_contact.as_deref())),
        (
            "estimate_sent",
            Value::Integer(i64::from(practice.estimate_sent)),
        ),
        ("notes", text(practice.notes.as_deref())),
        ("directory", text(practice.directory.as_deref())),
        (
            "updated_at",
            practice
                .updated_at
                .map(|ts| Value::Text(ts.to_rfc3339()))
                .unwrap_or(Value::Null),
        ),
    ]
}

fn staff_rows(rows: &[StaffAssignment]) -> Vec<ChildRow> {
    rows.iter()
        .map(|row| ChildRow {
            uid: row.uid.to_string(),
            values: vec![
                ("role", text(row.role.as_deref())),
                ("contact", text(row.contact.as_deref())),
                ("name", text(row.name.as_deref())),
            ],
        })
        .collect()
}

fn billing_rows(rows: &[BillingLine]) -> Vec<ChildRow> {
    rows.iter()
        .map(|row| ChildRow {
            uid: row.uid.to_string(),
            values: vec![
                ("kind", text(row.kind.as_deref())),
                ("amount", real(row.amount)),
                ("note", text(row.note.as_deref())),
            ],
        })
        .collect()
}

fn activity_rows(rows: &[ActivityEntry]) -> Vec<ChildRow> {
    rows.iter()
        .map(|row| ChildRow {
            uid: row.uid.to_string(),
            values: vec![
                ("started_at", text(row.started_at.as_deref())),
                ("ended_at", text(row.ended_at.as_deref())),
                ("description", text(row.description.as_deref())),
                ("duration_min", integer(row.duration_min)),
                ("rate", real(row.rate)),
                ("note", text(row.note.as_deref())),
            ],
        })
        .collect()
}

fn deadline_rows(rows: &[DeadlineEntry]) -> Vec<ChildRow> {
    rows.iter()
        .map(|row| ChildRow {
            uid: row.uid.to_string(),
            values: vec![
                ("due_on", date(row.due_on.as_ref())),
                ("description", text(row.description.as_deref())),
                ("done", Value::Integer(i64::from(row.done))),
                ("note", text(row.note.as_deref())),
            ],
        })
        .collect()
}

fn document_rows(rows: &[DocumentRef]) -> Vec<ChildRow> {
    rows.iter()
        .map(|row| ChildRow {
            uid: row.uid.to_string(),
            values: vec![
                ("path", text(row.path.as_deref())),
                ("category", text(row.category.as_deref())),
                ("note", text(row.note.as_deref())),
                ("content_hash", text(row.content_hash.as_deref())),
            ],
        })
        .collect()
}

fn text(value: Option<&str>) -> Value {
    value
        .map(|v| Value::Text(v.to_string()))
        .unwrap_or(Value::Null)
}

fn real(value: Option<f64>) -> Value {
    value.map(Value::Real).unwrap_or(Value::Null)
}

fn integer(value: Option<i64>) -> Value {
    value.map(Value::Integer).unwrap_or(Value::Null)
}

fn date(value: Option<&NaiveDate>) -> Value {
    value
        .map(|d| Value::Text(d.to_string()))
        .unwrap_or(Value::Null)
}

fn parse_parent_row(id: PracticeId, row: &Row<'_>) -> RepoResult<Practice> {
    let mut practice = Practice::new(id, row.get::<_, Option<String>>("name")?.unwrap_or_default());
    practice.opened_on = parse_date_column(row, "opened_on")?;
    practice.closed_on = parse_date_column(row, "closed_on")?;
    practice.value = row.get("value")?;
    practice.practice_type = row.get("practice_type")?;
    practice.sector = row.get("sector")?;
    practice.matter = row.get("matter")?;
    practice.lead_contact = row.get("lead_contact")?;
    practice.estimate_sent = row.get::<_, i64>("estimate_sent")? != 0;
    practice.notes = row.get("notes")?;
    practice.directory = row.get("directory")?;
    practice.updated_at = match row.get::<_, Option<String>>("updated_at")? {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(&raw)
                .map_err(|_| {
                    RepoError::InvalidData(format!(
                        "invalid timestamp `{raw}` in practices.updated_at"
                    ))
                })?
                .with_timezone(&Utc),
        ),
        None => None,
    };
    Ok(practice)
}

fn parse_date_column(row: &Row<'_>, column: &'static str) -> RepoResult<Option<NaiveDate>> {
    match row.get::<_, Option<String>>(column)? {
        Some(raw) => raw
            .parse::<NaiveDate>()
            .map(Some)
            .map_err(|_| RepoError::InvalidData(format!("invalid date `{raw}` in {column}"))),
        None => Ok(None),
    }
}

fn parse_row_id(raw: &str) -> RepoResult<RowId> {
    Uuid::parse_str(raw)
        .map_err(|_| RepoError::InvalidData(format!("invalid row uid `{raw}` in child table")))
}

fn parse_practice_id(raw: &str) -> RepoResult<PracticeId> {
    raw.parse()
        .map_err(|_| RepoError::InvalidData(format!("invalid practice id `{raw}` in practices.id")))
}

fn load_staff(conn: &Connection, id: &str, practice: &mut Practice) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "SELECT uid, role, contact, name
         FROM practice_staff
         WHERE practice_id = ?1
         ORDER BY pos ASC;",
    )?;
    let mut rows = stmt.query([id])?;
    while let Some(row) = rows.next()? {
        let uid_text: String = row.get("uid")?;
        practice.staff.push(StaffAssignment {
            uid: parse_row_id(&uid_text)?,
            role: row.get("role")?,
            contact: row.get("contact")?,
            name: row.get("name")?,
        });
    }
    Ok(())
}

fn load_billing(conn: &Connection, id: &str, practice: &mut Practice) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "SELECT uid, kind, amount, note
         FROM practice_billing
         WHERE practice_id = ?1
         ORDER BY pos ASC;",
    )?;
    let mut rows = stmt.query([id])?;
    while let Some(row) = rows.next()? {
        let uid_text: String = row.get("uid")?;
        practice.billing.push(BillingLine {
            uid: parse_row_id(&uid_text)?,
            kind: row.get("kind")?,
            amount: row.get("amount")?,
            note: row.get("note")?,
        });
    }
    Ok(())
}

fn load_activities(conn: &Connection, id: &str, practice: &mut Practice) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "SELECT uid, started_at, ended_at, description, duration_min, rate, note
         FROM practice_activities
         WHERE practice_id = ?1
         ORDER BY pos ASC;",
    )?;
    let mut rows = stmt.query([id])?;
    while let Some(row) = rows.next()? {
        let uid_text: String = row.get("uid")?;
        practice.activities.push(ActivityEntry {
            uid: parse_row_id(&uid_text)?,
            started_at: row.get("started_at")?,
            ended_at: row.get("ended_at")?,
            description: row.get("description")?,
            duration_min: row.get("duration_min")?,
            rate: row.get("rate")?,
            note: row.get("note")?,
        });
    }
    Ok(())
}

fn load_deadlines(conn: &Connection, id: &str, practice: &mut Practice) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "SELECT uid, due_on, description, done, note
         FROM practice_deadlines
         WHERE practice_id = ?1
         ORDER BY pos ASC;",
    )?;
    let mut rows = stmt.query([id])?;
    while let Some(row) = rows.next()? {
        let uid_text: String = row.get("uid")?;
        let due_on = match row.get::<_, Option<String>>("due_on")? {
            Some(raw) => Some(raw.parse::<NaiveDate>().map_err(|_| {
                RepoError::InvalidData(format!("invalid date `{raw}` in practice_deadlines.due_on"))
            })?),
            None => None,
        };
        practice.deadlines.push(DeadlineEntry {
            uid: parse_row_id(&uid_text)?,
            due_on,
            description: row.get("description")?,
            done: row.get::<_, i64>("done")? != 0,
            note: row.get("note")?,
        });
    }
    Ok(())
}

fn load_documents(conn: &Connection, id: &str, practice: &mut Practice) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "SELECT uid, path, category, note, content_hash
         FROM practice_documents
         WHERE practice_id = ?1
         ORDER BY pos ASC;",
    )?;
    let mut rows = stmt.query([id])?;
    while let Some(row) = rows.next()? {
        let uid_text: String = row.get("uid")?;
        practice.documents.push(DocumentRef {
            uid: parse_row_id(&uid_text)?,
            path: row.get("path")?,
            category: row.get("category")?,
            note: row.get("note")?,
            content_hash: row.get("content_hash")?,
        });
    }
    Ok(())
}
