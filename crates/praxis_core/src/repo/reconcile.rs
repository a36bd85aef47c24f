//! Reconcile-by-uid merge for child collections.
//!
//! # Responsibility
//! - Converge one child table onto the incoming row set for one parent:
//!   update rows whose uid is already stored, insert new uids, delete stored
//!   uids absent from the incoming set.
//!
//! # Invariants
//! - `uid` is the sole reconciliation key; `pos` is rewritten from list
//!   position on every merge and never participates in identity.
//! - Column values are filtered against the live schema, so an aggregate
//!   carrying fields an older mirror lacks still merges cleanly.

use super::RepoResult;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Transaction};
use std::collections::BTreeSet;

/// One incoming child row: stable uid plus named column values.
#[derive(Debug, Clone)]
pub struct ChildRow {
    pub uid: String,
    pub values: Vec<(&'static str, Value)>,
}

/// Merges `rows` into `table` for `parent_id` inside the caller's
/// transaction. Re-running the same merge is a no-op at the storage level.
pub fn merge_children(
    tx: &Transaction<'_>,
    table: &'static str,
    parent_id: &str,
    rows: &[ChildRow],
) -> RepoResult<()> {
    let schema_columns = table_columns(tx, table)?;

    let mut existing: BTreeSet<String> = BTreeSet::new();
    {
        let mut stmt = tx.prepare(&format!(
            "SELECT uid FROM {table} WHERE practice_id = ?1;"
        ))?;
        let mut result_rows = stmt.query([parent_id])?;
        while let Some(row) = result_rows.next()? {
            existing.insert(row.get(0)?);
        }
    }

    let mut incoming: BTreeSet<String> = BTreeSet::new();
    for (pos, row) in rows.iter().enumerate() {
        incoming.insert(row.uid.clone());

        let mut columns: Vec<&'static str> = vec!["pos"];
        let mut values: Vec<Value> = vec![Value::Integer(pos as i64)];
        for (column, value) in &row.values {
            if schema_columns.iter().any(|c| c == column) {
                columns.push(column);
                values.push(value.clone());
            }
        }

        if existing.contains(&row.uid) {
            let assignments = columns
                .iter()
                .map(|c| format!("{c} = ?"))
                .collect::<Vec<_>>()
                .join(", ");
            values.push(Value::Text(parent_id.to_string()));
            values.push(Value::Text(row.uid.clone()));
            tx.execute(
                &format!("UPDATE {table} SET {assignments} WHERE practice_id = ? AND uid = ?;"),
                params_from_iter(values),
            )?;
        } else {
            let mut insert_columns = vec!["practice_id", "uid"];
            insert_columns.extend(columns.iter().copied());
            let mut insert_values = vec![
                Value::Text(parent_id.to_string()),
                Value::Text(row.uid.clone()),
            ];
            insert_values.extend(values);
            let placeholders = insert_columns
                .iter()
                .map(|_| "?")
                .collect::<Vec<_>>()
                .join(", ");
            tx.execute(
                &format!(
                    "INSERT INTO {table} ({}) VALUES ({placeholders});",
                    insert_columns.join(", ")
                ),
                params_from_iter(insert_values),
            )?;
        }
    }

    for stale_uid in existing.difference(&incoming) {
        tx.execute(
            &format!("DELETE FROM {table} WHERE practice_id = ?1 AND uid = ?2;"),
            [parent_id, stale_uid.as_str()],
        )?;
    }

    Ok(())
}

/// Live column names for `table`, from `PRAGMA table_info`.
pub fn table_columns(conn: &Connection, table: &str) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}

pub fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
