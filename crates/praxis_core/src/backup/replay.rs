//! SQL replay script rendering for one practice.
//!
//! # Responsibility
//! - Emit an idempotent `DELETE ... ; INSERT ...` script covering every
//!   mirror table that carries rows for the given practice.
//!
//! # Invariants
//! - The script filters by the raw natural identifier; it never alters
//!   schema.
//! - Replaying the script twice yields the same table contents.

use crate::model::practice::PracticeId;
use chrono::Local;
use rusqlite::types::Value;
use rusqlite::Connection;

/// Renders the replay script for `id` from the mirror behind `conn`.
///
/// # Errors
/// Returns the underlying SQLite error; callers are expected to degrade to a
/// placeholder comment instead of failing their snapshot.
pub fn render_replay_script(conn: &Connection, id: &PracticeId) -> Result<String, rusqlite::Error> {
    let id_text = id.to_string();
    let pairs = tables_with_practice_key(conn)?;

    let mut out = vec![
        format!("-- Replay script for practice {id_text}"),
        format!(
            "-- Generated: {}",
            Local::now().format("%Y-%m-%dT%H:%M:%S")
        ),
        format!(
            "-- Tables: {}",
            if pairs.is_empty() {
                "(none)".to_string()
            } else {
                pairs
                    .iter()
                    .map(|(table, _)| table.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        ),
        "BEGIN;".to_string(),
    ];

    let mut total_rows = 0usize;
    for (table, key_column) in &pairs {
        let columns = column_names(conn, table)?;
        out.push(format!("-- {table}"));
        out.push(format!(
            "DELETE FROM {table} WHERE {key_column} = {};",
            quote_sql_text(&id_text)
        ));

        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {table} WHERE {key_column} = ?1;"
        ))?;
        let mut rows = stmt.query([id_text.as_str()])?;
        while let Some(row) = rows.next()? {
            let mut rendered = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                rendered.push(quote_sql(row.get::<_, Value>(index)?));
            }
            out.push(format!(
                "INSERT INTO {table} ({}) VALUES ({});",
                columns.join(", "),
                rendered.join(", ")
            ));
            total_rows += 1;
        }
    }

    out.push("COMMIT;".to_string());
    if total_rows == 0 {
        out.push(format!("-- No rows exported for practice {id_text}"));
    }
    out.push(String::new());
    Ok(out.join("\n"))
}

/// Placeholder emitted when rendering fails or no mirror is reachable.
pub(crate) fn placeholder_script(id: &PracticeId, reason: &str) -> String {
    format!("-- Empty export for practice {id}: {reason}\n")
}

fn tables_with_practice_key(
    conn: &Connection,
) -> Result<Vec<(String, &'static str)>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name;",
    )?;
    let mut rows = stmt.query([])?;
    let mut pairs = Vec::new();
    while let Some(row) = rows.next()? {
        let table: String = row.get(0)?;
        let columns = column_names(conn, &table)?;
        if columns.iter().any(|c| c == "practice_id") {
            pairs.push((table, "practice_id"));
        } else if table == "practices" {
            pairs.push((table, "id"));
        }
    }
    Ok(pairs)
}

fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}

fn quote_sql(value: Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Real(n) => n.to_string(),
        Value::Text(text) => quote_sql_text(&text),
        Value::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            format!("X'{hex}'")
        }
    }
}

fn quote_sql_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::{quote_sql, quote_sql_text};
    use rusqlite::types::Value;

    #[test]
    fn quoting_escapes_single_quotes() {
        assert_eq!(quote_sql_text("O'Hara"), "'O''Hara'");
    }

    #[test]
    fn quoting_handles_all_value_kinds() {
        assert_eq!(quote_sql(Value::Null), "NULL");
        assert_eq!(quote_sql(Value::Integer(42)), "42");
        assert_eq!(quote_sql(Value::Real(1.5)), "1.5");
        assert_eq!(quote_sql(Value::Blob(vec![0xab, 0x01])), "X'ab01'");
    }
}
