//! Append-only per-practice audit log.
//!
//! # Responsibility
//! - Record every effective document write as one self-contained JSON line.
//!
//! # Invariants
//! - `history.jsonl` is append-only; the core never mutates or deletes
//!   existing entries.
//! - Each entry carries before/after SHA-256 hashes and a unified diff, so a
//!   single line is auditable without the surrounding file.

use super::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use similar::TextDiff;
use std::io::Write;
use std::path::Path;

pub const HISTORY_FILE: &str = "history.jsonl";

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    /// Absent for the first write of a document.
    pub before_hash: Option<String>,
    pub after_hash: String,
    pub diff: String,
}

/// Appends one history line describing the transition `before -> after`.
pub fn append_history(
    folder: &Path,
    actor: &str,
    action: &str,
    before: Option<&Value>,
    after: &Value,
) -> StoreResult<()> {
    std::fs::create_dir_all(folder)?;
    let before_text = before.map(pretty);
    let after_text = pretty(after);

    let diff = TextDiff::from_lines(before_text.as_deref().unwrap_or(""), &after_text)
        .unified_diff()
        .header("before", "after")
        .to_string();

    let entry = HistoryEntry {
        timestamp: Utc::now(),
        actor: if actor.is_empty() { "system" } else { actor }.to_string(),
        action: action.to_string(),
        before_hash: before_text.as_deref().map(sha256_hex),
        after_hash: sha256_hex(&after_text),
        diff,
    };

    let line = serde_json::to_string(&entry).map_err(|err| StoreError::Corrupt {
        path: folder.join(HISTORY_FILE),
        detail: format!("cannot serialize history entry: {err}"),
    })?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(folder.join(HISTORY_FILE))?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Reads the full history for one practice folder, oldest first.
///
/// Returns an empty vec when no history exists yet. A malformed line is a
/// `Corrupt` error; the log is never silently truncated.
pub fn read_history(folder: &Path) -> StoreResult<Vec<HistoryEntry>> {
    let path = folder.join(HISTORY_FILE);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut entries = Vec::new();
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        let entry = serde_json::from_str(line).map_err(|err| StoreError::Corrupt {
            path: path.clone(),
            detail: format!("invalid history line: {err}"),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

fn pretty(value: &Value) -> String {
    // serde_json maps are key-sorted, so this rendering is stable across
    // saves of semantically identical documents.
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::{append_history, read_history};
    use serde_json::json;

    #[test]
    fn first_write_has_no_before_hash() {
        let dir = tempfile::tempdir().unwrap();
        let after = json!({"id": "1/2025", "name": "Client A"});

        append_history(dir.path(), "tester", "save_practice", None, &after).unwrap();

        let entries = read_history(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].before_hash.is_none());
        assert!(!entries[0].after_hash.is_empty());
        assert_eq!(entries[0].actor, "tester");
    }

    #[test]
    fn diff_names_the_changed_field() {
        let dir = tempfile::tempdir().unwrap();
        let before = json!({"name": "Client A", "notes": "old"});
        let after = json!({"name": "Client A", "notes": "new"});

        append_history(dir.path(), "", "save_practice", Some(&before), &after).unwrap();

        let entries = read_history(dir.path()).unwrap();
        assert_eq!(entries[0].actor, "system");
        assert!(entries[0].diff.contains("-  \"notes\": \"old\""));
        assert!(entries[0].diff.contains("+  \"notes\": \"new\""));
    }

    #[test]
    fn entries_accumulate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for n in 0..3 {
            let after = json!({ "revision": n });
            append_history(dir.path(), "tester", "save_practice", None, &after).unwrap();
        }
        assert_eq!(read_history(dir.path()).unwrap().len(), 3);
    }

    #[test]
    fn missing_history_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_history(dir.path()).unwrap().is_empty());
    }
}
