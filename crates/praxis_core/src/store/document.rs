//! Canonical `practice.json` read/write path.
//!
//! # Responsibility
//! - Serialize the aggregate to its one authoritative on-disk document.
//! - Skip rewrites when the canonical content is unchanged.
//!
//! # Invariants
//! - Writes happen under the per-document lock, via temp-then-rename.
//! - `updated_at` is bumped only on effective writes, so repeating a save
//!   stays a byte-level no-op.
//! - Load never substitutes an empty document for missing/corrupt bytes.

use super::history::append_history;
use super::lock::DocumentLock;
use super::{StoreError, StoreResult};
use crate::model::practice::{Practice, PracticeId};
use chrono::Utc;
use log::info;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DOCUMENT_FILE: &str = "practice.json";

const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);
const DEFAULT_LOCK_STALE: Duration = Duration::from_secs(30);

/// Outcome of a canonical save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// The document changed and was rewritten (history appended).
    Written(PathBuf),
    /// The incoming document was identical; nothing was touched.
    Unchanged(PathBuf),
}

impl SaveStatus {
    pub fn path(&self) -> &Path {
        match self {
            Self::Written(path) | Self::Unchanged(path) => path,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Store for canonical practice documents.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    lock_wait: Duration,
    lock_stale: Duration,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self {
            lock_wait: DEFAULT_LOCK_WAIT,
            lock_stale: DEFAULT_LOCK_STALE,
        }
    }
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the advisory-lock wait and staleness thresholds.
    pub fn with_lock_timings(lock_wait: Duration, lock_stale: Duration) -> Self {
        Self {
            lock_wait,
            lock_stale,
        }
    }

    /// Saves the aggregate into `folder/practice.json`.
    ///
    /// On an effective write `practice.updated_at` is bumped and one history
    /// entry is appended. When the canonical content (ignoring `updated_at`)
    /// matches what is stored, nothing is written and no history accrues.
    ///
    /// # Errors
    /// - `Validation` before anything touches disk.
    /// - `Corrupt` when an existing document cannot be parsed; the save is
    ///   refused rather than clobbering unreadable state.
    /// - `LockTimeout` when another writer holds the document lock.
    pub fn save(
        &self,
        folder: &Path,
        practice: &mut Practice,
        actor: &str,
    ) -> StoreResult<SaveStatus> {
        practice.validate()?;
        std::fs::create_dir_all(folder)?;
        let path = folder.join(DOCUMENT_FILE);

        let _lock = DocumentLock::acquire(&path, self.lock_wait, self.lock_stale)?;

        let before = read_existing(&path)?;
        let mut after = to_document_value(practice, &path)?;

        if let Some(existing) = before.as_ref() {
            if masked(existing) == masked(&after) {
                info!(
                    "event=document_save module=store status=skip id={} reason=unchanged",
                    practice.id
                );
                return Ok(SaveStatus::Unchanged(path));
            }
        }

        practice.updated_at = Some(Utc::now());
        if let Value::Object(map) = &mut after {
            map.insert(
                "updated_at".to_string(),
                serde_json::to_value(practice.updated_at).unwrap_or(Value::Null),
            );
        }

        atomic_write_text(&path, &canonical_pretty(&after))?;
        append_history(folder, actor, "save_practice", before.as_ref(), &after)?;
        info!(
            "event=document_save module=store status=ok id={} path={}",
            practice.id,
            path.display()
        );
        Ok(SaveStatus::Written(path))
    }

    /// Loads the canonical document from `folder`.
    ///
    /// # Errors
    /// - `NotFound` when no document exists.
    /// - `Corrupt` when the stored bytes are not a valid practice document.
    pub fn load(&self, folder: &Path) -> StoreResult<Practice> {
        let path = folder.join(DOCUMENT_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path));
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&text).map_err(|err| StoreError::Corrupt {
            path,
            detail: err.to_string(),
        })
    }
}

/// Conventional folder for one practice under the archive root.
pub fn practice_folder(root: &Path, id: &PracticeId) -> PathBuf {
    root.join(id.storage_key())
}

/// Compact canonical rendering: stable key order, no insignificant
/// whitespace. Used for content hashing and equality checks.
pub fn canonical_compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Pretty canonical rendering used for the on-disk document and diffs.
pub fn canonical_pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_default();
    text.push('\n');
    text
}

/// SHA-256 over the compact canonical form, hex-encoded.
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_compact(value).as_bytes());
    format!("{:x}", hasher.finalize())
}

fn to_document_value(practice: &Practice, path: &Path) -> StoreResult<Value> {
    serde_json::to_value(practice).map_err(|err| StoreError::Corrupt {
        path: path.to_path_buf(),
        detail: format!("cannot serialize practice: {err}"),
    })
}

fn read_existing(path: &Path) -> StoreResult<Option<Value>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_str(&text).map_err(|err| StoreError::Corrupt {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })?;
    Ok(Some(value))
}

/// Content identity with the store-managed timestamp masked out.
fn masked(value: &Value) -> String {
    let mut clone = value.clone();
    if let Value::Object(map) = &mut clone {
        map.remove("updated_at");
    }
    canonical_compact(&clone)
}

/// Writes `text` so a concurrent reader sees either the old or the new file,
/// never a torn mix.
pub fn atomic_write_text(path: &Path, text: &str) -> StoreResult<()> {
    let parent = path.parent().ok_or_else(|| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("path has no parent directory: {}", path.display()),
        ))
    })?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(text.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|err| StoreError::Io(err.error))?;
    Ok(())
}
