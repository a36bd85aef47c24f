//! Dual-save snapshot writer.
//!
//! # Responsibility
//! - Write the timestamped immutable copy and the overwritable "latest"
//!   copy of a practice document, plus optional SQL replay companions.
//!
//! # Invariants
//! - Timestamped copies are append-only: one per effective save, never
//!   overwritten by later saves.
//! - The latest copy lives under a fixed name in the central backup
//!   directory and is replaced atomically on each save.

use super::replay::{placeholder_script, render_replay_script};
use crate::model::practice::Practice;
use crate::store::{atomic_write_text, canonical_pretty, StoreError, StoreResult};
use chrono::{DateTime, Local};
use log::{info, warn};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// Filename timestamp layout: `DDMMYYYY_HHMMSS`.
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%d%m%Y_%H%M%S";

/// Locations written by one snapshot pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotReceipt {
    pub timestamped: PathBuf,
    pub latest: PathBuf,
    pub sql_timestamped: Option<PathBuf>,
    pub sql_latest: Option<PathBuf>,
}

/// Writer for the dual-save snapshot scheme.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    backups_dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            backups_dir: backups_dir.into(),
        }
    }

    /// Snapshots `practice` now. See [`SnapshotWriter::snapshot_at`].
    pub fn snapshot(
        &self,
        folder: &Path,
        practice: &Practice,
        mirror: Option<&Connection>,
    ) -> StoreResult<SnapshotReceipt> {
        self.snapshot_at(folder, practice, mirror, Local::now())
    }

    /// Writes the dual snapshot with an explicit timestamp.
    ///
    /// When `mirror` is provided, an SQL replay script is rendered beside
    /// both copies; rendering failure degrades to a placeholder comment.
    pub fn snapshot_at(
        &self,
        folder: &Path,
        practice: &Practice,
        mirror: Option<&Connection>,
        when: DateTime<Local>,
    ) -> StoreResult<SnapshotReceipt> {
        let key = practice.id.storage_key();
        let stamp = when.format(SNAPSHOT_TIMESTAMP_FORMAT);

        let document = serde_json::to_value(practice).map_err(|err| StoreError::Corrupt {
            path: folder.to_path_buf(),
            detail: format!("cannot serialize practice for snapshot: {err}"),
        })?;
        let text = canonical_pretty(&document);

        let timestamped = folder.join(format!("{key}_{stamp}.json"));
        let latest = self.backups_dir.join(format!("{key}.json"));
        atomic_write_text(&timestamped, &text)?;
        atomic_write_text(&latest, &text)?;

        let (sql_timestamped, sql_latest) = match mirror {
            Some(conn) => {
                let script = match render_replay_script(conn, &practice.id) {
                    Ok(script) => script,
                    Err(err) => {
                        warn!(
                            "event=snapshot_replay module=backup status=error id={} error={err}",
                            practice.id
                        );
                        placeholder_script(&practice.id, "replay rendering failed")
                    }
                };
                let sql_timestamped = folder.join(format!("{key}_{stamp}.sql"));
                let sql_latest = self.backups_dir.join(format!("{key}.sql"));
                atomic_write_text(&sql_timestamped, &script)?;
                atomic_write_text(&sql_latest, &script)?;
                (Some(sql_timestamped), Some(sql_latest))
            }
            None => (None, None),
        };

        info!(
            "event=snapshot module=backup status=ok id={} timestamped={} latest={}",
            practice.id,
            timestamped.display(),
            latest.display()
        );
        Ok(SnapshotReceipt {
            timestamped,
            latest,
            sql_timestamped,
            sql_latest,
        })
    }
}
