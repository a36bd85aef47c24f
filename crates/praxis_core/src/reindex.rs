//! Corpus reindexing: folder tree into the relational mirror.
//!
//! # Responsibility
//! - Walk the practices root, parse every canonical document and reconcile
//!   it into the mirror.
//! - Skip documents whose content hash matches the recorded one, so repeat
//!   passes over an unchanged corpus write nothing.
//!
//! # Invariants
//! - One malformed document never aborts the pass; it is counted and
//!   logged, and the walk continues.
//! - Purge mode empties the mirror before the walk, so stale rows for
//!   deleted practices disappear.

use crate::model::practice::{Practice, PracticeId};
use crate::repo::{PracticeRepository, RepoError};
use crate::store::{content_hash, DocumentStore, StoreError, DOCUMENT_FILE};
use log::{info, warn};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use walkdir::WalkDir;

/// Directories never descended into during the corpus walk.
const SKIPPED_DIRS: &[&str] = &[".git", ".svn", "__pycache__", "node_modules"];

pub type ReindexResult<T> = Result<T, RepoError>;

/// Tally of one reindex pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ReindexReport {
    pub fn scanned(&self) -> usize {
        self.inserted + self.updated + self.skipped + self.failed
    }
}

/// Rebuilds the mirror from every canonical document under `root`.
///
/// With `purge` the mirror is emptied first; otherwise unchanged documents
/// (by content hash) are skipped and rows for practices no longer on disk
/// are left in place.
pub fn reindex(
    repo: &mut dyn PracticeRepository,
    root: &Path,
    purge: bool,
) -> ReindexResult<ReindexReport> {
    if purge {
        repo.clear()?;
        info!("event=reindex_purge module=reindex status=ok");
    }

    let mut report = ReindexReport::default();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| !SKIPPED_DIRS.contains(&name))
                .unwrap_or(true)
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("event=reindex module=reindex status=skip error={err}");
                report.failed += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() || entry.file_name().to_str() != Some(DOCUMENT_FILE) {
            continue;
        }
        let folder = match entry.path().parent() {
            Some(folder) => folder,
            None => continue,
        };
        match index_one(repo, folder, purge) {
            Ok(Outcome::Inserted) => report.inserted += 1,
            Ok(Outcome::Updated) => report.updated += 1,
            Ok(Outcome::Skipped) => report.skipped += 1,
            Err(err) => {
                warn!(
                    "event=reindex module=reindex status=skip folder={} error={err}",
                    folder.display()
                );
                report.failed += 1;
            }
        }
    }

    info!(
        "event=reindex module=reindex status=ok inserted={} updated={} skipped={} failed={} purge={purge}",
        report.inserted, report.updated, report.skipped, report.failed
    );
    Ok(report)
}

enum Outcome {
    Inserted,
    Updated,
    Skipped,
}

fn index_one(
    repo: &mut dyn PracticeRepository,
    folder: &Path,
    purged: bool,
) -> Result<Outcome, IndexError> {
    let practice = DocumentStore::new().load(folder)?;
    check_folder_identity(folder, &practice)?;

    let document =
        serde_json::to_value(&practice).map_err(|err| IndexError::Serialize(err.to_string()))?;
    let hash = content_hash(&document);

    // After a purge the recorded hashes are gone, so every document writes.
    if !purged {
        if let Some(stored) = repo.stored_content_hash(&practice.id)? {
            if stored == hash {
                return Ok(Outcome::Skipped);
            }
        }
    }

    let known =
        repo.stored_content_hash(&practice.id)?.is_some() || repo.load(&practice.id)?.is_some();

    repo.upsert(&practice)?;
    repo.record_content_hash(&practice.id, &hash)?;
    Ok(if known {
        Outcome::Updated
    } else {
        Outcome::Inserted
    })
}

/// The folder name is authoritative for identity: a document whose embedded
/// id disagrees with the folder it lives in is treated as malformed.
fn check_folder_identity(folder: &Path, practice: &Practice) -> Result<(), IndexError> {
    let Some(name) = folder.file_name().and_then(|n| n.to_str()) else {
        return Err(IndexError::IdentityMismatch {
            folder: folder.display().to_string(),
            document_id: practice.id,
        });
    };
    match PracticeId::from_str(name) {
        Ok(folder_id) if folder_id == practice.id => Ok(()),
        _ => Err(IndexError::IdentityMismatch {
            folder: folder.display().to_string(),
            document_id: practice.id,
        }),
    }
}

#[derive(Debug)]
enum IndexError {
    Store(StoreError),
    Repo(RepoError),
    Serialize(String),
    IdentityMismatch {
        folder: String,
        document_id: PracticeId,
    },
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Serialize(detail) => write!(f, "cannot serialize document: {detail}"),
            Self::IdentityMismatch {
                folder,
                document_id,
            } => write!(
                f,
                "folder `{folder}` does not match document id {document_id}"
            ),
        }
    }
}

impl From<StoreError> for IndexError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<RepoError> for IndexError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}
