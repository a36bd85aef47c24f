//! Practice archive facade.
//!
//! # Responsibility
//! - Sequence one save: canonical document first, then mirror reconcile and
//!   dual snapshot for effective writes only.
//! - Drive identifier allocation and collision claims against the shared
//!   counter store.
//!
//! # Invariants
//! - The canonical document is written before any secondary artifact.
//! - Mirror or snapshot failure never rolls back a completed canonical
//!   save; it is reported as a warning on the receipt.
//! - An unchanged save produces no mirror write and no snapshot.

use crate::backup::{SnapshotReceipt, SnapshotWriter};
use crate::config::ArchiveConfig;
use crate::db::{open_db, DbError};
use crate::ident::{IdAllocator, IdentError, IdentResolution};
use crate::model::practice::{Practice, PracticeId};
use crate::reindex::{reindex, ReindexReport};
use crate::repo::{PracticeRepository, RepoError, SqlitePracticeRepository};
use crate::retention::{
    cleanup_orphan_backups, enforce_retention_all, OrphanCleanup, RetentionPlan,
};
use crate::store::{content_hash, practice_folder, DocumentStore, SaveStatus, StoreError};
use chrono::{Datelike, Local};
use log::warn;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Fatal errors of the orchestration layer.
///
/// Mirror and snapshot degradations are not here; they surface as
/// [`SaveReceipt::warnings`].
#[derive(Debug)]
pub enum ServiceError {
    Store(StoreError),
    Ident(IdentError),
    Db(DbError),
    Repo(RepoError),
    Io(std::io::Error),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Ident(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Ident(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<IdentError> for ServiceError {
    fn from(value: IdentError) -> Self {
        Self::Ident(value)
    }
}

impl From<DbError> for ServiceError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// What one save actually did.
#[derive(Debug)]
pub struct SaveReceipt {
    pub canonical_path: PathBuf,
    pub status: SaveStatus,
    /// Whether the mirror reflects this save.
    pub mirror_synced: bool,
    pub snapshot: Option<SnapshotReceipt>,
    /// Human-readable degradations (mirror or snapshot failures).
    pub warnings: Vec<String>,
}

/// Facade owning the mirror connection and the archive layout.
pub struct PracticeService {
    config: ArchiveConfig,
    conn: Connection,
    store: DocumentStore,
    snapshots: SnapshotWriter,
}

impl PracticeService {
    /// Opens the archive: mirror database (migrated) plus store and
    /// snapshot writer over the configured layout.
    pub fn open(config: ArchiveConfig) -> ServiceResult<Self> {
        let conn = open_db(&config.mirror_db_path)?;
        let snapshots = SnapshotWriter::new(config.backups_dir.clone());
        Ok(Self {
            config,
            conn,
            store: DocumentStore::new(),
            snapshots,
        })
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Creates a new practice for `year` under a freshly allocated
    /// identifier and performs its first save.
    pub fn create_practice(
        &mut self,
        name: &str,
        year: Option<i32>,
        actor: &str,
    ) -> ServiceResult<(Practice, SaveReceipt)> {
        let year = year.unwrap_or_else(|| Local::now().year());
        let id = IdAllocator::new(&mut self.conn).allocate(&self.config.practices_root, year)?;
        let mut practice = Practice::new(id, name.to_string());
        practice.opened_on = Some(Local::now().date_naive());
        let receipt = self.save_practice(&mut practice, actor)?;
        Ok((practice, receipt))
    }

    /// Claims `proposed` for a practice named `name`, resolving collisions
    /// per `resolution` (see [`IdAllocator::claim`]).
    pub fn claim_identifier(
        &mut self,
        proposed: PracticeId,
        name: &str,
        resolution: Option<IdentResolution>,
    ) -> ServiceResult<PracticeId> {
        Ok(IdAllocator::new(&mut self.conn).claim(
            &self.config.practices_root,
            proposed,
            name,
            resolution,
        )?)
    }

    /// Saves the aggregate: canonical document, then mirror and snapshot on
    /// an effective write.
    ///
    /// Returns `Err` only for canonical failures. Mirror or snapshot
    /// failures leave the canonical save intact and land in
    /// [`SaveReceipt::warnings`].
    pub fn save_practice(
        &mut self,
        practice: &mut Practice,
        actor: &str,
    ) -> ServiceResult<SaveReceipt> {
        let folder = practice_folder(&self.config.practices_root, &practice.id);
        let status = self.store.save(&folder, practice, actor)?;

        let mut warnings = Vec::new();
        let mut mirror_synced = false;
        let mut snapshot = None;

        if status.is_written() {
            mirror_synced = match self.sync_mirror(practice) {
                Ok(()) => true,
                Err(err) => {
                    warn!(
                        "event=save module=service status=error id={} stage=mirror error={err}",
                        practice.id
                    );
                    warnings.push(format!("mirror sync failed: {err}"));
                    false
                }
            };

            let mirror = mirror_synced.then_some(&self.conn);
            match self.snapshots.snapshot(&folder, practice, mirror) {
                Ok(receipt) => snapshot = Some(receipt),
                Err(err) => {
                    warn!(
                        "event=save module=service status=error id={} stage=snapshot error={err}",
                        practice.id
                    );
                    warnings.push(format!("snapshot failed: {err}"));
                }
            }
        }

        Ok(SaveReceipt {
            canonical_path: status.path().to_path_buf(),
            status,
            mirror_synced,
            snapshot,
            warnings,
        })
    }

    /// Loads the canonical document for `id`.
    pub fn load_practice(&self, id: &PracticeId) -> ServiceResult<Practice> {
        let folder = practice_folder(&self.config.practices_root, id);
        Ok(self.store.load(&folder)?)
    }

    /// Rebuilds the mirror from the canonical corpus.
    pub fn reindex(&mut self, purge: bool) -> ServiceResult<ReindexReport> {
        let root = self.config.practices_root.clone();
        let mut repo = SqlitePracticeRepository::try_new(&mut self.conn)?;
        Ok(reindex(&mut repo, &root, purge)?)
    }

    /// Applies the configured retention policy across every practice folder.
    pub fn enforce_retention(
        &self,
        dry_run: bool,
    ) -> ServiceResult<BTreeMap<String, RetentionPlan>> {
        Ok(enforce_retention_all(
            &self.config.practices_root,
            &self.config.retention,
            dry_run,
        )?)
    }

    /// Removes latest backups for practices that no longer exist.
    pub fn cleanup_backups(&self, dry_run: bool) -> ServiceResult<OrphanCleanup> {
        Ok(cleanup_orphan_backups(
            &self.config.backups_dir,
            &self.config.practices_root,
            dry_run,
        )?)
    }

    fn sync_mirror(&mut self, practice: &Practice) -> Result<(), RepoError> {
        let document = serde_json::to_value(practice)
            .map_err(|err| RepoError::InvalidData(format!("cannot serialize practice: {err}")))?;
        let hash = content_hash(&document);
        let mut repo = SqlitePracticeRepository::try_new(&mut self.conn)?;
        repo.upsert(practice)?;
        repo.record_content_hash(&practice.id, &hash)?;
        Ok(())
    }
}
