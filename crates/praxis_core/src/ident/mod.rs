//! Sequential practice identifier allocation.
//!
//! # Responsibility
//! - Issue unique `sequence/year` identifiers from the persisted per-year
//!   counter, one atomic transaction per allocation.
//! - Detect and surface identifier collisions; never resolve them silently.
//!
//! # Invariants
//! - The counter is a per-year high-water mark: monotonic, decremented only
//!   through `override_counter`.
//! - Allocation fails closed when the counter store is unreachable; callers
//!   must not fabricate identifiers.
//! - A collision with a differently-named practice is always an explicit
//!   caller decision: overwrite the binding or take the next free sequence.

use crate::db::DbError;
use crate::model::practice::PracticeId;
use crate::store::{DocumentStore, StoreError};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

static FOLDER_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)_(\d{4})$").expect("folder key regex is valid"));

pub type IdentResult<T> = Result<T, IdentError>;

/// Error taxonomy for identifier allocation.
#[derive(Debug)]
pub enum IdentError {
    /// The proposed identifier is already bound to a different practice.
    Conflict {
        id: PracticeId,
        existing_name: String,
    },
    Db(DbError),
    Store(StoreError),
    Io(std::io::Error),
}

impl Display for IdentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict { id, existing_name } => write!(
                f,
                "identifier {id} is already bound to practice `{existing_name}`"
            ),
            Self::Db(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IdentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Conflict { .. } => None,
            Self::Db(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<DbError> for IdentError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for IdentError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<StoreError> for IdentError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<std::io::Error> for IdentError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// How a caller resolves an identifier collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentResolution {
    /// Rebind the identifier to the new practice, replacing the old owner.
    Overwrite,
    /// Allocate the next free sequence for the year instead.
    NextAvailable,
}

/// Allocator over the `id_counter` table.
pub struct IdAllocator<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> IdAllocator<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }

    /// Allocates the next unused sequence for `year`.
    ///
    /// Counter read, increment and write happen inside one IMMEDIATE
    /// transaction, so concurrent allocators never observe the same value.
    /// A year seen for the first time is seeded from the stored folders under
    /// `root`, which also recovers from counter/storage drift after manual
    /// file copies.
    pub fn allocate(&mut self, root: &Path, year: i32) -> IdentResult<PracticeId> {
        let seed = highest_stored_sequence(root, year)?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT last_allocated FROM id_counter WHERE year = ?1;",
                [year],
                |row| row.get(0),
            )
            .optional()?;

        let next = match current {
            Some(last) => last.max(i64::from(seed)) + 1,
            None => i64::from(seed) + 1,
        };
        tx.execute(
            "INSERT INTO id_counter (year, last_allocated) VALUES (?1, ?2)
             ON CONFLICT(year) DO UPDATE SET last_allocated = excluded.last_allocated;",
            params![year, next],
        )?;
        tx.commit()?;

        let id = PracticeId::new(next as u32, year);
        info!("event=id_allocate module=ident status=ok id={id}");
        Ok(id)
    }

    /// Administrative override of the per-year high-water mark.
    pub fn override_counter(&mut self, year: i32, last_allocated: u32) -> IdentResult<()> {
        self.conn.execute(
            "INSERT INTO id_counter (year, last_allocated) VALUES (?1, ?2)
             ON CONFLICT(year) DO UPDATE SET last_allocated = excluded.last_allocated;",
            params![year, i64::from(last_allocated)],
        )?;
        warn!(
            "event=id_override module=ident status=ok year={year} last_allocated={last_allocated}"
        );
        Ok(())
    }

    /// Claims `proposed` for the practice named `name`.
    ///
    /// Returns the identifier to use. When `proposed` is already bound to a
    /// practice with a different name the outcome depends on `resolution`:
    /// `None` surfaces `Conflict`, `Overwrite` keeps the proposed id, and
    /// `NextAvailable` falls back to the next free sequence (and raises the
    /// counter past it).
    pub fn claim(
        &mut self,
        root: &Path,
        proposed: PracticeId,
        name: &str,
        resolution: Option<IdentResolution>,
    ) -> IdentResult<PracticeId> {
        let existing = exists(root, proposed.sequence, proposed.year)?;
        match existing {
            None => Ok(proposed),
            Some(existing_name) if existing_name == name => Ok(proposed),
            Some(existing_name) => match resolution {
                None => Err(IdentError::Conflict {
                    id: proposed,
                    existing_name,
                }),
                Some(IdentResolution::Overwrite) => {
                    warn!(
                        "event=id_claim module=ident status=ok id={proposed} mode=overwrite displaced={existing_name}"
                    );
                    Ok(proposed)
                }
                Some(IdentResolution::NextAvailable) => {
                    let sequence = next_available(root, proposed.year)?;
                    let id = PracticeId::new(sequence, proposed.year);
                    self.override_counter(proposed.year, sequence)?;
                    info!("event=id_claim module=ident status=ok id={id} mode=next_available");
                    Ok(id)
                }
            },
        }
    }
}

/// Checks whether `sequence/year` is already bound to a stored practice.
///
/// Returns the existing practice's name, or an empty string when the folder
/// exists but its canonical document is missing or unreadable (the binding
/// still counts as taken).
pub fn exists(root: &Path, sequence: u32, year: i32) -> IdentResult<Option<String>> {
    let id = PracticeId::new(sequence, year);
    let folder = root.join(id.storage_key());
    if !folder.is_dir() {
        return Ok(None);
    }
    match DocumentStore::new().load(&folder) {
        Ok(practice) => Ok(Some(practice.name)),
        Err(StoreError::NotFound(_)) => Ok(Some(String::new())),
        Err(StoreError::Corrupt { path, detail }) => {
            warn!(
                "event=id_exists module=ident status=error id={id} error_code=corrupt_document path={} error={detail}",
                path.display()
            );
            Ok(Some(String::new()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Next free sequence for `year`, from a scan of the stored practice folders.
///
/// Used as the fallback path when a proposed identifier collides.
pub fn next_available(root: &Path, year: i32) -> IdentResult<u32> {
    Ok(highest_stored_sequence(root, year)? + 1)
}

fn highest_stored_sequence(root: &Path, year: i32) -> IdentResult<u32> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };

    let mut highest = 0u32;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(captures) = FOLDER_KEY_RE.captures(name) else {
            continue;
        };
        let folder_year: i32 = captures[2].parse().unwrap_or(0);
        if folder_year != year {
            continue;
        }
        if let Ok(sequence) = captures[1].parse::<u32>() {
            highest = highest.max(sequence);
        }
    }
    Ok(highest)
}
