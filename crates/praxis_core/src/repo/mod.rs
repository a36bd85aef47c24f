//! Relational mirror of the canonical practice documents.
//!
//! # Responsibility
//! - Define the mirror's data access contract and its SQLite implementation.
//! - Keep SQL and reconciliation details inside the persistence boundary.
//!
//! # Invariants
//! - The mirror is secondary: it is always reconstructible from the
//!   canonical documents and its failures never invalidate a canonical save.
//! - Child rows are reconciled by stable uid only, never by field equality.

use crate::db::DbError;
use crate::model::practice::{PracticeId, PracticeValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod practice_repo;
pub(crate) mod reconcile;

pub use practice_repo::{PracticeRepository, SqlitePracticeRepository};

pub type RepoResult<T> = Result<T, RepoError>;

/// Error for mirror persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(PracticeValidationError),
    Db(DbError),
    NotFound(PracticeId),
    InvalidData(String),
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "practice not found in mirror: {id}"),
            Self::InvalidData(message) => write!(f, "invalid mirrored data: {message}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "mirror schema is missing required table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PracticeValidationError> for RepoError {
    fn from(value: PracticeValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
