//! Canonical document store for practice case files.
//!
//! # Responsibility
//! - Own the authoritative `practice.json` per practice folder.
//! - Guard writes with a per-document advisory lock and keep an append-only
//!   `history.jsonl` audit trail.
//!
//! # Invariants
//! - The canonical document is the single source of truth; mirror and
//!   snapshot state is always reconstructible from it.
//! - A reader never observes a partially written document (temp-then-rename).
//! - A byte-identical save is a no-op: no rewrite, no history entry.

use crate::model::practice::PracticeValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod document;
mod history;
mod lock;

pub use document::{
    atomic_write_text, canonical_compact, canonical_pretty, content_hash, practice_folder,
    DocumentStore, SaveStatus, DOCUMENT_FILE,
};
pub use history::{append_history, read_history, HistoryEntry, HISTORY_FILE};
pub use lock::DocumentLock;

pub type StoreResult<T> = Result<T, StoreError>;

/// Error taxonomy for the canonical store.
#[derive(Debug)]
pub enum StoreError {
    /// No canonical document exists at the given location.
    NotFound(PathBuf),
    /// Stored bytes are not a valid practice document.
    Corrupt { path: PathBuf, detail: String },
    /// The per-document lock could not be acquired within the bounded wait.
    LockTimeout(PathBuf),
    /// The aggregate failed validation before any write happened.
    Validation(PracticeValidationError),
    Io(std::io::Error),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "canonical document not found: {}", path.display()),
            Self::Corrupt { path, detail } => {
                write!(f, "corrupt document {}: {detail}", path.display())
            }
            Self::LockTimeout(path) => {
                write!(f, "timed out acquiring document lock on {}", path.display())
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PracticeValidationError> for StoreError {
    fn from(value: PracticeValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
