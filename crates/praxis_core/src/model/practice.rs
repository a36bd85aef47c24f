//! Practice aggregate model.
//!
//! # Responsibility
//! - Define the root practice record and its five owned child collections.
//! - Provide validation for the write path and id/uid lifecycle helpers.
//!
//! # Invariants
//! - `PracticeId` is unique within its year and immutable once persisted;
//!   collisions are resolved before the first write, never by renaming.
//! - Child row `uid`s are unique within their collection; list position is
//!   advisory ordering, never identity.
//! - Unknown document fields round-trip through `extra` untouched.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier for one child row, used as the sole reconciliation key
/// between successive saves.
pub type RowId = Uuid;

fn fresh_row_id() -> RowId {
    Uuid::new_v4()
}

/// Natural practice identifier: sequence number within a year.
///
/// Renders as `"12/2025"`; `storage_key()` yields the filesystem-safe form
/// `"12_2025"` used for folder and snapshot names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PracticeId {
    pub sequence: u32,
    pub year: i32,
}

impl PracticeId {
    pub fn new(sequence: u32, year: i32) -> Self {
        Self { sequence, year }
    }

    /// Filesystem-safe identifier with the separator replaced.
    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.sequence, self.year)
    }
}

impl Display for PracticeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.sequence, self.year)
    }
}

/// Error for malformed practice identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeIdParseError {
    pub input: String,
}

impl Display for PracticeIdParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid practice id `{}`; expected `<sequence>/<year>`",
            self.input
        )
    }
}

impl Error for PracticeIdParseError {}

impl FromStr for PracticeId {
    type Err = PracticeIdParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // Accepts both the display form `12/2025` and the storage form
        // `12_2025` found in folder names and legacy documents.
        let trimmed = value.trim();
        let (seq_text, year_text) = trimmed
            .split_once('/')
            .or_else(|| trimmed.split_once('_'))
            .ok_or_else(|| PracticeIdParseError {
                input: value.to_string(),
            })?;
        let sequence = seq_text.parse::<u32>().map_err(|_| PracticeIdParseError {
            input: value.to_string(),
        })?;
        let year = year_text.parse::<i32>().map_err(|_| PracticeIdParseError {
            input: value.to_string(),
        })?;
        if sequence == 0 || !(1900..=9999).contains(&year) {
            return Err(PracticeIdParseError {
                input: value.to_string(),
            });
        }
        Ok(Self { sequence, year })
    }
}

impl Serialize for PracticeId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PracticeId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Staff member assigned to a practice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffAssignment {
    /// Stable row id; assigned once, never changes.
    #[serde(default = "fresh_row_id")]
    pub uid: RowId,
    pub role: Option<String>,
    pub contact: Option<String>,
    pub name: Option<String>,
}

impl StaffAssignment {
    pub fn new(role: impl Into<String>, contact: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: fresh_row_id(),
            role: Some(role.into()),
            contact: Some(contact.into()),
            name: Some(name.into()),
        }
    }
}

/// Billing line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingLine {
    #[serde(default = "fresh_row_id")]
    pub uid: RowId,
    pub kind: Option<String>,
    pub amount: Option<f64>,
    pub note: Option<String>,
}

/// Logged activity (time entry) on a practice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(default = "fresh_row_id")]
    pub uid: RowId,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub description: Option<String>,
    pub duration_min: Option<i64>,
    pub rate: Option<f64>,
    pub note: Option<String>,
}

/// Deadline attached to a practice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlineEntry {
    #[serde(default = "fresh_row_id")]
    pub uid: RowId,
    pub due_on: Option<NaiveDate>,
    pub description: Option<String>,
    #[serde(default)]
    pub done: bool,
    pub note: Option<String>,
}

/// Reference to a filed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    #[serde(default = "fresh_row_id")]
    pub uid: RowId,
    pub path: Option<String>,
    pub category: Option<String>,
    pub note: Option<String>,
    pub content_hash: Option<String>,
}

/// Root case-file aggregate.
///
/// The aggregate is always persisted whole; there are no partial-field
/// patches. Fields not modelled here survive in `extra` so older documents
/// and newer writers coexist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Practice {
    pub id: PracticeId,
    pub name: String,
    pub opened_on: Option<NaiveDate>,
    pub closed_on: Option<NaiveDate>,
    /// Free-form monetary value, kept as entered.
    pub value: Option<String>,
    pub practice_type: Option<String>,
    pub sector: Option<String>,
    pub matter: Option<String>,
    pub lead_contact: Option<String>,
    #[serde(default)]
    pub estimate_sent: bool,
    pub notes: Option<String>,
    /// Managed by the document store; bumped only on effective writes.
    pub updated_at: Option<DateTime<Utc>>,
    /// Storage location of the practice folder, when known.
    pub directory: Option<String>,
    #[serde(default)]
    pub staff: Vec<StaffAssignment>,
    #[serde(default)]
    pub billing: Vec<BillingLine>,
    #[serde(default)]
    pub activities: Vec<ActivityEntry>,
    #[serde(default)]
    pub deadlines: Vec<DeadlineEntry>,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Practice {
    /// Creates an empty practice shell for a freshly allocated identifier.
    pub fn new(id: PracticeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            opened_on: None,
            closed_on: None,
            value: None,
            practice_type: None,
            sector: None,
            matter: None,
            lead_contact: None,
            estimate_sent: false,
            notes: None,
            updated_at: None,
            directory: None,
            staff: Vec::new(),
            billing: Vec::new(),
            activities: Vec::new(),
            deadlines: Vec::new(),
            documents: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Validates the aggregate before any write.
    ///
    /// # Errors
    /// - `MissingField` when a required field is empty.
    /// - `DuplicateRowId` when a child collection contains the same uid twice.
    pub fn validate(&self) -> Result<(), PracticeValidationError> {
        if self.name.trim().is_empty() {
            return Err(PracticeValidationError::MissingField("name"));
        }
        if self.opened_on.is_none() {
            return Err(PracticeValidationError::MissingField("opened_on"));
        }
        check_unique_uids("staff", self.staff.iter().map(|r| r.uid))?;
        check_unique_uids("billing", self.billing.iter().map(|r| r.uid))?;
        check_unique_uids("activities", self.activities.iter().map(|r| r.uid))?;
        check_unique_uids("deadlines", self.deadlines.iter().map(|r| r.uid))?;
        check_unique_uids("documents", self.documents.iter().map(|r| r.uid))?;
        Ok(())
    }
}

fn check_unique_uids(
    collection: &'static str,
    uids: impl Iterator<Item = RowId>,
) -> Result<(), PracticeValidationError> {
    let mut seen = BTreeSet::new();
    for uid in uids {
        if !seen.insert(uid) {
            return Err(PracticeValidationError::DuplicateRowId { collection, uid });
        }
    }
    Ok(())
}

/// Validation failure raised before any persistence happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PracticeValidationError {
    MissingField(&'static str),
    DuplicateRowId {
        collection: &'static str,
        uid: RowId,
    },
}

impl Display for PracticeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "required field `{field}` is missing"),
            Self::DuplicateRowId { collection, uid } => {
                write!(f, "duplicate row id `{uid}` in `{collection}`")
            }
        }
    }
}

impl Error for PracticeValidationError {}
