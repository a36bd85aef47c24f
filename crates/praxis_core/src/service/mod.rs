//! Orchestration over store, mirror, snapshots and identifiers.
//!
//! # Responsibility
//! - Expose the save/open flows callers use, sequencing canonical write,
//!   mirror sync and snapshot per effective save.
//!
//! # Invariants
//! - Canonical failures abort the operation; mirror and snapshot failures
//!   degrade to warnings on the receipt.

pub mod practice_service;

pub use practice_service::{PracticeService, SaveReceipt, ServiceError, ServiceResult};
