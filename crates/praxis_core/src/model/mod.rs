//! Domain model for practice case files.
//!
//! # Responsibility
//! - Define the canonical practice aggregate and its child collections.
//! - Keep one shape shared by the document store and the relational mirror.
//!
//! # Invariants
//! - Every practice is identified by a natural `PracticeId` (`sequence/year`).
//! - Every child row carries a stable `RowId` assigned once at creation.

pub mod practice;
