//! Dual-save snapshots and relational replay scripts.
//!
//! # Responsibility
//! - On every effective save, produce a timestamped immutable copy in the
//!   practice folder and an overwritable "latest" copy in the central
//!   backup directory.
//! - Optionally render a per-practice SQL replay script for out-of-band
//!   transport between mirror databases.
//!
//! # Invariants
//! - Snapshot writes use the same temp-then-rename atomicity as the
//!   canonical store.
//! - Replay rendering failure degrades to a placeholder comment; it never
//!   aborts the snapshot.

mod replay;
mod snapshot;

pub use replay::render_replay_script;
pub use snapshot::{SnapshotReceipt, SnapshotWriter};
