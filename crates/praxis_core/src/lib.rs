//! Persistence and synchronization engine for practice case files.
//!
//! The canonical `practice.json` per practice folder is the single source
//! of truth. The SQLite mirror, the dual-save snapshots and the SQL replay
//! scripts are all derived artifacts, reconstructible from the canonical
//! documents at any time.

pub mod backup;
pub mod config;
pub mod db;
pub mod ident;
pub mod logging;
pub mod model;
pub mod reindex;
pub mod repo;
pub mod retention;
pub mod service;
pub mod store;

pub use backup::{SnapshotReceipt, SnapshotWriter};
pub use config::ArchiveConfig;
pub use ident::{IdAllocator, IdentError, IdentResolution};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::practice::{Practice, PracticeId, PracticeValidationError};
pub use reindex::{reindex, ReindexReport};
pub use repo::{PracticeRepository, RepoError, RepoResult, SqlitePracticeRepository};
pub use retention::{
    cleanup_orphan_backups, enforce_retention, enforce_retention_all, RetentionPlan,
    RetentionPolicy, RetentionStrategy,
};
pub use service::{PracticeService, SaveReceipt, ServiceError, ServiceResult};
pub use store::{DocumentStore, SaveStatus, StoreError, StoreResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
