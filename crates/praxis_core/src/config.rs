//! Archive configuration.
//!
//! # Responsibility
//! - Resolve the filesystem layout (practices root, mirror database, central
//!   backup directory) and the retention policy from explicit values or the
//!   environment.
//!
//! # Invariants
//! - Defaults keep everything under one archive root, so a fresh deployment
//!   needs a single directory.

use crate::retention::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_ROOT: &str = "PRAXIS_ROOT";
pub const ENV_DB: &str = "PRAXIS_DB";
pub const ENV_BACKUPS: &str = "PRAXIS_BACKUPS";

const DEFAULT_ROOT: &str = "practices";
const DEFAULT_DB_FILE: &str = "praxis.db";
const DEFAULT_BACKUPS_DIR: &str = "backups";

/// Filesystem layout and retention policy for one archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Directory holding one folder per practice.
    pub practices_root: PathBuf,
    /// SQLite mirror database file.
    pub mirror_db_path: PathBuf,
    /// Central directory for "latest" backup copies.
    pub backups_dir: PathBuf,
    pub retention: RetentionPolicy,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self::rooted(PathBuf::from(DEFAULT_ROOT))
    }
}

impl ArchiveConfig {
    /// Layout with mirror and backups as siblings of the practices root.
    pub fn rooted(practices_root: PathBuf) -> Self {
        let base = practices_root
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            mirror_db_path: base.join(DEFAULT_DB_FILE),
            backups_dir: base.join(DEFAULT_BACKUPS_DIR),
            practices_root,
            retention: RetentionPolicy::tiered(3, 7, 4, 12),
        }
    }

    /// Reads the layout from `PRAXIS_ROOT`, `PRAXIS_DB` and `PRAXIS_BACKUPS`,
    /// falling back to the rooted defaults for anything unset.
    pub fn from_env() -> Self {
        let root = std::env::var_os(ENV_ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));
        let mut config = Self::rooted(root);
        if let Some(db) = std::env::var_os(ENV_DB) {
            config.mirror_db_path = PathBuf::from(db);
        }
        if let Some(backups) = std::env::var_os(ENV_BACKUPS) {
            config.backups_dir = PathBuf::from(backups);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::ArchiveConfig;
    use std::path::PathBuf;

    #[test]
    fn rooted_layout_uses_sibling_paths() {
        let config = ArchiveConfig::rooted(PathBuf::from("/srv/archive/practices"));
        assert_eq!(config.mirror_db_path, PathBuf::from("/srv/archive/praxis.db"));
        assert_eq!(config.backups_dir, PathBuf::from("/srv/archive/backups"));
    }
}
