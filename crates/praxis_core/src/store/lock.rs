//! Per-document advisory lock files.
//!
//! # Responsibility
//! - Serialize writers of one canonical document across processes.
//!
//! # Invariants
//! - The lock is scoped to a single document path (`<file>.lock`).
//! - Waiting is bounded; a lock file older than the staleness threshold is
//!   treated as abandoned by a crashed holder and reclaimed.

use super::{StoreError, StoreResult};
use log::warn;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Guard for one document's lock file; releases the lock on drop.
#[derive(Debug)]
pub struct DocumentLock {
    lock_path: PathBuf,
}

impl DocumentLock {
    /// Acquires the lock for `target`, waiting at most `wait`.
    ///
    /// # Errors
    /// - `LockTimeout` when another live holder keeps the lock past `wait`.
    /// - `Io` on filesystem failures while creating the lock file.
    pub fn acquire(target: &Path, wait: Duration, stale_after: Duration) -> StoreResult<Self> {
        let lock_path = lock_path_for(target);
        let started = Instant::now();

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    // Informational content only; staleness is judged by mtime.
                    let _ = writeln!(
                        file,
                        "{} @ {}",
                        std::process::id(),
                        chrono::Utc::now().to_rfc3339()
                    );
                    return Ok(Self { lock_path });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&lock_path, stale_after) {
                        warn!(
                            "event=lock_reclaim module=store status=ok path={}",
                            lock_path.display()
                        );
                        let _ = std::fs::remove_file(&lock_path);
                        continue;
                    }
                    if started.elapsed() > wait {
                        return Err(StoreError::LockTimeout(target.to_path_buf()));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    name.push_str(".lock");
    target.with_file_name(name)
}

fn lock_is_stale(lock_path: &Path, stale_after: Duration) -> bool {
    let Ok(meta) = std::fs::metadata(lock_path) else {
        // Vanished between the failed create and this check.
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > stale_after)
        .unwrap_or(false)
}
