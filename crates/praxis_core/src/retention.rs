//! Retention policies for timestamped snapshots.
//!
//! # Responsibility
//! - Decide which timestamped snapshot copies to keep per practice folder
//!   and delete the rest, under a simple or tiered keep-policy.
//! - Remove "latest" backups whose owning practice folder no longer exists.
//!
//! # Invariants
//! - Deletions are computed first as a plan, then applied; dry-run reports
//!   the identical plan without touching the filesystem.
//! - A snapshot kept by one tier can satisfy other tiers (buckets are
//!   deduplicated).
//! - Per-file failures are logged and skipped; a pass never aborts on one
//!   bad item.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDateTime, TimeZone};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

static SNAPSHOT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<stem>.+)_(?P<dt>\d{8}_\d{6})\.json$").expect("snapshot regex is valid")
});

/// Which keep-policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionStrategy {
    /// Keep the last N, optionally everything newer than `keep_days` days.
    Simple,
    /// Keep the last N plus the newest snapshot per day/week/month bucket.
    Tiered,
}

/// Retention parameters shared by both strategies.
///
/// For `Simple`, `keep_days` means "also keep everything newer than D days".
/// For `Tiered`, `keep_days`/`keep_weeks`/`keep_months` are bucket counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub strategy: RetentionStrategy,
    pub keep_last: usize,
    pub keep_days: Option<u32>,
    pub keep_weeks: Option<u32>,
    pub keep_months: Option<u32>,
    /// Oldest-first eviction among kept snapshots when total size exceeds
    /// this cap.
    pub max_total_bytes: Option<u64>,
}

impl RetentionPolicy {
    pub fn simple(keep_last: usize) -> Self {
        Self {
            strategy: RetentionStrategy::Simple,
            keep_last,
            keep_days: None,
            keep_weeks: None,
            keep_months: None,
            max_total_bytes: None,
        }
    }

    pub fn tiered(keep_last: usize, keep_days: u32, keep_weeks: u32, keep_months: u32) -> Self {
        Self {
            strategy: RetentionStrategy::Tiered,
            keep_last,
            keep_days: Some(keep_days),
            keep_weeks: Some(keep_weeks),
            keep_months: Some(keep_months),
            max_total_bytes: None,
        }
    }
}

/// Deletion plan (and, after apply, the result) for one practice folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionPlan {
    pub kept: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    pub bytes_freed: u64,
}

/// Result of the orphaned-latest-backup sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanCleanup {
    pub removed: Vec<PathBuf>,
    pub bytes_freed: u64,
}

#[derive(Debug, Clone)]
struct SnapshotFile {
    path: PathBuf,
    taken_at: NaiveDateTime,
    size: u64,
}

/// Computes the retention plan for one practice folder at time `now`.
///
/// Passing an explicit `now` keeps dry-run and apply decisions identical.
pub fn plan_retention(
    folder: &Path,
    policy: &RetentionPolicy,
    now: DateTime<Local>,
) -> std::io::Result<RetentionPlan> {
    let mut items = list_snapshots(folder)?;
    // Newest first; path as tiebreaker keeps the plan deterministic.
    items.sort_by(|a, b| b.taken_at.cmp(&a.taken_at).then(a.path.cmp(&b.path)));

    let mut keep: BTreeSet<PathBuf> = items
        .iter()
        .take(policy.keep_last)
        .map(|item| item.path.clone())
        .collect();

    match policy.strategy {
        RetentionStrategy::Simple => {
            if let Some(days) = policy.keep_days {
                let threshold = now.naive_local() - Duration::days(i64::from(days));
                for item in &items {
                    if item.taken_at >= threshold {
                        keep.insert(item.path.clone());
                    }
                }
            }
        }
        RetentionStrategy::Tiered => {
            if let Some(days) = policy.keep_days {
                keep_newest_per_bucket(&items, &mut keep, days as usize, |dt| {
                    dt.format("%Y-%m-%d").to_string()
                });
            }
            if let Some(weeks) = policy.keep_weeks {
                keep_newest_per_bucket(&items, &mut keep, weeks as usize, |dt| {
                    let iso = dt.iso_week();
                    format!("{}-W{:02}", iso.year(), iso.week())
                });
            }
            if let Some(months) = policy.keep_months {
                keep_newest_per_bucket(&items, &mut keep, months as usize, |dt| {
                    dt.format("%Y-%m").to_string()
                });
            }
        }
    }

    if let Some(cap) = policy.max_total_bytes {
        let mut kept_total: u64 = items
            .iter()
            .filter(|item| keep.contains(&item.path))
            .map(|item| item.size)
            .sum();
        // Evict oldest kept snapshots until the cap holds.
        for item in items.iter().rev() {
            if kept_total <= cap {
                break;
            }
            if keep.remove(&item.path) {
                kept_total -= item.size;
            }
        }
    }

    let mut plan = RetentionPlan::default();
    for item in &items {
        if keep.contains(&item.path) {
            plan.kept.push(item.path.clone());
        } else {
            plan.bytes_freed += item.size;
            // A replay-script companion follows its document snapshot.
            let sql_sibling = item.path.with_extension("sql");
            if let Ok(meta) = std::fs::metadata(&sql_sibling) {
                plan.bytes_freed += meta.len();
                plan.deleted.push(sql_sibling);
            }
            plan.deleted.push(item.path.clone());
        }
    }
    Ok(plan)
}

/// Enforces the policy on one practice folder.
///
/// With `dry_run` the returned plan is identical but nothing is deleted.
pub fn enforce_retention(
    folder: &Path,
    policy: &RetentionPolicy,
    dry_run: bool,
) -> std::io::Result<RetentionPlan> {
    let plan = plan_retention(folder, policy, Local::now())?;
    if !dry_run {
        apply_plan(&plan);
    }
    info!(
        "event=retention module=retention status=ok folder={} kept={} deleted={} bytes_freed={} dry_run={dry_run}",
        folder.display(),
        plan.kept.len(),
        plan.deleted.len(),
        plan.bytes_freed
    );
    Ok(plan)
}

/// Enforces the policy for every practice folder under `root`.
pub fn enforce_retention_all(
    root: &Path,
    policy: &RetentionPolicy,
    dry_run: bool,
) -> std::io::Result<BTreeMap<String, RetentionPlan>> {
    let mut results = BTreeMap::new();
    for entry in std::fs::read_dir(root)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("event=retention module=retention status=skip error={err}");
                continue;
            }
        };
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match enforce_retention(&entry.path(), policy, dry_run) {
            Ok(plan) => {
                results.insert(name, plan);
            }
            Err(err) => {
                warn!(
                    "event=retention module=retention status=skip folder={name} error={err}"
                );
            }
        }
    }
    Ok(results)
}

/// Removes latest backups in `backups_dir` whose owning practice folder no
/// longer exists under `practices_root`.
pub fn cleanup_orphan_backups(
    backups_dir: &Path,
    practices_root: &Path,
    dry_run: bool,
) -> std::io::Result<OrphanCleanup> {
    let mut cleanup = OrphanCleanup::default();
    let entries = match std::fs::read_dir(backups_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(cleanup),
        Err(err) => return Err(err),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let is_latest = path
            .extension()
            .map(|ext| ext == "json" || ext == "sql")
            .unwrap_or(false);
        if !is_latest || !entry.file_type()?.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if practices_root.join(stem).is_dir() {
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if !dry_run {
            if let Err(err) = std::fs::remove_file(&path) {
                warn!(
                    "event=orphan_cleanup module=retention status=skip path={} error={err}",
                    path.display()
                );
                continue;
            }
        }
        cleanup.bytes_freed += size;
        cleanup.removed.push(path);
    }
    info!(
        "event=orphan_cleanup module=retention status=ok removed={} bytes_freed={} dry_run={dry_run}",
        cleanup.removed.len(),
        cleanup.bytes_freed
    );
    Ok(cleanup)
}

fn apply_plan(plan: &RetentionPlan) {
    for path in &plan.deleted {
        if let Err(err) = std::fs::remove_file(path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "event=retention module=retention status=skip path={} error={err}",
                    path.display()
                );
            }
        }
    }
}

fn keep_newest_per_bucket(
    items: &[SnapshotFile],
    keep: &mut BTreeSet<PathBuf>,
    limit: usize,
    bucket_key: impl Fn(&NaiveDateTime) -> String,
) {
    if limit == 0 {
        return;
    }
    let mut seen = BTreeSet::new();
    let mut chosen = 0usize;
    for item in items {
        let bucket = bucket_key(&item.taken_at);
        if keep.contains(&item.path) {
            // Already-kept snapshots still cover their bucket.
            seen.insert(bucket);
            continue;
        }
        if !seen.insert(bucket) {
            continue;
        }
        keep.insert(item.path.clone());
        chosen += 1;
        if chosen >= limit {
            break;
        }
    }
}

fn list_snapshots(folder: &Path) -> std::io::Result<Vec<SnapshotFile>> {
    let mut snapshots = Vec::new();
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(snapshots),
        Err(err) => return Err(err),
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(captures) = SNAPSHOT_NAME_RE.captures(name) else {
            continue;
        };
        let meta = entry.metadata()?;
        let taken_at = NaiveDateTime::parse_from_str(&captures["dt"], "%d%m%Y_%H%M%S")
            .ok()
            .or_else(|| mtime_naive(&meta));
        let Some(taken_at) = taken_at else { continue };
        snapshots.push(SnapshotFile {
            path: entry.path(),
            taken_at,
            size: meta.len(),
        });
    }
    Ok(snapshots)
}

fn mtime_naive(meta: &std::fs::Metadata) -> Option<NaiveDateTime> {
    let modified = meta.modified().ok()?;
    let since_epoch = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    Local
        .timestamp_opt(since_epoch.as_secs() as i64, 0)
        .single()
        .map(|dt| dt.naive_local())
}
