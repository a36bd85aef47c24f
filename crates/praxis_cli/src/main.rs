//! Praxis archive maintenance CLI.
//!
//! Commands cover the out-of-band maintenance flows: mirror reindexing,
//! snapshot retention and orphaned-backup cleanup. Day-to-day saves go
//! through applications embedding `praxis_core`.

use clap::{Parser, Subcommand};
use praxis_core::{ArchiveConfig, PracticeService, RetentionPolicy};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "praxis")]
#[command(version, about = "Practice archive maintenance")]
struct Cli {
    /// Practices root directory (defaults to $PRAXIS_ROOT, then ./practices).
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Mirror database file (defaults to $PRAXIS_DB).
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Central backups directory (defaults to $PRAXIS_BACKUPS).
    #[arg(long, global = true)]
    backups: Option<PathBuf>,
    /// Directory for rolling log files; logging is disabled when unset.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the relational mirror from the canonical documents.
    Reindex {
        /// Empty the mirror first so rows for deleted practices disappear.
        #[arg(long)]
        purge: bool,
    },
    /// Apply the snapshot retention policy across all practice folders.
    Retention {
        /// Keep the newest N snapshots unconditionally.
        #[arg(long, default_value_t = 3)]
        keep_last: usize,
        /// Day tier: bucket count (tiered) or age window in days (simple).
        #[arg(long)]
        keep_days: Option<u32>,
        /// Week tier bucket count (tiered policy only).
        #[arg(long)]
        keep_weeks: Option<u32>,
        /// Month tier bucket count (tiered policy only).
        #[arg(long)]
        keep_months: Option<u32>,
        /// Evict oldest kept snapshots beyond this total size per folder.
        #[arg(long)]
        max_total_bytes: Option<u64>,
        /// Use the simple last-N/age policy instead of the tiered one.
        #[arg(long)]
        simple: bool,
        /// Report the plan as JSON without deleting anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove latest backups whose practice folder no longer exists.
    CleanupBackups {
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let log_dir = log_dir.to_string_lossy();
        if let Err(err) =
            praxis_core::init_logging(praxis_core::default_log_level(), log_dir.as_ref())
        {
            eprintln!("warning: {err}");
        }
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.root {
        Some(root) => ArchiveConfig::rooted(root.clone()),
        None => ArchiveConfig::from_env(),
    };
    if let Some(db) = &cli.db {
        config.mirror_db_path = db.clone();
    }
    if let Some(backups) = &cli.backups {
        config.backups_dir = backups.clone();
    }

    match cli.command {
        Commands::Reindex { purge } => {
            let mut service = PracticeService::open(config)?;
            let report = service.reindex(purge)?;
            println!(
                "reindex: inserted={} updated={} skipped={} failed={}",
                report.inserted, report.updated, report.skipped, report.failed
            );
            Ok(())
        }
        Commands::Retention {
            keep_last,
            keep_days,
            keep_weeks,
            keep_months,
            max_total_bytes,
            simple,
            dry_run,
        } => {
            let mut policy = if simple {
                let mut policy = RetentionPolicy::simple(keep_last);
                policy.keep_days = keep_days;
                policy
            } else {
                RetentionPolicy::tiered(
                    keep_last,
                    keep_days.unwrap_or(7),
                    keep_weeks.unwrap_or(4),
                    keep_months.unwrap_or(12),
                )
            };
            policy.max_total_bytes = max_total_bytes;
            config.retention = policy;

            let service = PracticeService::open(config)?;
            let plans = service.enforce_retention(dry_run)?;
            println!("{}", serde_json::to_string_pretty(&plans)?);
            Ok(())
        }
        Commands::CleanupBackups { dry_run } => {
            let service = PracticeService::open(config)?;
            let cleanup = service.cleanup_backups(dry_run)?;
            println!("{}", serde_json::to_string_pretty(&cleanup)?);
            Ok(())
        }
    }
}
