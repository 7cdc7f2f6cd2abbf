//! `backup-worker`: one cycle of the content backup worker.
//!
//! Meant to be started by cron (under `flock`, so cycles never overlap).
//! Each invocation drains the lifecycle queue into the SQLite ledger,
//! archives completed runs, retries stale pending copies for up to the
//! configured budget, and exits.

use anyhow::Context;
use backup_core::{BackupCycle, SystemClock};
use backup_db::{LedgerPool, SqliteConfig};
use backup_worker::{JetStreamQueue, S3Copier, WorkerConfig, logging};
use tracing::info;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, setup, or any cycle stage fails. The
/// process then exits non-zero and cron reports it.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    info!("backup-worker starting");

    let config = WorkerConfig::from_env().context("failed to load configuration")?;
    info!(
        database = %config.database_path,
        nats_url = %config.queue.nats_url,
        stream = %config.queue.stream,
        source_bucket = %config.route.source_bucket,
        target_bucket = %config.route.target_bucket,
        batch_size = config.cycle.batch_size,
        budget_secs = config.cycle.scheduler.budget.as_secs(),
        stale_after_secs = config.cycle.scheduler.stale_after.as_secs(),
        "configuration loaded"
    );

    let ledger = LedgerPool::connect(&SqliteConfig::file(&config.database_path))
        .await
        .with_context(|| format!("failed to open ledger at {}", config.database_path))?;
    let queue = JetStreamQueue::connect(&config.queue)
        .await
        .context("failed to connect to the lifecycle queue")?;
    let copier = S3Copier::new(&config.s3).await;
    let clock = SystemClock;

    let result = BackupCycle::new(&ledger, &queue, &copier, &clock, config.route)
        .with_settings(config.cycle)
        .run()
        .await;
    ledger.close().await;

    let report = result.context("backup cycle failed")?;
    info!(
        messages = report.drained.messages,
        archived = report.archived,
        copied = report.copies.copied.len(),
        stop = ?report.copies.stop,
        "backup-worker finished"
    );
    Ok(())
}
