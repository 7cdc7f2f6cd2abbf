//! `backup-notify`: publish lifecycle events for newly created objects.
//!
//! Reads one S3 object-created notification from stdin. For every record it
//! publishes `start`, then either copies the object inline and publishes
//! `end` or `error`, or publishes `too_big` for objects at or above the size
//! ceiling. Runs left pending are retried later by `backup-worker`.

use std::io::Read;

use anyhow::Context;
use backup_core::{Producer, ProducerOutcome, SystemClock};
use backup_worker::notify::handle_notification;
use backup_worker::{JetStreamPublisher, NotifyConfig, S3Copier, logging};
use tracing::info;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, reading stdin, parsing the
/// notification, or publishing an event fails. A failed inline copy is not
/// an error.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = NotifyConfig::from_env().context("failed to load configuration")?;

    let mut body = Vec::new();
    std::io::stdin()
        .read_to_end(&mut body)
        .context("failed to read notification from stdin")?;

    let publisher = JetStreamPublisher::connect(&config.queue)
        .await
        .context("failed to connect to the lifecycle queue")?;
    let copier = S3Copier::new(&config.s3).await;
    let clock = SystemClock;
    let producer = Producer::new(&publisher, &copier, &clock, config.route)
        .with_size_ceiling(config.size_ceiling);

    let outcomes = handle_notification(&producer, &body)
        .await
        .context("failed to handle notification")?;

    let failed = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, ProducerOutcome::CopyFailed { .. }))
        .count();
    info!(records = outcomes.len(), failed, "backup-notify finished");
    Ok(())
}
