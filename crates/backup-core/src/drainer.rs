//! Applies queued lifecycle events to the ledger.
//!
//! The drainer fetches batches until a fetch comes back empty. There is no
//! cap on the number of batches: a producer that outpaces the drain keeps it
//! running. Each message is applied and only then deleted, so a failure
//! anywhere in a batch leaves the rest of the batch on the queue for
//! redelivery.
//!
//! | kind      | effect                                   |
//! |-----------|------------------------------------------|
//! | `start`   | upsert `start_time`                      |
//! | `end`     | upsert `end_time`                        |
//! | `error`   | logged; the run stays pending            |
//! | `too_big` | logged; no row change                    |
//! | other     | [`CycleError::UnknownEventKind`], stop   |
//!
//! A `start` or `end` for a run that is already archived is acknowledged
//! without touching the ledger.

use backup_db::{ArchiveStore, BackupStore, LedgerPool, Upsert};
use backup_types::{EventKind, LifecycleEvent};
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::error::CycleError;
use crate::queue::EventQueue;

/// Default number of messages fetched per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// What applying one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A `start` was written.
    Started(Upsert),
    /// An `end` was written.
    Ended(Upsert),
    /// An `error` was logged.
    CopyErrorLogged,
    /// A `too_big` was logged.
    TooBigLogged,
    /// The run is already archived; nothing was written.
    AlreadyArchived,
}

/// Counters for one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Non-empty batches fetched.
    pub batches: u64,
    /// Messages applied and deleted.
    pub messages: u64,
    /// `start` events written.
    pub starts: u64,
    /// `end` events written.
    pub ends: u64,
    /// `error` events seen.
    pub errors: u64,
    /// `too_big` events seen.
    pub too_big: u64,
    /// Events skipped because their run was already archived.
    pub skipped: u64,
}

impl DrainReport {
    fn record(&mut self, applied: Applied) {
        self.messages = self.messages.saturating_add(1);
        let counter = match applied {
            Applied::Started(_) => &mut self.starts,
            Applied::Ended(_) => &mut self.ends,
            Applied::CopyErrorLogged => &mut self.errors,
            Applied::TooBigLogged => &mut self.too_big,
            Applied::AlreadyArchived => &mut self.skipped,
        };
        *counter = counter.saturating_add(1);
    }
}

/// Drains the lifecycle queue into the ledger.
pub struct QueueDrainer<'a> {
    backups: BackupStore<'a>,
    archive: ArchiveStore<'a>,
    batch_size: usize,
    span: Span,
}

impl<'a> QueueDrainer<'a> {
    /// Create a drainer writing to `ledger`.
    pub fn new(ledger: &'a LedgerPool) -> Self {
        Self {
            backups: BackupStore::new(ledger.pool()),
            archive: ArchiveStore::new(ledger.pool()),
            batch_size: DEFAULT_BATCH_SIZE,
            span: tracing::info_span!("drain"),
        }
    }

    /// Set the number of messages fetched per batch (at least one).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Log under `span` instead of the default `drain` span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Fetch and apply batches until the queue is empty.
    ///
    /// # Errors
    ///
    /// Stops at the first failure: [`CycleError::UnknownEventKind`] or
    /// [`CycleError::MalformedEvent`] for a bad message,
    /// [`CycleError::Transport`] for the queue, [`CycleError::Storage`] for
    /// the ledger. The failing message and the rest of its batch are not
    /// deleted.
    pub async fn drain<Q: EventQueue>(&self, queue: &Q) -> Result<DrainReport, CycleError> {
        self.drain_batches(queue).instrument(self.span.clone()).await
    }

    async fn drain_batches<Q: EventQueue>(&self, queue: &Q) -> Result<DrainReport, CycleError> {
        let mut report = DrainReport::default();

        loop {
            let batch = queue.receive(self.batch_size).await?;
            if batch.is_empty() {
                break;
            }
            report.batches = report.batches.saturating_add(1);
            debug!(size = batch.len(), "Fetched batch");

            for message in batch {
                let applied = self.apply_body(&message.body).await?;
                queue.delete(message.handle).await?;
                report.record(applied);
            }
        }

        info!(
            batches = report.batches,
            messages = report.messages,
            starts = report.starts,
            ends = report.ends,
            errors = report.errors,
            too_big = report.too_big,
            skipped = report.skipped,
            "Queue drained"
        );
        Ok(report)
    }

    /// Decode a message body and apply it.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::MalformedEvent`] if the body does not decode,
    /// otherwise as [`QueueDrainer::apply`].
    pub async fn apply_body(&self, body: &[u8]) -> Result<Applied, CycleError> {
        let event = LifecycleEvent::from_slice(body).map_err(|e| {
            error!(error = %e, "Undecodable message on lifecycle queue");
            CycleError::from(e)
        })?;
        self.apply(&event).await
    }

    /// Apply one lifecycle event to the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::UnknownEventKind`] for an unrecognized kind and
    /// [`CycleError::Storage`] if the ledger write fails.
    pub async fn apply(&self, event: &LifecycleEvent) -> Result<Applied, CycleError> {
        let kind = event.kind().map_err(|source| {
            error!(
                event = %event.event,
                run_uuid = %event.run_uuid,
                object_key = %event.object_key,
                "Unknown event received"
            );
            CycleError::UnknownEventKind {
                run_uuid: event.run_uuid.clone(),
                source,
            }
        })?;

        if matches!(kind, EventKind::Start | EventKind::End)
            && self.archive.is_archived(&event.run_uuid).await?
        {
            debug!(
                kind = %kind,
                run_uuid = %event.run_uuid,
                "Run already archived, skipping"
            );
            return Ok(Applied::AlreadyArchived);
        }

        match kind {
            EventKind::Start => {
                let upsert = self
                    .backups
                    .upsert_start(&event.run_uuid, &event.object_key, event.time)
                    .await?;
                info!(
                    time = event.time,
                    run_uuid = %event.run_uuid,
                    object_key = %event.object_key,
                    "Start"
                );
                Ok(Applied::Started(upsert))
            }
            EventKind::End => {
                let upsert = self
                    .backups
                    .upsert_end(&event.run_uuid, &event.object_key, event.time)
                    .await?;
                info!(
                    time = event.time,
                    run_uuid = %event.run_uuid,
                    object_key = %event.object_key,
                    "End"
                );
                Ok(Applied::Ended(upsert))
            }
            EventKind::Error => {
                warn!(
                    time = event.time,
                    run_uuid = %event.run_uuid,
                    object_key = %event.object_key,
                    "Inline copy failed; run stays pending"
                );
                Ok(Applied::CopyErrorLogged)
            }
            EventKind::TooBig => {
                info!(
                    time = event.time,
                    run_uuid = %event.run_uuid,
                    object_key = %event.object_key,
                    "Too big for inline copy"
                );
                Ok(Applied::TooBigLogged)
            }
        }
    }
}
