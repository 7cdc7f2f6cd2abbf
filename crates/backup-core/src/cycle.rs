//! One full worker invocation.
//!
//! A cycle runs each stage once, in order, and returns. It never loops
//! itself; an external scheduler (cron) starts the next one.
//!
//! # Single writer
//!
//! At most one cycle may run against a given ledger and queue at a time.
//! Nothing in the cycle takes a lock: two concurrent cycles would apply the
//! same events twice and copy the same pending runs twice. Run the binary
//! under `flock` or an equivalent guard.

use backup_db::LedgerPool;
use tracing::{Instrument, Span, info};

use crate::archiver::Archiver;
use crate::clock::Clock;
use crate::copier::{CopyRoute, ObjectCopier};
use crate::drainer::{DEFAULT_BATCH_SIZE, DrainReport, QueueDrainer};
use crate::error::CycleError;
use crate::queue::EventQueue;
use crate::scheduler::{CopyScheduler, SchedulerReport, SchedulerSettings};

/// Tuning for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSettings {
    /// Messages fetched per queue batch.
    pub batch_size: usize,
    /// Copy scheduler budget and staleness window.
    pub scheduler: SchedulerSettings,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            scheduler: SchedulerSettings::default(),
        }
    }
}

/// What a cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Queue drain counters.
    pub drained: DrainReport,
    /// Runs moved to the archive.
    pub archived: u64,
    /// Scheduler outcome.
    pub copies: SchedulerReport,
}

/// The worker's per-invocation pipeline.
pub struct BackupCycle<'a, Q, C, K> {
    ledger: &'a LedgerPool,
    queue: &'a Q,
    copier: &'a C,
    clock: &'a K,
    route: CopyRoute,
    settings: CycleSettings,
    span: Span,
}

impl<'a, Q, C, K> BackupCycle<'a, Q, C, K>
where
    Q: EventQueue,
    C: ObjectCopier,
    K: Clock,
{
    /// Wire a cycle from its collaborators with default settings.
    pub fn new(
        ledger: &'a LedgerPool,
        queue: &'a Q,
        copier: &'a C,
        clock: &'a K,
        route: CopyRoute,
    ) -> Self {
        Self {
            ledger,
            queue,
            copier,
            clock,
            route,
            settings: CycleSettings::default(),
            span: tracing::info_span!("cycle"),
        }
    }

    /// Override batch size, budget and staleness window.
    #[must_use]
    pub const fn with_settings(mut self, settings: CycleSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Log under `span`; each stage opens its own child span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Ensure the schema, drain the queue, archive, then copy.
    ///
    /// # Errors
    ///
    /// Returns the first [`CycleError`] from any stage; later stages do not
    /// run.
    pub async fn run(&self) -> Result<CycleReport, CycleError> {
        self.run_stages().instrument(self.span.clone()).await
    }

    async fn run_stages(&self) -> Result<CycleReport, CycleError> {
        self.ledger.ensure_schema().await?;

        let drained = QueueDrainer::new(self.ledger)
            .with_batch_size(self.settings.batch_size)
            .with_span(tracing::info_span!(parent: &self.span, "drain"))
            .drain(self.queue)
            .await?;

        let archived = Archiver::new(self.ledger)
            .with_span(tracing::info_span!(parent: &self.span, "archive"))
            .archive()
            .await?;

        let copies = CopyScheduler::new(self.ledger, self.copier, self.clock, &self.route)
            .with_settings(self.settings.scheduler)
            .with_span(tracing::info_span!(parent: &self.span, "copy"))
            .run()
            .await?;

        info!(
            messages = drained.messages,
            archived,
            copied = copies.copied.len(),
            "Cycle complete"
        );

        Ok(CycleReport {
            drained,
            archived,
            copies,
        })
    }
}
