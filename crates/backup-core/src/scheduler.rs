//! Time-boxed retry of stale pending copies.
//!
//! The producer copies every object inline when it is created. Runs whose
//! inline copy failed, or that never reported an `end`, stay pending in the
//! ledger. The scheduler picks them up, oldest first, once they are older
//! than the staleness window. The window keeps it from racing a producer
//! copy that is still in progress.
//!
//! Both the window and the budget are measured from the moment the scheduler
//! starts, not from each iteration, so a long cycle never widens the set of
//! eligible runs. The budget is checked between copies; a copy that is
//! already running is never interrupted.

use std::time::Duration;

use backup_db::{BackupStore, LedgerPool};
use backup_types::{EpochSeconds, RunId};
use tracing::{Instrument, Span, error, info};

use crate::clock::Clock;
use crate::copier::{CopyRoute, ObjectCopier};
use crate::error::CycleError;

/// Default time budget for one scheduler run (30 minutes).
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(1800);

/// Default age a pending run must reach before the scheduler copies it
/// (one hour).
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3600);

/// Tuning for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// How long the scheduler keeps starting new copies.
    pub budget: Duration,
    /// Minimum age of a pending run's `start_time` before it is eligible.
    pub stale_after: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

/// Why the scheduler stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No eligible pending run was left.
    Exhausted,
    /// The time budget ran out with work possibly remaining.
    BudgetSpent,
}

/// Outcome of one scheduler run.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerReport {
    /// When the scheduler started; the staleness cutoff is derived from it.
    pub started_at: EpochSeconds,
    /// Runs copied and marked complete, in order.
    pub copied: Vec<RunId>,
    /// Why the loop ended.
    pub stop: StopReason,
}

/// Copies stale pending runs until work or time runs out.
pub struct CopyScheduler<'a, C, K> {
    backups: BackupStore<'a>,
    copier: &'a C,
    clock: &'a K,
    route: &'a CopyRoute,
    settings: SchedulerSettings,
    span: Span,
}

impl<'a, C: ObjectCopier, K: Clock> CopyScheduler<'a, C, K> {
    /// Create a scheduler with default settings.
    pub fn new(ledger: &'a LedgerPool, copier: &'a C, clock: &'a K, route: &'a CopyRoute) -> Self {
        Self {
            backups: BackupStore::new(ledger.pool()),
            copier,
            clock,
            route,
            settings: SchedulerSettings::default(),
            span: tracing::info_span!("copy"),
        }
    }

    /// Override the budget and staleness window.
    #[must_use]
    pub const fn with_settings(mut self, settings: SchedulerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Log under `span` instead of the default `copy` span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Run the copy loop.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::CopyFailure`] on the first failed copy, leaving
    /// that run pending, and [`CycleError::Storage`] if the ledger fails.
    pub async fn run(&self) -> Result<SchedulerReport, CycleError> {
        self.copy_loop().instrument(self.span.clone()).await
    }

    async fn copy_loop(&self) -> Result<SchedulerReport, CycleError> {
        let started_at = self.clock.now();
        let deadline = started_at + self.settings.budget.as_secs_f64();
        let cutoff = started_at - self.settings.stale_after.as_secs_f64();
        let mut copied = Vec::new();

        info!(started_at, deadline, cutoff, "Copy scheduler starting");

        let stop = loop {
            if self.clock.now() >= deadline {
                break StopReason::BudgetSpent;
            }

            let Some(record) = self.backups.oldest_stale_pending(cutoff).await? else {
                break StopReason::Exhausted;
            };

            let now = self.clock.now();
            info!(
                time = now,
                run_uuid = %record.run_uuid,
                object_key = %record.object_key,
                "Copy Start"
            );

            let request = self.route.request(&record.object_key);
            if let Err(source) = self.copier.copy(&request).await {
                error!(
                    run_uuid = %record.run_uuid,
                    object_key = %record.object_key,
                    error = %source,
                    "Copy failed; run stays pending"
                );
                return Err(CycleError::CopyFailure {
                    run_uuid: record.run_uuid,
                    object_key: record.object_key,
                    source,
                });
            }

            // The run is stamped with the time its copy started.
            self.backups.mark_completed(&record.run_uuid, now).await?;
            info!(
                time = now,
                run_uuid = %record.run_uuid,
                object_key = %record.object_key,
                "Copy End"
            );
            copied.push(record.run_uuid);
        };

        info!(copied = copied.len(), stop = ?stop, "Copy scheduler finished");
        Ok(SchedulerReport {
            started_at,
            copied,
            stop,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::copier::StubCopier;

    const NOW: f64 = 1_700_000_000.0;

    fn route() -> CopyRoute {
        CopyRoute {
            source_bucket: "content".to_owned(),
            source_region: "us-east-2".to_owned(),
            target_bucket: "content-backup".to_owned(),
            target_region: "us-west-2".to_owned(),
        }
    }

    async fn pending(ledger: &LedgerPool, run: &str, key: &str, start: f64) {
        BackupStore::new(ledger.pool())
            .upsert_start(&RunId::from(run), key, start)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn copies_stale_runs_oldest_first_and_skips_recent_ones() {
        let ledger = LedgerPool::in_memory().await.unwrap();
        pending(&ledger, "middle", "k-middle", NOW - 5_000.0).await;
        pending(&ledger, "oldest", "k-oldest", NOW - 9_000.0).await;
        pending(&ledger, "recent", "k-recent", NOW - 600.0).await;
        pending(&ledger, "edge", "k-edge", NOW - 3_600.0).await;

        let copier = StubCopier::new();
        let clock = ManualClock::frozen(NOW);
        let route = route();
        let report = CopyScheduler::new(&ledger, &copier, &clock, &route)
            .run()
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(copier.copied_keys(), vec!["k-oldest".to_owned(), "k-middle".to_owned()]);
        assert_eq!(report.copied, vec![RunId::from("oldest"), RunId::from("middle")]);

        let store = BackupStore::new(ledger.pool());
        let recent = store.get(&RunId::from("recent")).await.unwrap().unwrap();
        assert!(recent.is_pending());
        let edge = store.get(&RunId::from("edge")).await.unwrap().unwrap();
        assert!(edge.is_pending());
    }

    #[tokio::test]
    async fn stops_when_the_budget_is_spent() {
        let ledger = LedgerPool::in_memory().await.unwrap();
        for i in 0..10 {
            pending(&ledger, &format!("run-{i}"), "k", NOW - 10_000.0 + f64::from(i)).await;
        }

        let copier = StubCopier::new();
        // Every clock read moves time forward by five minutes.
        let clock = ManualClock::with_step(NOW, 300.0);
        let route = route();
        let report = CopyScheduler::new(&ledger, &copier, &clock, &route)
            .run()
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::BudgetSpent);
        assert!(!report.copied.is_empty());
        assert!(report.copied.len() < 10);
        assert_eq!(report.started_at, NOW);
    }

    #[tokio::test]
    async fn failed_copy_aborts_and_leaves_run_pending() {
        let ledger = LedgerPool::in_memory().await.unwrap();
        pending(&ledger, "first", "k-bad", NOW - 9_000.0).await;
        pending(&ledger, "second", "k-good", NOW - 8_000.0).await;

        let copier = StubCopier::new().failing_on("k-bad");
        let clock = ManualClock::frozen(NOW);
        let route = route();
        let err = CopyScheduler::new(&ledger, &copier, &clock, &route)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CycleError::CopyFailure { ref object_key, .. } if object_key == "k-bad"
        ));
        assert!(copier.copied().is_empty());
        let store = BackupStore::new(ledger.pool());
        let first = store.get(&RunId::from("first")).await.unwrap().unwrap();
        assert!(first.is_pending());
    }

    #[tokio::test]
    async fn completed_run_is_stamped_with_the_copy_start_time() {
        let ledger = LedgerPool::in_memory().await.unwrap();
        pending(&ledger, "a", "k1", NOW - 7_200.0).await;

        let copier = StubCopier::new();
        // One second per read: start, budget check, copy start.
        let clock = ManualClock::with_step(NOW, 1.0);
        let route = route();
        CopyScheduler::new(&ledger, &copier, &clock, &route)
            .with_settings(SchedulerSettings::default())
            .run()
            .await
            .unwrap();

        let record = BackupStore::new(ledger.pool())
            .get(&RunId::from("a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.end_time, Some(NOW + 2.0));
    }
}
