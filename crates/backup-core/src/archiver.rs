//! Moves completed runs out of the active table.

use backup_db::{ArchiveStore, LedgerPool};
use tracing::{Instrument, Span, info};

use crate::error::CycleError;

/// One archival pass per cycle.
pub struct Archiver<'a> {
    archive: ArchiveStore<'a>,
    span: Span,
}

impl<'a> Archiver<'a> {
    /// Create an archiver over `ledger`.
    pub fn new(ledger: &'a LedgerPool) -> Self {
        Self {
            archive: ArchiveStore::new(ledger.pool()),
            span: tracing::info_span!("archive"),
        }
    }

    /// Log under `span` instead of the default `archive` span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Archive every run with both timestamps set, in one transaction.
    ///
    /// Returns the number of runs archived.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Storage`] if the transaction fails; the active
    /// table is then unchanged.
    pub async fn archive(&self) -> Result<u64, CycleError> {
        async {
            let archived = self.archive.archive_completed().await?;
            info!(archived, "Archived completed runs");
            Ok::<u64, CycleError>(archived)
        }
        .instrument(self.span.clone())
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use backup_db::BackupStore;
    use backup_types::RunId;

    use super::*;

    #[tokio::test]
    async fn archives_complete_runs_and_reports_count() {
        let ledger = LedgerPool::in_memory().await.unwrap();
        let store = BackupStore::new(ledger.pool());
        store.upsert_start(&RunId::from("a"), "k1", 1.0).await.unwrap();
        store.upsert_end(&RunId::from("a"), "k1", 2.0).await.unwrap();
        store.upsert_start(&RunId::from("b"), "k2", 1.0).await.unwrap();

        let archiver = Archiver::new(&ledger);
        assert_eq!(archiver.archive().await.unwrap(), 1);
        assert_eq!(archiver.archive().await.unwrap(), 0);
        assert!(store.record_exists(&RunId::from("b")).await.unwrap());
    }
}
