//! Archival of completed runs.
//!
//! A run is complete once both of its timestamps are known. Completed runs
//! are moved from `backups` to `archived_backups` in a single transaction:
//! either every completed row is copied and removed, or nothing changes.

use backup_types::{BackupRecord, RunId};
use sqlx::SqlitePool;

use crate::backup_store::BackupRow;
use crate::error::DbError;

/// Operations on the `archived_backups` table.
pub struct ArchiveStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ArchiveStore<'a> {
    /// Create a new archive store bound to a connection pool.
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Move every completed run from `backups` to `archived_backups`.
    ///
    /// Returns the number of runs archived. A run already present in the
    /// archive is replaced by the newer row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if any statement fails and
    /// [`DbError::ArchiveMismatch`] if the insert and delete touched a
    /// different number of rows. In both cases the transaction is rolled
    /// back and the active table is left untouched.
    pub async fn archive_completed(&self) -> Result<u64, DbError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"INSERT OR REPLACE INTO archived_backups (run_uuid, object_key, start_time, end_time)
              SELECT run_uuid, object_key, start_time, end_time
              FROM backups
              WHERE start_time IS NOT NULL AND end_time IS NOT NULL",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let deleted = sqlx::query(
            "DELETE FROM backups WHERE start_time IS NOT NULL AND end_time IS NOT NULL",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted != deleted {
            tx.rollback().await?;
            return Err(DbError::ArchiveMismatch { inserted, deleted });
        }

        tx.commit().await?;
        tracing::debug!(count = inserted, "Archived completed runs");
        Ok(inserted)
    }

    /// Whether `run_id` has already been archived.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn is_archived(&self, run_id: &RunId) -> Result<bool, DbError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM archived_backups WHERE run_uuid = ?")
                .bind(run_id.as_str())
                .fetch_optional(self.pool)
                .await?;
        Ok(found.is_some())
    }

    /// Fetch the archived row for `run_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn get(&self, run_id: &RunId) -> Result<Option<BackupRecord>, DbError> {
        let row = sqlx::query_as::<_, BackupRow>(
            r"SELECT run_uuid, object_key, start_time, end_time
              FROM archived_backups
              WHERE run_uuid = ?",
        )
        .bind(run_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(BackupRecord::from))
    }

    /// All archived rows in order of completion.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn list_archived(&self) -> Result<Vec<BackupRecord>, DbError> {
        let rows = sqlx::query_as::<_, BackupRow>(
            r"SELECT run_uuid, object_key, start_time, end_time
              FROM archived_backups
              ORDER BY end_time, run_uuid",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(BackupRecord::from).collect())
    }
}
