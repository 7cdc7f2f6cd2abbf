//! Operations on the active `backups` table.
//!
//! Lifecycle events arrive at least once and in any order, so both upserts
//! are written to converge: each one inserts the row if the run is new and
//! otherwise touches only its own timestamp column. Applying `end` before
//! `start` yields the same final row as the natural order.

use backup_types::{BackupRecord, EpochSeconds, RunId};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbError;

/// Which timestamp column an upsert writes.
#[derive(Debug, Clone, Copy)]
enum Column {
    Start,
    End,
}

impl Column {
    const fn insert_sql(self) -> &'static str {
        match self {
            Self::Start => "INSERT INTO backups (run_uuid, object_key, start_time) VALUES (?, ?, ?)",
            Self::End => "INSERT INTO backups (run_uuid, object_key, end_time) VALUES (?, ?, ?)",
        }
    }

    const fn update_sql(self) -> &'static str {
        match self {
            Self::Start => "UPDATE backups SET start_time = ? WHERE run_uuid = ?",
            Self::End => "UPDATE backups SET end_time = ? WHERE run_uuid = ?",
        }
    }
}

/// What an upsert did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The run was new; a row was inserted.
    Inserted,
    /// The run already had a row; one timestamp was overwritten.
    Updated,
}

/// Operations on the `backups` table.
pub struct BackupStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BackupStore<'a> {
    /// Create a new backup store bound to a connection pool.
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Whether the active table has a row for `run_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn record_exists(&self, run_id: &RunId) -> Result<bool, DbError> {
        let mut conn = self.pool.acquire().await?;
        exists_on(&mut conn, run_id).await
    }

    /// Record that a run started at `at`.
    ///
    /// Inserts `(run_id, object_key, start_time)` for a new run; for a known
    /// run only `start_time` is overwritten and `object_key` is left as is.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the statement or commit fails.
    pub async fn upsert_start(
        &self,
        run_id: &RunId,
        object_key: &str,
        at: EpochSeconds,
    ) -> Result<Upsert, DbError> {
        self.upsert(Column::Start, run_id, object_key, at).await
    }

    /// Record that a run's copy finished at `at`.
    ///
    /// Mirror of [`BackupStore::upsert_start`] for `end_time`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the statement or commit fails.
    pub async fn upsert_end(
        &self,
        run_id: &RunId,
        object_key: &str,
        at: EpochSeconds,
    ) -> Result<Upsert, DbError> {
        self.upsert(Column::End, run_id, object_key, at).await
    }

    /// Existence check and write in one transaction.
    async fn upsert(
        &self,
        column: Column,
        run_id: &RunId,
        object_key: &str,
        at: EpochSeconds,
    ) -> Result<Upsert, DbError> {
        let mut tx = self.pool.begin().await?;

        let outcome = if exists_on(&mut tx, run_id).await? {
            sqlx::query(column.update_sql())
                .bind(at)
                .bind(run_id.as_str())
                .execute(&mut *tx)
                .await?;
            Upsert::Updated
        } else {
            sqlx::query(column.insert_sql())
                .bind(run_id.as_str())
                .bind(object_key)
                .bind(at)
                .execute(&mut *tx)
                .await?;
            Upsert::Inserted
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Fetch the active row for `run_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn get(&self, run_id: &RunId) -> Result<Option<BackupRecord>, DbError> {
        let row = sqlx::query_as::<_, BackupRow>(
            r"SELECT run_uuid, object_key, start_time, end_time
              FROM backups
              WHERE run_uuid = ?",
        )
        .bind(run_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(BackupRecord::from))
    }

    /// All active rows, oldest start first (rows without a start last).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn list_active(&self) -> Result<Vec<BackupRecord>, DbError> {
        let rows = sqlx::query_as::<_, BackupRow>(
            r"SELECT run_uuid, object_key, start_time, end_time
              FROM backups
              ORDER BY start_time IS NULL, start_time, run_uuid",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(BackupRecord::from).collect())
    }

    /// The oldest pending run that started strictly before `cutoff`.
    ///
    /// Pending means `end_time IS NULL`; rows without a `start_time` never
    /// match because the comparison with NULL is not true.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn oldest_stale_pending(
        &self,
        cutoff: EpochSeconds,
    ) -> Result<Option<BackupRecord>, DbError> {
        let row = sqlx::query_as::<_, BackupRow>(
            r"SELECT run_uuid, object_key, start_time, end_time
              FROM backups
              WHERE end_time IS NULL AND start_time < ?
              ORDER BY start_time ASC
              LIMIT 1",
        )
        .bind(cutoff)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(BackupRecord::from))
    }

    /// Set `end_time` for a run the scheduler just copied.
    ///
    /// Returns `false` if the run no longer has an active row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the update fails.
    pub async fn mark_completed(&self, run_id: &RunId, at: EpochSeconds) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE backups SET end_time = ? WHERE run_uuid = ?")
            .bind(at)
            .bind(run_id.as_str())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

async fn exists_on(conn: &mut SqliteConnection, run_id: &RunId) -> Result<bool, DbError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM backups WHERE run_uuid = ?")
        .bind(run_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// A row from `backups` or `archived_backups`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BackupRow {
    /// Run identifier.
    pub run_uuid: String,
    /// Storage key being copied.
    pub object_key: String,
    /// Start timestamp, epoch seconds.
    pub start_time: Option<f64>,
    /// End timestamp, epoch seconds.
    pub end_time: Option<f64>,
}

impl From<BackupRow> for BackupRecord {
    fn from(row: BackupRow) -> Self {
        Self {
            run_uuid: RunId::from(row.run_uuid),
            object_key: row.object_key,
            start_time: row.start_time,
            end_time: row.end_time,
        }
    }
}
