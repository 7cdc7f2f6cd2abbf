//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] errors with additional context about which operation failed.

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A SQLite operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// A schema migration failed.
    #[error("SQLite migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Archival moved a different number of rows than it removed.
    ///
    /// The transaction is rolled back before this is returned.
    #[error("archive mismatch: inserted {inserted} rows but deleted {deleted}")]
    ArchiveMismatch {
        /// Rows copied into `archived_backups`.
        inserted: u64,
        /// Rows removed from `backups`.
        deleted: u64,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
