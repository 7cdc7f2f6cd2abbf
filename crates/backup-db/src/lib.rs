//! Local run ledger for the content backup worker.
//!
//! The ledger is a single SQLite file with two tables of identical shape:
//!
//! ```text
//! lifecycle events --> backups (active)  --archive--> archived_backups
//!                        |
//!                        +-- stale pending rows --> copy scheduler
//! ```
//!
//! Only one worker process may write to a ledger file at a time. The pool is
//! sized to a single connection so every statement from that process is
//! serialized as well.
//!
//! # Modules
//!
//! - [`sqlite`] -- Connection pool, configuration, and schema migrations
//! - [`backup_store`] -- Upserts and queries on the active `backups` table
//! - [`archive_store`] -- Atomic archival and queries on `archived_backups`
//! - [`error`] -- Shared error types

pub mod archive_store;
pub mod backup_store;
pub mod error;
pub mod sqlite;

// Re-export primary types for convenience.
pub use archive_store::ArchiveStore;
pub use backup_store::{BackupRow, BackupStore, Upsert};
pub use error::DbError;
pub use sqlite::{LedgerPool, SqliteConfig};
