//! SQLite connection pool and schema management.
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time checked)
//! so the crate builds without a ledger file present. All queries are
//! parameterized.

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::DbError;

/// URL of a private in-memory database.
const IN_MEMORY_URL: &str = "sqlite::memory:";

/// Default maximum number of connections in the pool.
///
/// One connection keeps every write from this process serialized and lets an
/// in-memory database live for the lifetime of the pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 1;

/// Default connection timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Configuration for the ledger connection pool.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// SQLite connection URL (`sqlite://path/to/backup.db` or
    /// `sqlite::memory:`).
    pub url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Idle connection timeout. `None` keeps connections open until the pool
    /// closes, which an in-memory database requires.
    pub idle_timeout: Option<Duration>,
}

impl SqliteConfig {
    /// Configuration for a ledger file, created if it does not exist.
    pub fn file(path: &str) -> Self {
        Self {
            url: format!("sqlite://{path}"),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: None,
        }
    }

    /// Configuration for a private in-memory ledger (tests and dry runs).
    pub fn in_memory() -> Self {
        Self {
            url: IN_MEMORY_URL.to_owned(),
            max_connections: 1,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: None,
        }
    }
}

/// Connection pool handle to the ledger.
///
/// Wraps a [`sqlx::SqlitePool`]; the stores borrow it.
#[derive(Clone)]
pub struct LedgerPool {
    pool: SqlitePool,
}

impl LedgerPool {
    /// Open the ledger using the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed and
    /// [`DbError::Sqlite`] if the database cannot be opened.
    pub async fn connect(config: &SqliteConfig) -> Result<Self, DbError> {
        let connect_options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DbError::Config(format!("Invalid ledger URL {}: {e}", config.url)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await?;

        tracing::info!(url = %config.url, "Opened ledger");

        Ok(Self { pool })
    }

    /// Open a fresh in-memory ledger with the schema applied.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database cannot be opened or migrated.
    pub async fn in_memory() -> Result<Self, DbError> {
        let ledger = Self::connect(&SqliteConfig::in_memory()).await?;
        ledger.ensure_schema().await?;
        Ok(ledger)
    }

    /// Create the `backups` and `archived_backups` tables and their indexes
    /// if they are missing.
    ///
    /// Safe to call on every run.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Migration`] if any migration fails.
    pub async fn ensure_schema(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::debug!("Ledger schema is current");
        Ok(())
    }

    /// Return a reference to the underlying [`SqlitePool`].
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections in the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Ledger closed");
    }
}

impl std::fmt::Debug for LedgerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerPool")
            .field("connections", &self.pool.size())
            .finish()
    }
}
