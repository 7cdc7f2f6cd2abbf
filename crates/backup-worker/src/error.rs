//! Error types for the worker binaries.
//!
//! Everything below the binaries already has a typed error; this enum adds
//! the failures that only exist at the edges: connecting to NATS and parsing
//! the notification. Configuration errors stay [`crate::ConfigError`].

use backup_core::CycleError;
use backup_types::NotificationError;

/// Errors that can occur while setting up or running a worker binary.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Failed to connect to NATS or to set up the stream or consumer.
    #[error("NATS error: {0}")]
    Nats(String),

    /// A cycle or producer stage failed.
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// The object-created notification could not be parsed.
    #[error("notification error: {0}")]
    Notification(#[from] NotificationError),
}
