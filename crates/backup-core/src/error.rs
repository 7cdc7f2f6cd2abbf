//! Error taxonomy for a worker cycle.
//!
//! Nothing here is retried in-process. A failed cycle leaves the queue and
//! the ledger in a state the next invocation resumes from: unacked messages
//! are redelivered, upserts are idempotent, and a pending run is requeried by
//! the scheduler.

use backup_db::DbError;
use backup_types::{RunId, UnknownEventKind};

use crate::copier::CopyError;
use crate::queue::QueueError;

/// Errors that end a worker cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// A queued event has a kind the worker does not know. The message is
    /// left unacked and the drain stops.
    #[error("run {run_uuid}: {source}")]
    UnknownEventKind {
        /// Run named by the offending event.
        run_uuid: RunId,
        /// The unrecognized kind.
        source: UnknownEventKind,
    },

    /// A queued body is not a lifecycle event. The message is left unacked
    /// and the drain stops.
    #[error("malformed lifecycle event: {source}")]
    MalformedEvent {
        /// The decode failure.
        #[from]
        source: serde_json::Error,
    },

    /// The scheduler's copy failed; the run stays pending.
    #[error("copy of {object_key} for run {run_uuid} failed: {source}")]
    CopyFailure {
        /// The run being copied.
        run_uuid: RunId,
        /// The object being copied.
        object_key: String,
        /// Why the copy failed.
        source: CopyError,
    },

    /// The queue transport failed.
    #[error("transport error: {source}")]
    Transport {
        /// The underlying queue error.
        #[from]
        source: QueueError,
    },

    /// The ledger failed.
    #[error("storage error: {source}")]
    Storage {
        /// The underlying database error.
        #[from]
        source: DbError,
    },
}
