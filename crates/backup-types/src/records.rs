//! Backup records as tracked in the worker's run ledger.
//!
//! The same shape is used for the active table and the archive: a record is
//! keyed by its run, carries the object key, and has an optional start and
//! end timestamp. Which timestamps are present decides what the worker does
//! with it next (see [`RecordState`]).

use serde::{Deserialize, Serialize};

use crate::ids::RunId;

/// Seconds since the Unix epoch, with sub-second precision.
///
/// This is the unit of the `time` field on lifecycle events and of the
/// timestamp columns in the ledger.
pub type EpochSeconds = f64;

/// Where a record is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Started but not finished; eligible for a scheduler copy once stale.
    Pending,
    /// Both timestamps are known; ready to move to the archive.
    Archivable,
    /// Only the end has been seen (the `start` event has not arrived yet).
    AwaitingStart,
}

/// One copy attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// The run this record tracks.
    pub run_uuid: RunId,
    /// The storage key being copied.
    pub object_key: String,
    /// When the run started, once a `start` event has been applied.
    pub start_time: Option<EpochSeconds>,
    /// When the copy finished, once an `end` event was applied or the
    /// scheduler completed the copy.
    pub end_time: Option<EpochSeconds>,
}

impl BackupRecord {
    /// Classify the record by which timestamps are present.
    ///
    /// A row with neither timestamp cannot be produced by the upserts; it is
    /// reported as [`RecordState::AwaitingStart`].
    pub const fn state(&self) -> RecordState {
        match (self.start_time, self.end_time) {
            (Some(_), Some(_)) => RecordState::Archivable,
            (Some(_), None) => RecordState::Pending,
            (None, _) => RecordState::AwaitingStart,
        }
    }

    /// Whether both timestamps are set.
    pub const fn is_archivable(&self) -> bool {
        matches!(self.state(), RecordState::Archivable)
    }

    /// Whether the run started but has not finished.
    pub const fn is_pending(&self) -> bool {
        matches!(self.state(), RecordState::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: Option<f64>, end: Option<f64>) -> BackupRecord {
        BackupRecord {
            run_uuid: RunId::from("a"),
            object_key: "k1".to_owned(),
            start_time: start,
            end_time: end,
        }
    }

    #[test]
    fn state_follows_timestamps() {
        assert_eq!(record(Some(1.0), Some(2.0)).state(), RecordState::Archivable);
        assert_eq!(record(Some(1.0), None).state(), RecordState::Pending);
        assert_eq!(record(None, Some(2.0)).state(), RecordState::AwaitingStart);
    }

    #[test]
    fn end_only_record_is_neither_pending_nor_archivable() {
        let r = record(None, Some(2.0));
        assert!(!r.is_pending());
        assert!(!r.is_archivable());
    }
}
