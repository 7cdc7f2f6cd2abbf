//! Lifecycle events carried on the queue.
//!
//! The producer publishes one event per state change of a run. The wire form
//! is a flat JSON object:
//!
//! ```json
//! {"event": "start", "run_uuid": "a", "object_key": "k1", "time": 100.0}
//! ```
//!
//! The `event` field is kept as a raw string on [`LifecycleEvent`] so that a
//! body with an unrecognized kind still deserializes and the worker can report
//! it as [`UnknownEventKind`] rather than as a generic parse failure.

use serde::{Deserialize, Serialize};

use crate::ids::RunId;
use crate::records::EpochSeconds;

/// The kind of state change a lifecycle event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The producer started a run for an object.
    Start,
    /// The run's copy finished successfully.
    End,
    /// The producer's inline copy failed; the run stays pending.
    Error,
    /// The object exceeds the inline size ceiling and was not copied inline.
    TooBig,
}

impl EventKind {
    /// The wire name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Error => "error",
            Self::TooBig => "too_big",
        }
    }

    /// Parse a wire name.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownEventKind`] for any name other than `start`, `end`,
    /// `error` or `too_big`.
    pub fn parse(name: &str) -> Result<Self, UnknownEventKind> {
        match name {
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            "error" => Ok(Self::Error),
            "too_big" => Ok(Self::TooBig),
            other => Err(UnknownEventKind {
                kind: other.to_owned(),
            }),
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event kind the worker does not know how to apply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lifecycle event kind: {kind:?}")]
pub struct UnknownEventKind {
    /// The kind as it appeared on the wire.
    pub kind: String,
}

/// A lifecycle message as published on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Raw event kind; see [`LifecycleEvent::kind`].
    pub event: String,
    /// The run this event belongs to.
    pub run_uuid: RunId,
    /// The storage key being copied.
    pub object_key: String,
    /// When the producer observed the state change.
    pub time: EpochSeconds,
}

impl LifecycleEvent {
    /// Build an event of a known kind.
    pub fn new(kind: EventKind, run_uuid: RunId, object_key: &str, time: EpochSeconds) -> Self {
        Self {
            event: kind.as_str().to_owned(),
            run_uuid,
            object_key: object_key.to_owned(),
            time,
        }
    }

    /// The parsed event kind.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownEventKind`] if `event` is not a recognized kind.
    pub fn kind(&self) -> Result<EventKind, UnknownEventKind> {
        EventKind::parse(&self.event)
    }

    /// Decode an event from a queue message body.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if the body is not a
    /// JSON lifecycle event.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Encode this event as a queue message body.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if serialization fails
    /// (for example, a non-finite `time`).
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn decodes_producer_body() {
        let body = br#"{"event": "start", "run_uuid": "a", "object_key": "k1", "time": 100}"#;
        let event = LifecycleEvent::from_slice(body).unwrap();
        assert_eq!(event.kind().unwrap(), EventKind::Start);
        assert_eq!(event.run_uuid, RunId::from("a"));
        assert_eq!(event.object_key, "k1");
        assert_eq!(event.time, 100.0);
    }

    #[test]
    fn unknown_kind_still_decodes() {
        let body = br#"{"event": "restart", "run_uuid": "a", "object_key": "k1", "time": 1.5}"#;
        let event = LifecycleEvent::from_slice(body).unwrap();
        let err = event.kind().unwrap_err();
        assert_eq!(err.kind, "restart");
    }

    #[test]
    fn every_kind_parses_its_own_name() {
        for kind in [EventKind::Start, EventKind::End, EventKind::Error, EventKind::TooBig] {
            assert_eq!(EventKind::parse(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn missing_field_is_a_decode_error() {
        let body = br#"{"event": "end", "run_uuid": "a", "time": 2}"#;
        assert!(LifecycleEvent::from_slice(body).is_err());
    }

    #[test]
    fn encodes_wire_name_for_too_big() {
        let event = LifecycleEvent::new(EventKind::TooBig, RunId::from("b"), "huge.bin", 3.0);
        let value: serde_json::Value = serde_json::from_slice(&event.to_vec().unwrap()).unwrap();
        assert_eq!(value["event"], "too_big");
        assert_eq!(value["run_uuid"], "b");
    }
}
