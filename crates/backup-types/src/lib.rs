//! Shared type definitions for the content backup worker.
//!
//! This crate is the single source of truth for the data that flows between
//! the lifecycle producer, the queue, and the worker's local run ledger.
//!
//! # Modules
//!
//! - [`ids`] -- The opaque run identifier that keys every copy attempt
//! - [`events`] -- Lifecycle events carried on the queue
//! - [`records`] -- Active and archived backup records
//! - [`notification`] -- Object-created notifications that start a run

pub mod events;
pub mod ids;
pub mod notification;
pub mod records;

// Re-export all public types at crate root for convenience.
pub use events::{EventKind, LifecycleEvent, UnknownEventKind};
pub use ids::RunId;
pub use notification::{NotificationError, ObjectCreated, ObjectCreatedNotification};
pub use records::{BackupRecord, EpochSeconds, RecordState};
