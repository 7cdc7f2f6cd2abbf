//! Queue drain, archival, and copy scheduling for the content backup worker.
//!
//! One invocation of the worker is one [`cycle::BackupCycle`]:
//!
//! ```text
//! ensure schema
//!     |
//!     +-- QueueDrainer   fetch batches until the queue is empty,
//!     |                  apply start/end to the ledger, ack each message
//!     +-- Archiver       move completed runs to the archive (one transaction)
//!     +-- CopyScheduler  copy stale pending runs until the work or the
//!                        time budget runs out
//! ```
//!
//! The queue, the copy primitive, and the clock are traits so the cycle can
//! run against NATS and S3 in production and against the in-memory doubles in
//! [`queue::MemoryQueue`], [`copier::StubCopier`] and [`clock::ManualClock`]
//! in tests. The [`producer`] module holds the other half of the pipeline:
//! turning an object-created notification into lifecycle events.
//!
//! # Modules
//!
//! - [`clock`] -- Time source for timestamps and the scheduler budget
//! - [`queue`] -- Queue and publisher traits, in-memory queue
//! - [`copier`] -- Copy primitive trait and request types
//! - [`drainer`] -- Applies lifecycle events to the ledger
//! - [`archiver`] -- Moves completed runs to the archive
//! - [`scheduler`] -- Time-boxed retry of stale pending copies
//! - [`cycle`] -- One full worker invocation
//! - [`producer`] -- Object-created notification to lifecycle events
//! - [`error`] -- Cycle error taxonomy

pub mod archiver;
pub mod clock;
pub mod copier;
pub mod cycle;
pub mod drainer;
pub mod error;
pub mod producer;
pub mod queue;
pub mod scheduler;

pub use archiver::Archiver;
pub use clock::{Clock, ManualClock, SystemClock};
pub use copier::{CopyError, CopyRequest, CopyRoute, ObjectCopier, StubCopier};
pub use cycle::{BackupCycle, CycleReport, CycleSettings};
pub use drainer::{Applied, DrainReport, QueueDrainer};
pub use error::CycleError;
pub use producer::{Producer, ProducerOutcome};
pub use queue::{EventPublisher, EventQueue, MemoryQueue, QueueError, Received};
pub use scheduler::{CopyScheduler, SchedulerReport, SchedulerSettings, StopReason};
