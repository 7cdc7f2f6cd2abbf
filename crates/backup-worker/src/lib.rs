//! Production wiring for the content backup pipeline.
//!
//! This crate plugs the real transports into the cycle defined in
//! `backup-core`:
//!
//! ```text
//! backup-notify:  stdin (S3 notification) --> Producer --> JetStream
//!                                               |
//!                                               +--> S3Copier (inline copy)
//!
//! backup-worker:  JetStream --> QueueDrainer --> SQLite ledger
//!                               Archiver
//!                               CopyScheduler --> S3Copier
//! ```
//!
//! # Modules
//!
//! - [`config`] -- Environment configuration for both binaries
//! - [`error`] -- Worker error type
//! - [`logging`] -- `tracing` subscriber setup
//! - [`nats`] -- JetStream queue and publisher
//! - [`notify`] -- Notification handling for `backup-notify`
//! - [`s3`] -- S3 server-side copier

pub mod config;
pub mod error;
pub mod logging;
pub mod nats;
pub mod notify;
pub mod s3;

pub use config::{ConfigError, Credentials, NotifyConfig, QueueConfig, S3Config, WorkerConfig};
pub use error::WorkerError;
pub use nats::{JetStreamPublisher, JetStreamQueue};
pub use s3::S3Copier;
