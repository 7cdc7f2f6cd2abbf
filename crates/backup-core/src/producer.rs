//! Turns object-created notifications into lifecycle events.
//!
//! For every created object the producer mints a run id, publishes `start`,
//! and then either:
//!
//! - publishes `too_big` without copying, when the object is at or above the
//!   size ceiling, or
//! - copies the object inline and publishes `end` or `error` depending on
//!   the copy's result.
//!
//! Because `start` always goes out first, a run whose inline copy fails or
//! is skipped is left pending in the ledger, where the copy scheduler picks
//! it up once it is stale.

use backup_types::{EventKind, LifecycleEvent, ObjectCreated, RunId};
use tracing::{Instrument, Span, info, warn};

use crate::clock::Clock;
use crate::copier::{CopyError, CopyRoute, ObjectCopier};
use crate::error::CycleError;
use crate::queue::EventPublisher;

/// Objects at or above this size are not copied inline (200 GiB).
pub const DEFAULT_SIZE_CEILING: u64 = 214_748_364_800;

/// How a notification was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerOutcome {
    /// The inline copy succeeded and `end` was published.
    Copied {
        /// The minted run.
        run_uuid: RunId,
    },
    /// The inline copy failed and `error` was published.
    CopyFailed {
        /// The minted run.
        run_uuid: RunId,
        /// Why the copy failed.
        error: CopyError,
    },
    /// The object is too big; `too_big` was published and no copy was tried.
    TooBig {
        /// The minted run.
        run_uuid: RunId,
    },
}

impl ProducerOutcome {
    /// The run this outcome belongs to.
    pub const fn run_uuid(&self) -> &RunId {
        match self {
            Self::Copied { run_uuid }
            | Self::CopyFailed { run_uuid, .. }
            | Self::TooBig { run_uuid } => run_uuid,
        }
    }
}

/// Publishes lifecycle events for created objects.
pub struct Producer<'a, P, C, K> {
    publisher: &'a P,
    copier: &'a C,
    clock: &'a K,
    route: CopyRoute,
    size_ceiling: u64,
    span: Span,
}

impl<'a, P, C, K> Producer<'a, P, C, K>
where
    P: EventPublisher,
    C: ObjectCopier,
    K: Clock,
{
    /// Create a producer. The route's source region is replaced per object
    /// by the region named in the notification.
    pub fn new(publisher: &'a P, copier: &'a C, clock: &'a K, route: CopyRoute) -> Self {
        Self {
            publisher,
            copier,
            clock,
            route,
            size_ceiling: DEFAULT_SIZE_CEILING,
            span: tracing::info_span!("produce"),
        }
    }

    /// Override the inline copy size ceiling.
    #[must_use]
    pub const fn with_size_ceiling(mut self, bytes: u64) -> Self {
        self.size_ceiling = bytes;
        self
    }

    /// Log under `span` instead of the default `produce` span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Handle one created object.
    ///
    /// A failed copy is not an error here; it is reported through
    /// [`ProducerOutcome::CopyFailed`] and an `error` event.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Transport`] if an event cannot be published.
    pub async fn handle(&self, object: &ObjectCreated) -> Result<ProducerOutcome, CycleError> {
        self.handle_object(object)
            .instrument(self.span.clone())
            .await
    }

    async fn handle_object(&self, object: &ObjectCreated) -> Result<ProducerOutcome, CycleError> {
        let run_uuid = RunId::generate();
        self.emit(EventKind::Start, &run_uuid, &object.object_key)
            .await?;

        if object.size >= self.size_ceiling {
            info!(
                run_uuid = %run_uuid,
                object_key = %object.object_key,
                size = object.size,
                ceiling = self.size_ceiling,
                "Object too big for inline copy"
            );
            self.emit(EventKind::TooBig, &run_uuid, &object.object_key)
                .await?;
            return Ok(ProducerOutcome::TooBig { run_uuid });
        }

        let request = self
            .route
            .with_source_region(&object.source_region)
            .request(&object.object_key);

        match self.copier.copy(&request).await {
            Ok(()) => {
                self.emit(EventKind::End, &run_uuid, &object.object_key)
                    .await?;
                Ok(ProducerOutcome::Copied { run_uuid })
            }
            Err(error) => {
                warn!(
                    run_uuid = %run_uuid,
                    object_key = %object.object_key,
                    error = %error,
                    "Inline copy failed"
                );
                self.emit(EventKind::Error, &run_uuid, &object.object_key)
                    .await?;
                Ok(ProducerOutcome::CopyFailed { run_uuid, error })
            }
        }
    }

    async fn emit(&self, kind: EventKind, run_uuid: &RunId, object_key: &str) -> Result<(), CycleError> {
        let event = LifecycleEvent::new(kind, run_uuid.clone(), object_key, self.clock.now());
        self.publisher.publish(&event).await?;
        info!(event = %kind, run_uuid = %run_uuid, object_key, "Published lifecycle event");
        Ok(())
    }
}
