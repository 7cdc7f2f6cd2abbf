//! Handling of one object-created notification.

use backup_core::{Clock, EventPublisher, ObjectCopier, Producer, ProducerOutcome};
use backup_types::ObjectCreatedNotification;
use tracing::info;

use crate::error::WorkerError;

/// Parse `body` as an S3 object-created notification and run every record
/// through `producer`, in order.
///
/// Copy failures are reported in the returned outcomes, not as errors.
///
/// # Errors
///
/// Returns [`WorkerError::Notification`] if the body is not a notification
/// with at least one valid record, and [`WorkerError::Cycle`] if an event
/// cannot be published. Records after a publish failure are not handled.
pub async fn handle_notification<P, C, K>(
    producer: &Producer<'_, P, C, K>,
    body: &[u8],
) -> Result<Vec<ProducerOutcome>, WorkerError>
where
    P: EventPublisher,
    C: ObjectCopier,
    K: Clock,
{
    let objects = ObjectCreatedNotification::from_slice(body)?.objects()?;
    info!(records = objects.len(), "notification received");

    let mut outcomes = Vec::with_capacity(objects.len());
    for object in &objects {
        outcomes.push(producer.handle(object).await?);
    }
    Ok(outcomes)
}
