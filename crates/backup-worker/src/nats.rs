//! NATS JetStream transport for lifecycle events.
//!
//! Events live on a work-queue stream bound to a single subject. The worker
//! reads through a durable pull consumer with explicit acks: a fetch that
//! comes back short means the queue is drained, and a message that is never
//! acked is redelivered once its ack wait expires. The producer publishes
//! with a JetStream publish and waits for the server's ack.

use async_nats::jetstream::{self, Context, Message, consumer, stream};
use backup_core::{EventPublisher, EventQueue, QueueError, Received};
use backup_types::LifecycleEvent;
use futures::StreamExt;
use tracing::{debug, info};

use crate::config::QueueConfig;
use crate::error::WorkerError;

/// Connect to NATS and make sure the lifecycle stream exists.
async fn connect_stream(
    config: &QueueConfig,
) -> Result<(Context, stream::Stream), WorkerError> {
    info!(url = %config.nats_url, "connecting to NATS server");
    let client = async_nats::connect(&config.nats_url)
        .await
        .map_err(|e| WorkerError::Nats(format!("failed to connect to {}: {e}", config.nats_url)))?;
    let context = jetstream::new(client);

    let stream = context
        .get_or_create_stream(stream::Config {
            name: config.stream.clone(),
            subjects: vec![config.subject.clone()],
            retention: stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        })
        .await
        .map_err(|e| {
            WorkerError::Nats(format!("failed to set up stream {}: {e}", config.stream))
        })?;
    info!(stream = %config.stream, subject = %config.subject, "JetStream stream ready");

    Ok((context, stream))
}

/// The worker's side of the lifecycle queue.
pub struct JetStreamQueue {
    consumer: consumer::Consumer<consumer::pull::Config>,
    name: String,
}

impl JetStreamQueue {
    /// Connect and bind to the durable consumer, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Nats`] if the connection, stream, or consumer
    /// cannot be set up.
    pub async fn connect(config: &QueueConfig) -> Result<Self, WorkerError> {
        let (_, stream) = connect_stream(config).await?;
        let consumer = stream
            .get_or_create_consumer(
                &config.consumer,
                consumer::pull::Config {
                    durable_name: Some(config.consumer.clone()),
                    ack_policy: consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                WorkerError::Nats(format!(
                    "failed to set up consumer {}: {e}",
                    config.consumer
                ))
            })?;
        info!(consumer = %config.consumer, "JetStream consumer ready");

        Ok(Self {
            consumer,
            name: config.consumer.clone(),
        })
    }
}

impl EventQueue for JetStreamQueue {
    type Handle = Message;

    async fn receive(&self, max: usize) -> Result<Vec<Received<Message>>, QueueError> {
        let mut batch = self
            .consumer
            .fetch()
            .max_messages(max)
            .messages()
            .await
            .map_err(|e| QueueError::new(format!("fetch from {} failed: {e}", self.name)))?;

        let mut received = Vec::with_capacity(max);
        while let Some(message) = batch.next().await {
            let message = message
                .map_err(|e| QueueError::new(format!("fetch from {} failed: {e}", self.name)))?;
            received.push(Received {
                body: message.payload.to_vec(),
                handle: message,
            });
        }
        debug!(consumer = %self.name, count = received.len(), "fetched messages");
        Ok(received)
    }

    async fn delete(&self, handle: Message) -> Result<(), QueueError> {
        handle
            .ack()
            .await
            .map_err(|e| QueueError::new(format!("ack on {} failed: {e}", self.name)))
    }
}

impl std::fmt::Debug for JetStreamQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JetStreamQueue")
            .field("consumer", &self.name)
            .finish_non_exhaustive()
    }
}

/// The producer's side of the lifecycle queue.
pub struct JetStreamPublisher {
    context: Context,
    subject: String,
}

impl JetStreamPublisher {
    /// Connect and make sure the stream exists.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Nats`] if the connection or stream cannot be
    /// set up.
    pub async fn connect(config: &QueueConfig) -> Result<Self, WorkerError> {
        let (context, _) = connect_stream(config).await?;
        Ok(Self {
            context,
            subject: config.subject.clone(),
        })
    }
}

impl EventPublisher for JetStreamPublisher {
    async fn publish(&self, event: &LifecycleEvent) -> Result<(), QueueError> {
        let payload = event
            .to_vec()
            .map_err(|e| QueueError::new(format!("failed to serialize event: {e}")))?;
        let ack = self
            .context
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| QueueError::new(format!("failed to publish to {}: {e}", self.subject)))?;
        ack.await.map_err(|e| {
            QueueError::new(format!("publish to {} not acknowledged: {e}", self.subject))
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for JetStreamPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JetStreamPublisher")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}
