//! Queue abstraction for lifecycle events.
//!
//! The worker consumes through [`EventQueue`]: fetch up to `n` messages,
//! process each one, then delete it. A message that is received but never
//! deleted is delivered again later, which is what makes a crash mid-batch
//! safe. The producer writes through [`EventPublisher`].
//!
//! Both traits use `async fn` and are therefore not object safe; callers are
//! generic over the implementation.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use backup_types::LifecycleEvent;

/// A queue transport failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("queue error: {message}")]
pub struct QueueError {
    /// Description of the failure.
    pub message: String,
}

impl QueueError {
    /// Create a queue error from a description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A message handed out by [`EventQueue::receive`].
#[derive(Debug, Clone)]
pub struct Received<H> {
    /// Raw message body.
    pub body: Vec<u8>,
    /// Transport handle used to delete the message once processed.
    pub handle: H,
}

/// The consuming side of the lifecycle queue.
#[allow(async_fn_in_trait)]
pub trait EventQueue {
    /// Transport-specific handle for a received message.
    type Handle;

    /// Fetch up to `max` messages without waiting for more to arrive.
    ///
    /// An empty vector means the queue is drained.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the transport fails.
    async fn receive(&self, max: usize) -> Result<Vec<Received<Self::Handle>>, QueueError>;

    /// Delete a processed message so it is not delivered again.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the transport fails.
    async fn delete(&self, handle: Self::Handle) -> Result<(), QueueError>;
}

/// The producing side of the lifecycle queue.
#[allow(async_fn_in_trait)]
pub trait EventPublisher {
    /// Publish one lifecycle event and wait until the queue has accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if encoding or the transport fails.
    async fn publish(&self, event: &LifecycleEvent) -> Result<(), QueueError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    ready: VecDeque<(u64, Vec<u8>)>,
    in_flight: BTreeMap<u64, Vec<u8>>,
    next_id: u64,
}

/// An in-process queue with at-least-once semantics.
///
/// Received messages move to an in-flight set until deleted;
/// [`MemoryQueue::redeliver_unacked`] puts them back at the front, as a
/// broker would after its ack deadline. Clones share the same queue, so a
/// producer and a worker can be wired to one instance.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, QueueError> {
        self.state
            .lock()
            .map_err(|e| QueueError::new(format!("memory queue lock poisoned: {e}")))
    }

    /// Enqueue a raw body.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if the queue lock is poisoned.
    pub fn push(&self, body: Vec<u8>) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        let id = state.next_id;
        state.next_id = id.wrapping_add(1);
        state.ready.push_back((id, body));
        Ok(())
    }

    /// Enqueue an encoded lifecycle event.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if encoding fails or the lock is poisoned.
    pub fn push_event(&self, event: &LifecycleEvent) -> Result<(), QueueError> {
        let body = event
            .to_vec()
            .map_err(|e| QueueError::new(format!("failed to encode event: {e}")))?;
        self.push(body)
    }

    /// Number of messages waiting to be received.
    pub fn ready_len(&self) -> usize {
        self.lock().map_or(0, |state| state.ready.len())
    }

    /// Number of messages received but not yet deleted.
    pub fn in_flight_len(&self) -> usize {
        self.lock().map_or(0, |state| state.in_flight.len())
    }

    /// Decode every waiting message, in delivery order, without receiving it.
    ///
    /// Bodies that are not lifecycle events are skipped.
    pub fn peek_events(&self) -> Vec<LifecycleEvent> {
        self.lock().map_or_else(
            |_| Vec::new(),
            |state| {
                state
                    .ready
                    .iter()
                    .filter_map(|(_, body)| LifecycleEvent::from_slice(body).ok())
                    .collect()
            },
        )
    }

    /// Return every in-flight message to the front of the queue, keeping
    /// their original order. Returns how many were returned.
    pub fn redeliver_unacked(&self) -> usize {
        let Ok(mut state) = self.lock() else {
            return 0;
        };
        let unacked = std::mem::take(&mut state.in_flight);
        let count = unacked.len();
        for entry in unacked.into_iter().rev() {
            state.ready.push_front(entry);
        }
        count
    }
}

impl EventQueue for MemoryQueue {
    type Handle = u64;

    async fn receive(&self, max: usize) -> Result<Vec<Received<u64>>, QueueError> {
        let mut state = self.lock()?;
        let take = max.min(state.ready.len());
        let batch: Vec<(u64, Vec<u8>)> = state.ready.drain(..take).collect();
        let mut received = Vec::with_capacity(batch.len());
        for (id, body) in batch {
            state.in_flight.insert(id, body.clone());
            received.push(Received { body, handle: id });
        }
        Ok(received)
    }

    async fn delete(&self, handle: u64) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        state
            .in_flight
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| QueueError::new(format!("message {handle} is not in flight")))
    }
}

impl EventPublisher for MemoryQueue {
    async fn publish(&self, event: &LifecycleEvent) -> Result<(), QueueError> {
        self.push_event(event)
    }
}
