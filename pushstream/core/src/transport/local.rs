//! Local Buffer Transport
//!
//! In-process delivery for development servers and test harnesses. Each
//! connection owns an ordered queue of serialized envelopes. Concurrent
//! producers append, a single relay pops (see [`super::relay::LocalRelay`]).
//!
//! # Usage
//!
//! ```ignore
//! let buffer = LocalStreamBuffer::new();
//! let connection_id = buffer.register_connection();
//! let transport = LocalBufferAdapter::new(buffer.clone());
//!
//! // Hand `transport` to a StreamManager; drain `buffer` from the relay.
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::envelope::Envelope;

use super::config::TransportMode;
use super::traits::{ConnectionHandle, PushTransport, TransportError};

/// One connection's pending messages
#[derive(Debug, Default)]
pub(crate) struct ConnectionQueue {
    messages: Mutex<VecDeque<String>>,
    appended: Notify,
}

impl ConnectionQueue {
    pub(crate) fn pop(&self) -> Option<String> {
        self.messages.lock().pop_front()
    }

    /// Resolves after the next append, or immediately if one happened since
    /// the last wakeup
    pub(crate) async fn appended(&self) {
        self.appended.notified().await;
    }
}

/// Shared per-connection message queues
///
/// Cloning is cheap and every clone sees the same queues.
#[derive(Clone, Debug, Default)]
pub struct LocalStreamBuffer {
    queues: Arc<DashMap<String, Arc<ConnectionQueue>>>,
}

impl LocalStreamBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh connection id with an empty queue
    pub fn register_connection(&self) -> String {
        let connection_id = uuid::Uuid::new_v4().simple().to_string();
        self.queue(&connection_id);
        tracing::debug!(connection_id = %connection_id, "Registered local connection");
        connection_id
    }

    /// Get or create a connection's queue
    ///
    /// The map guard is released before the queue is returned.
    pub(crate) fn queue(&self, connection_id: &str) -> Arc<ConnectionQueue> {
        if let Some(queue) = self.queues.get(connection_id) {
            return Arc::clone(queue.value());
        }
        Arc::clone(
            self.queues
                .entry(connection_id.to_string())
                .or_default()
                .value(),
        )
    }

    /// Append one serialized message
    pub fn append(&self, connection_id: &str, message: String) {
        let queue = self.queue(connection_id);
        queue.messages.lock().push_back(message);
        queue.appended.notify_one();
    }

    /// Pop the oldest pending message
    pub fn pop(&self, connection_id: &str) -> Option<String> {
        let queue = self.queues.get(connection_id).map(|q| Arc::clone(q.value()))?;
        queue.pop()
    }

    /// Copy of the pending messages, oldest first
    #[must_use]
    pub fn snapshot(&self, connection_id: &str) -> Vec<String> {
        self.queues
            .get(connection_id)
            .map(|q| q.messages.lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove and return every pending message
    pub fn drain(&self, connection_id: &str) -> Vec<String> {
        self.queues
            .get(connection_id)
            .map(|q| q.messages.lock().drain(..).collect())
            .unwrap_or_default()
    }

    /// Number of pending messages
    #[must_use]
    pub fn len(&self, connection_id: &str) -> usize {
        self.queues
            .get(connection_id)
            .map_or(0, |q| q.messages.lock().len())
    }

    /// Whether a connection has no pending messages
    #[must_use]
    pub fn is_empty(&self, connection_id: &str) -> bool {
        self.len(connection_id) == 0
    }

    /// Whether a queue exists for the connection
    #[must_use]
    pub fn contains(&self, connection_id: &str) -> bool {
        self.queues.contains_key(connection_id)
    }

    /// Drop a connection's queue and any messages still in it
    pub fn remove(&self, connection_id: &str) -> bool {
        self.queues.remove(connection_id).is_some()
    }

    /// Number of connections with a queue
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.queues.len()
    }
}

/// [`PushTransport`] that appends to a [`LocalStreamBuffer`]
#[derive(Clone, Debug)]
pub struct LocalBufferAdapter {
    buffer: LocalStreamBuffer,
}

impl LocalBufferAdapter {
    #[must_use]
    pub fn new(buffer: LocalStreamBuffer) -> Self {
        Self { buffer }
    }

    #[must_use]
    pub fn buffer(&self) -> &LocalStreamBuffer {
        &self.buffer
    }
}

#[async_trait]
impl PushTransport for LocalBufferAdapter {
    fn mode(&self) -> TransportMode {
        TransportMode::Local
    }

    async fn push(
        &self,
        handle: &ConnectionHandle,
        envelope: &Envelope,
    ) -> Result<(), TransportError> {
        let message = envelope.to_json()?;
        self.buffer.append(handle.connection_id(), message);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        // Queues belong to the relay; nothing to release here.
        Ok(())
    }
}
