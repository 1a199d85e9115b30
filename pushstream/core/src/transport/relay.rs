//! Local Relay
//!
//! Companion to [`LocalBufferAdapter`](super::local::LocalBufferAdapter):
//! drains one connection's queue into an outbound channel (typically the
//! local WebSocket session) until the terminal marker has been forwarded,
//! then drops the queue.
//!
//! The relay wakes on appends rather than polling. Backpressure is whatever
//! the caller's channel provides: a bounded sender makes the relay wait for
//! the consumer, while producers keep appending to the queue.

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::envelope::MessageType;

use super::local::LocalStreamBuffer;

/// Errors that end a relay early
#[derive(Debug, Error)]
pub enum RelayError {
    /// The receiving side of the outbound channel was dropped
    #[error("relay sink closed after {forwarded} message(s)")]
    SinkClosed {
        /// Messages forwarded before the sink went away
        forwarded: usize,
    },
}

/// Forwards buffered messages for local connections
#[derive(Clone, Debug)]
pub struct LocalRelay {
    buffer: LocalStreamBuffer,
}

fn is_terminal(message: &str) -> bool {
    serde_json::from_str::<Value>(message)
        .ok()
        .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_owned))
        .is_some_and(|tag| tag == MessageType::STREAM_END.as_str())
}

impl LocalRelay {
    #[must_use]
    pub fn new(buffer: LocalStreamBuffer) -> Self {
        Self { buffer }
    }

    /// Forward messages in order until STREAM_END has been sent
    ///
    /// Returns the number of forwarded messages, terminal marker included.
    /// The connection's queue is removed once the marker is through; on
    /// error the queue is left in place.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::SinkClosed`] if `sink`'s receiver is dropped.
    pub async fn forward_until_end(
        &self,
        connection_id: &str,
        sink: mpsc::Sender<String>,
    ) -> Result<usize, RelayError> {
        let queue = self.buffer.queue(connection_id);
        let mut forwarded = 0usize;

        loop {
            while let Some(message) = queue.pop() {
                let terminal = is_terminal(&message);
                if sink.send(message).await.is_err() {
                    tracing::warn!(
                        connection_id = %connection_id,
                        forwarded,
                        "Relay sink closed before stream end"
                    );
                    return Err(RelayError::SinkClosed { forwarded });
                }
                forwarded += 1;

                if terminal {
                    self.buffer.remove(connection_id);
                    tracing::info!(
                        connection_id = %connection_id,
                        forwarded,
                        "Relay reached stream end"
                    );
                    return Ok(forwarded);
                }
            }
            queue.appended().await;
        }
    }
}
