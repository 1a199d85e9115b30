//! Transport Traits
//!
//! Core trait definitions for pushing envelopes to one remote connection.
//!
//! A [`PushTransport`] is selected once per job and hides whether messages
//! travel through the managed gateway or an in-process buffer. The
//! [`ConnectionHandle`] carries the per-job peer state that both sides share.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;

use crate::envelope::Envelope;

use super::config::TransportMode;

/// Per-job view of one remote connection
///
/// `is_dead` only ever moves from false to true.
#[derive(Debug)]
pub struct ConnectionHandle {
    connection_id: String,
    mode: TransportMode,
    dead: AtomicBool,
}

impl ConnectionHandle {
    /// Create a live handle
    pub fn new(connection_id: impl Into<String>, mode: TransportMode) -> Self {
        Self {
            connection_id: connection_id.into(),
            mode,
            dead: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    #[must_use]
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Whether the peer has been classified as gone
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    /// Flip the handle to dead
    ///
    /// Returns `true` only for the call that performed the flip.
    pub fn mark_dead(&self) -> bool {
        !self.dead.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.connection_id, self.mode)
    }
}

/// Errors that can occur during transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport reports that the connection no longer exists
    #[error("peer gone: connection {0} no longer exists")]
    PeerGone(String),

    /// Any other send failure (network, gateway fault)
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Transport not in expected state
    #[error("invalid transport state: {0}")]
    InvalidState(String),

    /// Envelope could not be serialized
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether this error means the remote peer is gone
    #[must_use]
    pub fn is_peer_gone(&self) -> bool {
        matches!(self, Self::PeerGone(_))
    }
}

/// Uniform "push one message to one connection" capability
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Which delivery mechanism this is
    fn mode(&self) -> TransportMode;

    /// Prepare any client resources ahead of the first push
    ///
    /// Calling this more than once is harmless. Implementations that open
    /// lazily may treat it as a no-op.
    async fn open(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Deliver one stamped envelope
    async fn push(&self, handle: &ConnectionHandle, envelope: &Envelope)
        -> Result<(), TransportError>;

    /// Release held resources; idempotent
    async fn close(&self) -> Result<(), TransportError>;
}
