//! Stream Manager Implementation
//!
//! Owns one connection's outbound stream for the lifetime of one job.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::envelope::{Envelope, MessageType};
use crate::transport::{ConnectionHandle, PushTransport, TransportError, TransportMode};

use super::heartbeat::{HeartbeatReport, ProgressGuard};

/// Default cadence of IN_PROGRESS envelopes
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a stream manager
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamManagerConfig {
    /// Interval used by [`StreamManager::with_progress`]
    pub heartbeat_interval: Duration,
}

impl Default for StreamManagerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle phase of one job's stream
///
/// Phases only move forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPhase {
    /// Constructed, transport not opened
    #[default]
    Init,
    /// Transport opened
    TransportReady,
    /// Work and heartbeat running
    Streaming,
    /// Terminal marker sent, winding down
    Draining,
    /// Transport released
    Closed,
}

impl JobPhase {
    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::TransportReady => "transport ready",
            Self::Streaming => "streaming",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

// ============================================================================
// Stream Manager
// ============================================================================

struct Inner {
    handle: ConnectionHandle,
    transport: Box<dyn PushTransport>,
    config: StreamManagerConfig,
    phase: Mutex<JobPhase>,
    opened: AtomicBool,
    terminal_sent: AtomicBool,
    closed: AtomicBool,
    scope_active: AtomicBool,
    /// Heartbeat aborted by a dropped guard, possibly still mid-push
    orphaned_heartbeat: Mutex<Option<JoinHandle<HeartbeatReport>>>,
}

/// Per-connection outbound stream
///
/// Handles envelope stamping, dead-peer suppression, the heartbeat, the
/// exactly-once terminal marker and transport release. Cloning is cheap;
/// clones share all state, which is how concurrent per-item units and the
/// heartbeat push through the same stream.
#[derive(Clone)]
pub struct StreamManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamManager")
            .field("handle", &self.inner.handle)
            .field("phase", &self.phase())
            .field("terminal_sent", &self.terminal_sent())
            .finish_non_exhaustive()
    }
}

impl StreamManager {
    /// Create a stream manager with default configuration
    pub fn new(handle: ConnectionHandle, transport: Box<dyn PushTransport>) -> Self {
        Self::with_config(handle, transport, StreamManagerConfig::default())
    }

    /// Create a stream manager with custom configuration
    pub fn with_config(
        handle: ConnectionHandle,
        transport: Box<dyn PushTransport>,
        config: StreamManagerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                handle,
                transport,
                config,
                phase: Mutex::new(JobPhase::Init),
                opened: AtomicBool::new(false),
                terminal_sent: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                scope_active: AtomicBool::new(false),
                orphaned_heartbeat: Mutex::new(None),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn handle(&self) -> &ConnectionHandle {
        &self.inner.handle
    }

    #[must_use]
    pub fn connection_id(&self) -> &str {
        self.inner.handle.connection_id()
    }

    #[must_use]
    pub fn mode(&self) -> TransportMode {
        self.inner.handle.mode()
    }

    #[must_use]
    pub fn config(&self) -> &StreamManagerConfig {
        &self.inner.config
    }

    /// Whether the peer has been classified as gone
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.inner.handle.is_dead()
    }

    /// Whether the terminal marker has been sent (or attempted)
    #[must_use]
    pub fn terminal_sent(&self) -> bool {
        self.inner.terminal_sent.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn phase(&self) -> JobPhase {
        *self.inner.phase.lock()
    }

    /// Whether a progress scope currently owns the heartbeat
    #[must_use]
    pub fn scope_active(&self) -> bool {
        self.inner.scope_active.load(Ordering::Acquire)
    }

    fn advance_phase(&self, to: JobPhase) {
        let mut phase = self.inner.phase.lock();
        if to > *phase {
            tracing::debug!(
                connection_id = %self.connection_id(),
                from = %*phase,
                to = %to,
                "Stream phase changed"
            );
            *phase = to;
        }
    }

    pub(crate) fn try_acquire_scope(&self) -> bool {
        self.inner
            .scope_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release_scope(&self) {
        self.inner.scope_active.store(false, Ordering::Release);
    }

    /// Keep an aborted heartbeat task so later pushes can wait it out
    pub(crate) fn adopt_heartbeat(&self, task: JoinHandle<HeartbeatReport>) {
        *self.inner.orphaned_heartbeat.lock() = Some(task);
    }

    /// Wait until a heartbeat aborted by a dropped guard has fully stopped
    ///
    /// Abort only takes effect at the task's next poll, so a heartbeat push
    /// can still be in flight right after the guard is dropped. Call this
    /// before pushing anything that must not be overtaken by it.
    pub async fn settle_heartbeat(&self) {
        let task = self.inner.orphaned_heartbeat.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(
                        connection_id = %self.connection_id(),
                        error = %e,
                        "Aborted heartbeat did not finish cleanly"
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Transport lifecycle
    // ------------------------------------------------------------------

    /// Open the transport; a second call is a no-op
    pub async fn open(&self) -> Result<(), TransportError> {
        if self.inner.opened.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.transport.open().await?;
        self.advance_phase(JobPhase::TransportReady);
        tracing::info!(
            connection_id = %self.connection_id(),
            mode = %self.mode(),
            "Stream transport ready"
        );
        Ok(())
    }

    /// Release the transport
    ///
    /// Idempotent. Close failures are logged, never returned: cleanup runs on
    /// every exit path and must not introduce a new failure.
    pub async fn cleanup(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.inner.transport.close().await {
            tracing::warn!(
                connection_id = %self.connection_id(),
                error = %e,
                "Failed to close transport"
            );
        }
        self.advance_phase(JobPhase::Closed);
        tracing::info!(connection_id = %self.connection_id(), "Stream closed");
    }

    // ------------------------------------------------------------------
    // Pushing
    // ------------------------------------------------------------------

    /// Stamp and deliver one envelope
    ///
    /// Silently does nothing once the peer is gone or the terminal marker has
    /// been sent. A STREAM_END envelope is routed through
    /// [`send_terminal`](Self::send_terminal) so it still goes out only once.
    ///
    /// # Errors
    ///
    /// `TransportError::PeerGone` the first time the transport reports the
    /// peer gone (the handle is marked dead before returning); any other
    /// transport error unchanged.
    pub async fn push(&self, envelope: Envelope) -> Result<(), TransportError> {
        if envelope.kind.is_terminal() {
            return self.send_terminal(envelope).await;
        }
        if self.terminal_sent() {
            tracing::debug!(
                connection_id = %self.connection_id(),
                message_type = %envelope.kind,
                "Dropping push after stream end"
            );
            return Ok(());
        }
        self.deliver(envelope).await
    }

    async fn deliver(&self, envelope: Envelope) -> Result<(), TransportError> {
        if self.is_dead() {
            tracing::debug!(
                connection_id = %self.connection_id(),
                message_type = %envelope.kind,
                "Peer gone; skipping push"
            );
            return Ok(());
        }

        let stamped = envelope.stamped(Utc::now());
        match self.inner.transport.push(&self.inner.handle, &stamped).await {
            Ok(()) => {
                tracing::debug!(
                    connection_id = %self.connection_id(),
                    message_type = %stamped.kind,
                    item_id = ?stamped.item_id,
                    "Pushed envelope"
                );
                Ok(())
            }
            Err(e) if e.is_peer_gone() => {
                if self.inner.handle.mark_dead() {
                    tracing::warn!(
                        connection_id = %self.connection_id(),
                        message_type = %stamped.kind,
                        "Peer gone; suppressing further pushes"
                    );
                }
                Err(e)
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.connection_id(),
                    message_type = %stamped.kind,
                    error = %e,
                    "Push failed"
                );
                Err(e)
            }
        }
    }

    /// Push a STREAM_ERROR envelope carrying `text`
    pub async fn send_error(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.push(Envelope::new(MessageType::STREAM_ERROR).with_message(text))
            .await
    }

    /// Push the terminal marker with the given payload
    pub async fn send_stream_end(&self, data: Map<String, Value>) -> Result<(), TransportError> {
        self.send_terminal(Envelope::new(MessageType::STREAM_END).with_data(data))
            .await
    }

    /// Push `envelope` as the terminal marker, at most once
    ///
    /// Later calls return `Ok(())` without touching the transport. The phase
    /// moves to [`JobPhase::Draining`] even if the push itself fails.
    pub async fn send_terminal(&self, envelope: Envelope) -> Result<(), TransportError> {
        if self.inner.terminal_sent.swap(true, Ordering::AcqRel) {
            tracing::debug!(
                connection_id = %self.connection_id(),
                "Terminal marker already sent"
            );
            return Ok(());
        }
        self.advance_phase(JobPhase::Draining);
        self.settle_heartbeat().await;
        self.deliver(envelope).await
    }

    // ------------------------------------------------------------------
    // Progress scope
    // ------------------------------------------------------------------

    /// Start the heartbeat and return the guard that stops it
    ///
    /// Prefer [`progress_scope`](Self::progress_scope), which pairs the
    /// start with a stop on every exit path.
    pub fn start_progress(&self, interval: Duration) -> ProgressGuard {
        self.advance_phase(JobPhase::Streaming);
        ProgressGuard::start(self, interval)
    }

    /// Run `work` with a heartbeat every `interval`
    ///
    /// The heartbeat is cancelled and joined before the work's output is
    /// returned. If `work` panics or this future is dropped mid-flight, the
    /// guard cancels and aborts the heartbeat as it unwinds.
    pub async fn progress_scope<F, T>(&self, interval: Duration, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let guard = self.start_progress(interval);
        let output = work.await;
        guard.stop().await;
        output
    }

    /// [`progress_scope`](Self::progress_scope) at the configured interval
    pub async fn with_progress<F, T>(&self, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let interval = self.inner.config.heartbeat_interval;
        self.progress_scope(interval, work).await
    }
}
