//! Heartbeat loop and progress guard.
//!
//! While a unit of work is in flight the stream manager pushes an
//! IN_PROGRESS envelope every `interval`, so the client (and any idle
//! timeout in the gateway) can tell the job is still alive.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::envelope::{Envelope, MessageType};

use super::stream_manager::StreamManager;

/// Why the heartbeat loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// The owning scope cancelled it.
    Cancelled,
    /// The peer was classified as gone.
    PeerGone,
}

/// Summary of one heartbeat run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatReport {
    /// IN_PROGRESS envelopes delivered.
    pub sent: usize,
    /// How the loop ended.
    pub exit: HeartbeatExit,
}

/// Push IN_PROGRESS every `interval` until cancelled or the peer is gone.
///
/// Each iteration sleeps first, so a scope shorter than one interval emits
/// nothing. Generic transport failures are logged and the loop keeps going.
pub async fn run_heartbeat(
    stream: StreamManager,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatReport {
    let mut sent = 0usize;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return HeartbeatReport { sent, exit: HeartbeatExit::Cancelled };
            }
            () = time::sleep(interval) => {}
        }

        if stream.is_dead() {
            return HeartbeatReport { sent, exit: HeartbeatExit::PeerGone };
        }

        match stream.push(Envelope::new(MessageType::IN_PROGRESS)).await {
            Ok(()) => sent += 1,
            Err(e) if e.is_peer_gone() => {
                return HeartbeatReport { sent, exit: HeartbeatExit::PeerGone };
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %stream.connection_id(),
                    error = %e,
                    "Heartbeat push failed"
                );
            }
        }
    }
}

/// Owns a running heartbeat for the duration of a progress scope.
///
/// [`stop`](Self::stop) cancels and joins the task. Dropping the guard
/// without stopping it (panic, or the scope future being dropped) cancels
/// and aborts the task instead, so the heartbeat never outlives its scope.
/// A push the aborted task had in flight may still land afterwards; the
/// task is handed to the stream manager, and
/// [`StreamManager::settle_heartbeat`] waits it out.
pub struct ProgressGuard {
    stream: StreamManager,
    cancel: CancellationToken,
    task: Option<JoinHandle<HeartbeatReport>>,
    owns_scope: bool,
}

impl ProgressGuard {
    pub(crate) fn start(stream: &StreamManager, interval: Duration) -> Self {
        let cancel = CancellationToken::new();

        if !stream.try_acquire_scope() {
            tracing::warn!(
                connection_id = %stream.connection_id(),
                "Progress scope already active; not starting a second heartbeat"
            );
            return Self {
                stream: stream.clone(),
                cancel,
                task: None,
                owns_scope: false,
            };
        }

        let task = tokio::spawn(run_heartbeat(stream.clone(), interval, cancel.clone()));
        tracing::debug!(
            connection_id = %stream.connection_id(),
            interval_ms = interval.as_millis() as u64,
            "Heartbeat started"
        );

        Self {
            stream: stream.clone(),
            cancel,
            task: Some(task),
            owns_scope: true,
        }
    }

    /// Whether this guard is running a heartbeat.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the heartbeat and wait for it to finish.
    ///
    /// Returns `None` if this guard never started a heartbeat.
    pub async fn stop(mut self) -> Option<HeartbeatReport> {
        self.cancel.cancel();
        let task = self.task.take()?;

        match task.await {
            Ok(report) => {
                tracing::debug!(
                    connection_id = %self.stream.connection_id(),
                    sent = report.sent,
                    exit = ?report.exit,
                    "Heartbeat stopped"
                );
                Some(report)
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.stream.connection_id(),
                    error = %e,
                    "Heartbeat task did not finish cleanly"
                );
                None
            }
        }
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
            self.stream.adopt_heartbeat(task);
        }
        if self.owns_scope {
            self.stream.release_scope();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::transport::{
        ConnectionHandle, LocalBufferAdapter, LocalStreamBuffer, PushTransport, TransportError,
        TransportMode,
    };

    fn local_stream() -> (StreamManager, LocalStreamBuffer) {
        let buffer = LocalStreamBuffer::new();
        let stream = StreamManager::new(
            ConnectionHandle::new("hb", TransportMode::Local),
            Box::new(LocalBufferAdapter::new(buffer.clone())),
        );
        (stream, buffer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_pushes_once_per_interval() {
        let (stream, buffer) = local_stream();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_heartbeat(
            stream,
            Duration::from_secs(10),
            cancel.clone(),
        ));

        time::sleep(Duration::from_secs(35)).await;
        cancel.cancel();
        let report = task.await.unwrap();

        assert_eq!(report.exit, HeartbeatExit::Cancelled);
        assert_eq!(report.sent, 3);
        assert_eq!(buffer.len("hb"), 3);
    }

    #[tokio::test]
    async fn test_heartbeat_cancelled_before_first_tick() {
        let (stream, buffer) = local_stream();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_heartbeat(stream, Duration::from_secs(60), cancel).await;
        assert_eq!(report, HeartbeatReport { sent: 0, exit: HeartbeatExit::Cancelled });
        assert!(buffer.is_empty("hb"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_exits_when_peer_dead() {
        let (stream, buffer) = local_stream();
        stream.handle().mark_dead();

        let report =
            run_heartbeat(stream, Duration::from_millis(100), CancellationToken::new()).await;
        assert_eq!(report.exit, HeartbeatExit::PeerGone);
        assert!(buffer.is_empty("hb"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_stop_joins_task() {
        let (stream, _buffer) = local_stream();
        let guard = ProgressGuard::start(&stream, Duration::from_secs(1));
        assert!(guard.is_running());
        assert!(stream.scope_active());

        let report = guard.stop().await.unwrap();
        assert_eq!(report.exit, HeartbeatExit::Cancelled);
        assert!(!stream.scope_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_guard_does_not_start_heartbeat() {
        let (stream, _buffer) = local_stream();
        let outer = ProgressGuard::start(&stream, Duration::from_secs(1));
        let inner = ProgressGuard::start(&stream, Duration::from_secs(1));

        assert!(!inner.is_running());
        assert!(inner.stop().await.is_none());
        assert!(stream.scope_active());

        outer.stop().await;
        assert!(!stream.scope_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_guard_releases_scope() {
        let (stream, buffer) = local_stream();
        {
            let _guard = ProgressGuard::start(&stream, Duration::from_secs(1));
        }
        assert!(!stream.scope_active());

        time::sleep(Duration::from_secs(5)).await;
        assert!(buffer.is_empty("hb"));
    }

    /// Push that never completes on its own; counts pushes still alive
    struct StuckTransport {
        in_flight: Arc<AtomicUsize>,
    }

    struct InFlight(Arc<AtomicUsize>);

    impl Drop for InFlight {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PushTransport for StuckTransport {
        fn mode(&self) -> TransportMode {
            TransportMode::Gateway
        }

        async fn push(
            &self,
            _handle: &ConnectionHandle,
            _envelope: &Envelope,
        ) -> Result<(), TransportError> {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let _alive = InFlight(Arc::clone(&self.in_flight));
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_guard_hands_in_flight_push_to_settle() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let stream = StreamManager::new(
            ConnectionHandle::new("stuck", TransportMode::Gateway),
            Box::new(StuckTransport {
                in_flight: Arc::clone(&in_flight),
            }),
        );

        let guard = ProgressGuard::start(&stream, Duration::from_secs(1));
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(in_flight.load(Ordering::SeqCst), 1);

        // Abort is requested but the task has not been polled since
        drop(guard);
        assert_eq!(in_flight.load(Ordering::SeqCst), 1);

        stream.settle_heartbeat().await;
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
        assert!(!stream.scope_active());
    }
}
