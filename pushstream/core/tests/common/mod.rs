//! Shared fixtures for pushstream integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use pushstream_core::{
    ConnectionHandle, Envelope, ItemHandler, MessageType, PostProcessHandler, PostProcessRequest,
    PushTransport, StreamManager, StreamManagerConfig, TransportError, TransportMode, WorkItem,
};

/// Transport that records every envelope and can fail on a chosen call
#[derive(Default)]
pub struct ScriptedTransport {
    pub delivered: Mutex<Vec<Envelope>>,
    pub attempts: AtomicUsize,
    pub closes: AtomicUsize,
    /// 1-based call number from which every push reports the peer gone
    pub peer_gone_from: Option<usize>,
    /// 1-based call numbers that fail with a generic send error
    pub flaky_calls: Vec<usize>,
}

impl ScriptedTransport {
    pub fn peer_gone_at(k: usize) -> Self {
        Self {
            peer_gone_from: Some(k),
            ..Default::default()
        }
    }

    pub fn flaky(calls: Vec<usize>) -> Self {
        Self {
            flaky_calls: calls,
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn kinds(&self) -> Vec<MessageType> {
        self.delivered.lock().iter().map(|e| e.kind.clone()).collect()
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Gateway
    }

    async fn push(
        &self,
        handle: &ConnectionHandle,
        envelope: &Envelope,
    ) -> Result<(), TransportError> {
        let call = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.peer_gone_from.is_some_and(|k| call >= k) {
            return Err(TransportError::PeerGone(handle.connection_id().to_string()));
        }
        if self.flaky_calls.contains(&call) {
            return Err(TransportError::SendFailed(format!("flaky call {call}")));
        }
        self.delivered.lock().push(envelope.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Box adapter so a test can keep its own handle on the transport
pub struct Shared(pub Arc<ScriptedTransport>);

#[async_trait]
impl PushTransport for Shared {
    fn mode(&self) -> TransportMode {
        self.0.mode()
    }

    async fn push(
        &self,
        handle: &ConnectionHandle,
        envelope: &Envelope,
    ) -> Result<(), TransportError> {
        self.0.push(handle, envelope).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.0.close().await
    }
}

/// Stream manager over a scripted transport
pub fn scripted_stream(
    transport: ScriptedTransport,
    heartbeat_interval: std::time::Duration,
) -> (StreamManager, Arc<ScriptedTransport>) {
    let transport = Arc::new(transport);
    let stream = StreamManager::with_config(
        ConnectionHandle::new("conn-test", TransportMode::Gateway),
        Box::new(Shared(Arc::clone(&transport))),
        StreamManagerConfig { heartbeat_interval },
    );
    (stream, transport)
}

/// Item handler that fails for chosen ids and otherwise completes
pub struct ItemScript {
    pub fail_with: Vec<(i64, &'static str)>,
    pub delay: std::time::Duration,
}

impl ItemScript {
    pub fn all_succeed() -> Self {
        Self {
            fail_with: Vec::new(),
            delay: std::time::Duration::ZERO,
        }
    }
}

#[async_trait]
impl ItemHandler for ItemScript {
    async fn execute(&self, item: &WorkItem) -> anyhow::Result<Value> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some((_, msg)) = self.fail_with.iter().find(|(id, _)| *id == item.item_id) {
            anyhow::bail!("{msg}");
        }
        Ok(json!({
            "type": "REVIEW_COMPLETE",
            "name": format!("agent-{}", item.item_id),
            "category": "GENERAL",
            "model": "test-model",
        }))
    }
}

/// Post-processing handler that always succeeds
pub struct PostProcessOk;

#[async_trait]
impl PostProcessHandler for PostProcessOk {
    async fn execute_post_process(
        &self,
        _request: &PostProcessRequest,
    ) -> anyhow::Result<Option<Value>> {
        Ok(Some(json!({"status": "SUCCESS", "summary": "done"})))
    }
}

/// Initialize a test log subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
