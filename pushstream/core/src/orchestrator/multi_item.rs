//! Multi-Item Orchestrator
//!
//! Fans a list of work items out concurrently over one stream. Every item
//! yields exactly one outcome envelope; a failing or panicking handler only
//! affects its own item.
//!
//! # Scheduling
//!
//! All units are polled concurrently on the job's task inside one progress
//! scope. When more than one item is submitted and the handler marks some of
//! them as cache warmers, those run first as their own wave and the rest
//! follow once they finish. Outcome envelopes go out in completion order.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use serde_json::Map;

use crate::envelope::{Envelope, MessageType};
use crate::handler::ItemHandler;
use crate::items::{Outcome, WorkItem};
use crate::streaming::StreamManager;

use super::panic_message;

/// Runs a batch of [`WorkItem`]s against an [`ItemHandler`]
#[derive(Clone)]
pub struct MultiItemOrchestrator {
    stream: StreamManager,
    handler: Arc<dyn ItemHandler>,
}

impl MultiItemOrchestrator {
    pub fn new(stream: StreamManager, handler: Arc<dyn ItemHandler>) -> Self {
        Self { stream, handler }
    }

    #[must_use]
    pub fn stream(&self) -> &StreamManager {
        &self.stream
    }

    /// Run every item, push the terminal marker, release the transport
    ///
    /// Returns one outcome per item in input order, whatever order they were
    /// streamed in.
    pub async fn process(&self, items: Vec<WorkItem>) -> Vec<Outcome> {
        let total = items.len();
        tracing::info!(
            connection_id = %self.stream.connection_id(),
            items = total,
            "Processing work items"
        );

        let outcomes = self.stream.with_progress(self.run_waves(&items)).await;

        self.finish(total).await;
        self.stream.cleanup().await;
        outcomes
    }

    /// Detached-task entry point
    ///
    /// Opens the transport, runs [`process`](Self::process), and turns
    /// anything that escapes it into a best-effort error push. The transport
    /// is released on every path.
    pub async fn run_as_task(self, items: Vec<WorkItem>) -> Vec<Outcome> {
        if let Err(e) = self.stream.open().await {
            tracing::error!(
                connection_id = %self.stream.connection_id(),
                error = %e,
                "Failed to open transport; continuing so outcomes are still produced"
            );
        }

        let total = items.len();
        let outcomes = match AssertUnwindSafe(self.process(items)).catch_unwind().await {
            Ok(outcomes) => outcomes,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    connection_id = %self.stream.connection_id(),
                    error = %message,
                    "Item job failed"
                );
                self.stream.settle_heartbeat().await;
                let _ = self
                    .stream
                    .send_error(format!("Background task error: {message}"))
                    .await;
                self.finish(total).await;
                Vec::new()
            }
        };

        self.stream.cleanup().await;
        outcomes
    }

    async fn finish(&self, total: usize) {
        let mut data = Map::new();
        data.insert("message".into(), "Item stream ended".into());
        data.insert("total_items".into(), total.into());
        if let Err(e) = self.stream.send_stream_end(data).await {
            tracing::warn!(
                connection_id = %self.stream.connection_id(),
                error = %e,
                "Failed to push stream end"
            );
        }
    }

    async fn run_waves(&self, items: &[WorkItem]) -> Vec<Outcome> {
        let (warmers, rest): (Vec<(usize, &WorkItem)>, Vec<(usize, &WorkItem)>) =
            if items.len() > 1 {
                items
                    .iter()
                    .enumerate()
                    .partition(|(_, item)| self.handler.warms_cache(item))
            } else {
                (Vec::new(), items.iter().enumerate().collect())
            };

        let mut slots: Vec<Option<Outcome>> = vec![None; items.len()];

        if !warmers.is_empty() {
            tracing::debug!(
                connection_id = %self.stream.connection_id(),
                warmers = warmers.len(),
                "Running cache-warming wave"
            );
            for (index, outcome) in self.run_wave(&warmers).await {
                slots[index] = Some(outcome);
            }
        }
        for (index, outcome) in self.run_wave(&rest).await {
            slots[index] = Some(outcome);
        }

        slots.into_iter().flatten().collect()
    }

    async fn run_wave(&self, wave: &[(usize, &WorkItem)]) -> Vec<(usize, Outcome)> {
        join_all(
            wave.iter()
                .map(|&(index, item)| async move { (index, self.run_unit(item).await) }),
        )
        .await
    }

    async fn run_unit(&self, item: &WorkItem) -> Outcome {
        if item.is_fresh_query() {
            let start = Envelope::new(MessageType::ITEM_START)
                .with_item_id(item.item_id)
                .with_message("Item processing started");
            match self.stream.push(start).await {
                Ok(()) => {}
                Err(e) if e.is_peer_gone() => {
                    tracing::debug!(item_id = item.item_id, "Start push skipped; peer gone");
                }
                Err(e) => {
                    tracing::warn!(item_id = item.item_id, error = %e, "Start push failed");
                }
            }
        }

        let outcome = match AssertUnwindSafe(self.handler.execute(item))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => Outcome::from_result(item.item_id, result),
            Ok(Err(e)) => {
                tracing::warn!(item_id = item.item_id, error = %e, "Item handler failed");
                Outcome::handler_error(item.item_id, format!("{e:#}"))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(item_id = item.item_id, error = %message, "Item handler panicked");
                Outcome::handler_error(item.item_id, message)
            }
        };

        self.push_outcome(&outcome).await;
        outcome
    }

    async fn push_outcome(&self, outcome: &Outcome) {
        let envelope = match outcome.to_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(item_id = outcome.item_id, error = %e, "Failed to encode outcome");
                Envelope::new(MessageType::ITEM_FAIL)
                    .with_item_id(outcome.item_id)
                    .with_message(format!("Failed to encode result: {e}"))
            }
        };

        match self.stream.push(envelope).await {
            Ok(()) => {}
            Err(e) if e.is_peer_gone() => {}
            Err(e) => {
                let _ = self
                    .stream
                    .send_error(format!(
                        "Failed to deliver result for item {}: {e}",
                        outcome.item_id
                    ))
                    .await;
            }
        }
    }
}
