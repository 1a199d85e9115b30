//! Single-Unit Orchestrator
//!
//! Runs one post-processing unit under a heartbeat and reports exactly one
//! terminal outcome: `POST_PROCESS_START`, then either
//! `POST_PROCESS_COMPLETE` or `POST_PROCESS_ERROR`, then `STREAM_END`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::envelope::{Envelope, MessageType};
use crate::handler::PostProcessHandler;
use crate::items::PostProcessRequest;
use crate::streaming::StreamManager;
use crate::transport::TransportError;

use super::panic_message;

/// Why a post-processing run did not complete
#[derive(Debug, Error)]
pub enum PostProcessError {
    /// The payload carried no review id
    #[error("review_id is required for post-processing")]
    MissingReviewId,

    /// The handler failed or panicked
    #[error("{0}")]
    Handler(String),

    /// The completion message could not be delivered
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Null and empty results carry nothing for the client; they are reported
/// as a plain success marker instead.
fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// Runs a [`PostProcessRequest`] against a [`PostProcessHandler`]
#[derive(Clone)]
pub struct SingleUnitOrchestrator {
    stream: StreamManager,
    handler: Arc<dyn PostProcessHandler>,
}

impl SingleUnitOrchestrator {
    pub fn new(stream: StreamManager, handler: Arc<dyn PostProcessHandler>) -> Self {
        Self { stream, handler }
    }

    #[must_use]
    pub fn stream(&self) -> &StreamManager {
        &self.stream
    }

    /// Run the unit and stream its outcome followed by the terminal marker
    ///
    /// Every failure is reported on the stream before it is returned, so
    /// callers only need the result for logging.
    pub async fn process(&self, request: PostProcessRequest) -> Result<Value, PostProcessError> {
        let start = Envelope::new(MessageType::POST_PROCESS_START)
            .with_message("Post-processing started");
        match self.stream.push(start).await {
            Ok(()) => {}
            Err(e) if e.is_peer_gone() => {
                tracing::debug!(
                    connection_id = %self.stream.connection_id(),
                    "Start push skipped; peer gone"
                );
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.stream.connection_id(),
                    error = %e,
                    "Start push failed"
                );
            }
        }

        let result = match request.review_id {
            None => Err(PostProcessError::MissingReviewId),
            Some(review_id) => {
                tracing::info!(
                    connection_id = %self.stream.connection_id(),
                    review_id,
                    "Post-processing started"
                );
                self.stream.with_progress(self.execute(&request)).await
            }
        };

        let result = match result {
            Ok(value) => self.report_complete(value).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::warn!(
                connection_id = %self.stream.connection_id(),
                error = %e,
                "Post-processing failed"
            );
            let error = Envelope::new(MessageType::POST_PROCESS_ERROR)
                .with_message(format!("Post-processing failed: {e}"));
            let _ = self.stream.push(error).await;
        }

        let mut end = Map::new();
        end.insert("message".into(), "Post-processing stream ended".into());
        if let Err(e) = self.stream.send_stream_end(end).await {
            tracing::debug!(
                connection_id = %self.stream.connection_id(),
                error = %e,
                "Stream end push failed"
            );
        }

        result
    }

    /// Detached-task entry point
    ///
    /// Anything escaping [`process`](Self::process) becomes a best-effort
    /// error push; the transport is released afterwards in every case.
    pub async fn run_as_task(self, request: PostProcessRequest) -> Result<Value, PostProcessError> {
        if let Err(e) = self.stream.open().await {
            tracing::error!(
                connection_id = %self.stream.connection_id(),
                error = %e,
                "Failed to open transport"
            );
        }

        let result = match AssertUnwindSafe(self.process(request)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    connection_id = %self.stream.connection_id(),
                    error = %message,
                    "Post-processing task failed"
                );
                self.stream.settle_heartbeat().await;
                let _ = self
                    .stream
                    .send_error(format!("Background task error: {message}"))
                    .await;
                let mut end = Map::new();
                end.insert("message".into(), "Post-processing stream ended".into());
                let _ = self.stream.send_stream_end(end).await;
                Err(PostProcessError::Handler(message))
            }
        };

        self.stream.cleanup().await;
        result
    }

    async fn execute(&self, request: &PostProcessRequest) -> Result<Value, PostProcessError> {
        match AssertUnwindSafe(self.handler.execute_post_process(request))
            .catch_unwind()
            .await
        {
            Ok(Ok(Some(value))) if !is_empty_result(&value) => Ok(value),
            Ok(Ok(_)) => Ok(json!({"status": "SUCCESS"})),
            Ok(Err(e)) => Err(PostProcessError::Handler(format!("{e:#}"))),
            Err(panic) => Err(PostProcessError::Handler(panic_message(panic.as_ref()))),
        }
    }

    async fn report_complete(&self, value: Value) -> Result<Value, PostProcessError> {
        let complete = Envelope::new(MessageType::POST_PROCESS_COMPLETE)
            .with_message("Post-processing completed successfully")
            .with_field("result", value.clone())
            .with_field("progress", 100);

        match self.stream.push(complete).await {
            Ok(()) => Ok(value),
            // Nobody is listening; the work itself still succeeded.
            Err(e) if e.is_peer_gone() => Ok(value),
            Err(e) => Err(e.into()),
        }
    }
}
