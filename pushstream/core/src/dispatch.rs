//! Job Dispatch
//!
//! Entry point for triggers (HTTP handlers, queue consumers). A dispatch call
//! resolves the connection, builds the job's transport and stream manager,
//! and detaches the orchestrator onto its own task. The caller gets a
//! [`JoinHandle`] it is free to drop: the task handles its own errors and
//! always releases its transport.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::PushstreamConfig;
use crate::handler::{ItemHandler, PostProcessHandler};
use crate::items::{ItemsJobRequest, Outcome, PostProcessRequest};
use crate::orchestrator::{MultiItemOrchestrator, PostProcessError, SingleUnitOrchestrator};
use crate::registry::{ConnectionMetadata, ConnectionRegistry};
use crate::streaming::StreamManager;
use crate::transport::{
    create_transport, ConnectionHandle, LocalRelay, LocalStreamBuffer, TransportError,
    TransportMode,
};

/// Errors returned before a job is started
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The connection is not (or no longer) in the registry
    #[error("no connection data found for connection {0}")]
    UnknownConnection(String),

    /// The transport for the requested mode could not be built
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Starts streaming jobs for registered connections
pub struct JobDispatcher {
    config: PushstreamConfig,
    registry: Arc<dyn ConnectionRegistry>,
    local_buffer: LocalStreamBuffer,
    item_handler: Arc<dyn ItemHandler>,
    post_processor: Arc<dyn PostProcessHandler>,
}

impl JobDispatcher {
    pub fn new(
        config: PushstreamConfig,
        registry: Arc<dyn ConnectionRegistry>,
        item_handler: Arc<dyn ItemHandler>,
        post_processor: Arc<dyn PostProcessHandler>,
    ) -> Self {
        Self {
            config,
            registry,
            local_buffer: LocalStreamBuffer::new(),
            item_handler,
            post_processor,
        }
    }

    /// Share an existing local buffer (e.g. one owned by a dev server)
    #[must_use]
    pub fn with_local_buffer(mut self, buffer: LocalStreamBuffer) -> Self {
        self.local_buffer = buffer;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PushstreamConfig {
        &self.config
    }

    #[must_use]
    pub fn local_buffer(&self) -> &LocalStreamBuffer {
        &self.local_buffer
    }

    /// Relay for draining local-mode jobs
    #[must_use]
    pub fn local_relay(&self) -> LocalRelay {
        LocalRelay::new(self.local_buffer.clone())
    }

    /// Start a multi-item job
    ///
    /// # Errors
    ///
    /// Fails without spawning anything if the connection is unknown or the
    /// transport cannot be built.
    pub async fn dispatch_items(
        &self,
        request: ItemsJobRequest,
        mode: TransportMode,
    ) -> Result<JoinHandle<Vec<Outcome>>, DispatchError> {
        let metadata = self.resolve(&request.connection_id).await?;
        let stream = self.stream_for(&request.connection_id, mode)?;
        let user_team_id = request.user_team_id.or(metadata.user_team_id);

        tracing::info!(
            connection_id = %request.connection_id,
            review_id = request.review_id,
            user_team_id = ?user_team_id,
            items = request.items.len(),
            mode = %mode,
            "Dispatching item job"
        );

        let items = request.into_items(user_team_id);
        let orchestrator = MultiItemOrchestrator::new(stream, Arc::clone(&self.item_handler));
        Ok(tokio::spawn(orchestrator.run_as_task(items)))
    }

    /// Start a post-processing job
    ///
    /// A missing `user_team_id` is filled from the connection metadata.
    ///
    /// # Errors
    ///
    /// Fails without spawning anything if the connection is unknown or the
    /// transport cannot be built.
    pub async fn dispatch_post_process(
        &self,
        connection_id: &str,
        mode: TransportMode,
        mut request: PostProcessRequest,
    ) -> Result<JoinHandle<Result<Value, PostProcessError>>, DispatchError> {
        let metadata = self.resolve(connection_id).await?;
        if request.user_team_id.is_none() {
            request.user_team_id = metadata.user_team_id;
        }
        let stream = self.stream_for(connection_id, mode)?;

        tracing::info!(
            connection_id = %connection_id,
            review_id = ?request.review_id,
            mode = %mode,
            "Dispatching post-processing job"
        );

        let orchestrator =
            SingleUnitOrchestrator::new(stream, Arc::clone(&self.post_processor));
        Ok(tokio::spawn(orchestrator.run_as_task(request)))
    }

    async fn resolve(&self, connection_id: &str) -> Result<ConnectionMetadata, DispatchError> {
        self.registry.get(connection_id).await.ok_or_else(|| {
            tracing::warn!(connection_id = %connection_id, "No connection data found");
            DispatchError::UnknownConnection(connection_id.to_string())
        })
    }

    fn stream_for(
        &self,
        connection_id: &str,
        mode: TransportMode,
    ) -> Result<StreamManager, DispatchError> {
        let transport = create_transport(mode, &self.config.gateway, &self.local_buffer)?;
        Ok(StreamManager::with_config(
            ConnectionHandle::new(connection_id, mode),
            transport,
            self.config.stream_config(),
        ))
    }
}
