//! Pushstream Core - Push Delivery for Long-Running Jobs
//!
//! This crate streams the progress and results of long-running, multi-item
//! jobs to a remote client that is not part of the request that started the
//! job. It owns envelope delivery, dead-peer detection, the heartbeat, the
//! concurrent fan-out of work items and the exactly-once terminal marker.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Trigger (HTTP / queue)                       │
//! └────────────────────────────┬─────────────────────────────────────┘
//!                              │ dispatch_items / dispatch_post_process
//! ┌────────────────────────────▼─────────────────────────────────────┐
//! │                        JobDispatcher                             │
//! │   ConnectionRegistry ── resolve ──┐      tokio::spawn(job)       │
//! └───────────────────────────────────┼──────────────┬───────────────┘
//!                                     │              │
//! ┌───────────────────────────────────▼──────────────▼───────────────┐
//! │  MultiItemOrchestrator            SingleUnitOrchestrator         │
//! │  (N items, join_all)              (one post-process unit)        │
//! │            │                                │                    │
//! │            └────────────┬───────────────────┘                    │
//! │                  StreamManager  ◄── heartbeat (ProgressGuard)    │
//! │                         │                                        │
//! │                  PushTransport                                   │
//! │          ┌──────────────┴───────────────┐                        │
//! │   GatewayAdapter                 LocalBufferAdapter ──► LocalRelay│
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`StreamManager`]: one connection's outbound stream for one job
//! - [`Envelope`]: one wire message
//! - [`WorkItem`] / [`Outcome`]: input and output of one unit of per-item work
//! - [`MultiItemOrchestrator`] / [`SingleUnitOrchestrator`]: job drivers
//! - [`PushTransport`]: gateway or local delivery
//! - [`JobDispatcher`]: fire-and-forget job entry point
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pushstream_core::{
//!     load_config, InMemoryConnectionRegistry, ConnectionMetadata, ItemsJobRequest,
//!     JobDispatcher, TransportMode, WorkItem,
//! };
//!
//! let config = load_config()?;
//! let registry = InMemoryConnectionRegistry::new(config.connection_ttl);
//! registry.register(ConnectionMetadata::new("conn-1").with_user_team_id(7));
//!
//! let dispatcher = JobDispatcher::new(config, Arc::new(registry), item_handler, post_handler);
//! dispatcher
//!     .dispatch_items(
//!         ItemsJobRequest {
//!             connection_id: "conn-1".into(),
//!             review_id: 42,
//!             user_team_id: None,
//!             items: vec![WorkItem::query(1, 42), WorkItem::query(2, 42)],
//!         },
//!         TransportMode::Gateway,
//!     )
//!     .await?;
//! ```

pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod handler;
pub mod items;
pub mod orchestrator;
pub mod registry;
pub mod streaming;
pub mod transport;

// Re-exports for convenience
pub use config::{
    load_config, load_config_from_path, ConfigError, ConfigOverrides, ConfigSource,
    PushstreamConfig,
};
pub use dispatch::{DispatchError, JobDispatcher};
pub use envelope::{Envelope, MessageType};
pub use handler::{ItemHandler, PostProcessHandler};
pub use items::{
    ItemsJobRequest, Outcome, OutcomeStatus, OutcomeTelemetry, PostProcessRequest, RequestKind,
    ToolUseResponse, WorkItem,
};
pub use orchestrator::{MultiItemOrchestrator, PostProcessError, SingleUnitOrchestrator};
pub use registry::{ConnectionMetadata, ConnectionRegistry, InMemoryConnectionRegistry};
pub use streaming::{JobPhase, ProgressGuard, StreamManager, StreamManagerConfig};
pub use transport::{
    create_transport, ConnectionHandle, GatewayAdapter, GatewayConfig, LocalBufferAdapter,
    LocalRelay, LocalStreamBuffer, PushTransport, RelayError, TransportError, TransportMode,
};
