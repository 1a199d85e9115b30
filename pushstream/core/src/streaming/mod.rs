//! Streaming Infrastructure for Long-Running Jobs
//!
//! This module provides the per-connection outbound stream used by both
//! orchestrators.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       StreamManager                               │
//! │                                                                   │
//! │   item units ──┐                                                  │
//! │                ├──► push() ──► stamp ──► PushTransport ──► peer   │
//! │   heartbeat ───┘        │                     │                   │
//! │       ▲                 │                PeerGone?                │
//! │       │                 ▼                     │                   │
//! │  ProgressGuard     terminal marker       mark_dead()              │
//! │  (cancel + join)   (exactly once)        (no more pushes)         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! `Init → TransportReady → Streaming → Draining → Closed`
//!
//! The terminal marker moves the stream to `Draining`; [`StreamManager::cleanup`]
//! moves it to `Closed` exactly once.

mod heartbeat;
mod stream_manager;

pub use heartbeat::{run_heartbeat, HeartbeatExit, HeartbeatReport, ProgressGuard};
pub use stream_manager::{
    JobPhase, StreamManager, StreamManagerConfig, DEFAULT_HEARTBEAT_INTERVAL,
};
