//! Transport Layer for Envelope Delivery
//!
//! Provides abstraction over the two delivery mechanisms:
//! - `Gateway`: managed WebSocket gateway via its connection-management API
//! - `Local`: in-process per-connection buffer drained by a relay
//!
//! # Design Philosophy
//!
//! The transport is chosen once per job by [`create_transport`]. Everything
//! above this layer talks to a `Box<dyn PushTransport>` and reacts only to
//! the error classification (`PeerGone` vs. everything else).

pub mod config;
pub mod factory;
pub mod gateway;
pub mod local;
pub mod relay;
pub mod traits;

// Re-exports for convenience
pub use config::{GatewayConfig, TransportMode, DEFAULT_GATEWAY_TIMEOUT};
pub use factory::create_transport;
pub use gateway::GatewayAdapter;
pub use local::{LocalBufferAdapter, LocalStreamBuffer};
pub use relay::{LocalRelay, RelayError};
pub use traits::{ConnectionHandle, PushTransport, TransportError};
