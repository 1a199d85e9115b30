//! Transport Configuration
//!
//! Configuration types for selecting and configuring push transports.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-request timeout for gateway pushes
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport mode selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Managed WebSocket gateway (production)
    #[default]
    Gateway,

    /// In-process per-connection buffer drained by a relay
    ///
    /// Used by local development servers and test harnesses.
    Local,
}

impl TransportMode {
    /// Map the trigger's "local" flag onto a mode
    #[must_use]
    pub fn from_local_flag(local: bool) -> Self {
        if local {
            Self::Local
        } else {
            Self::Gateway
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gateway => f.write_str("gateway"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// Gateway management API configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Base URL of the connection-management endpoint
    ///
    /// Messages are posted to `{endpoint}/@connections/{connection_id}`.
    pub endpoint: Option<String>,

    /// Optional bearer token sent with every push
    pub auth_token: Option<String>,

    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            auth_token: None,
            request_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }
}

impl GatewayConfig {
    /// Create configuration for a given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
