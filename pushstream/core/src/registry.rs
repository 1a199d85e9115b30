//! Connection Registry
//!
//! Maps an opaque connection id to the session, auth and client metadata
//! captured when the client connected. Jobs resolve their connection here
//! before a stream manager is built.
//!
//! # Architecture
//!
//! ```text
//!   connect handler ──register()──►  ConnectionRegistry  ◄──get()── JobDispatcher
//!                                 ┌──────────────────────────┐
//!                                 │ connection_id → metadata │
//!                                 │   (expires after TTL)    │
//!                                 └──────────────────────────┘
//! ```
//!
//! Entries have a bounded lifetime. An expired entry is treated exactly like
//! a missing one and is purged the next time it is looked up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Default lifetime of a registry entry
pub const DEFAULT_CONNECTION_TTL: Duration = Duration::from_secs(3600);

/// Metadata recorded for a connected client
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    pub connection_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_team_id: Option<i64>,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub client_version: Option<String>,
}

impl ConnectionMetadata {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_user_team_id(mut self, user_team_id: i64) -> Self {
        self.user_team_id = Some(user_team_id);
        self
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: impl Into<String>, version: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self.client_version = Some(version.into());
        self
    }
}

/// Lookup of connection metadata
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Metadata for a live connection, `None` if unknown or expired
    async fn get(&self, connection_id: &str) -> Option<ConnectionMetadata>;
}

#[derive(Debug)]
struct Entry {
    metadata: ConnectionMetadata,
    expires_at: Instant,
}

/// In-process registry with per-entry expiry
///
/// Cloning is cheap and clones share entries.
#[derive(Clone, Debug)]
pub struct InMemoryConnectionRegistry {
    entries: Arc<DashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for InMemoryConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTION_TTL)
    }
}

impl InMemoryConnectionRegistry {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store (or refresh) a connection's metadata
    pub fn register(&self, metadata: ConnectionMetadata) {
        let connection_id = metadata.connection_id.clone();
        self.entries.insert(
            connection_id.clone(),
            Entry {
                metadata,
                expires_at: Instant::now() + self.ttl,
            },
        );
        tracing::info!(connection_id = %connection_id, "Connection registered");
    }

    /// Forget a connection
    pub fn remove(&self, connection_id: &str) -> Option<ConnectionMetadata> {
        let removed = self.entries.remove(connection_id).map(|(_, e)| e.metadata);
        if removed.is_some() {
            tracing::info!(connection_id = %connection_id, "Connection removed");
        }
        removed
    }

    /// Drop every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            tracing::debug!(purged, "Purged expired connections");
        }
        purged
    }

    /// Number of stored entries, expired ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, connection_id: &str) -> Option<ConnectionMetadata> {
        let now = Instant::now();
        let live = self
            .entries
            .get(connection_id)
            .map(|entry| (entry.expires_at > now).then(|| entry.metadata.clone()))?;
        if live.is_none() {
            self.entries
                .remove_if(connection_id, |_, entry| entry.expires_at <= now);
            tracing::debug!(connection_id = %connection_id, "Connection expired");
        }
        live
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryConnectionRegistry {
    async fn get(&self, connection_id: &str) -> Option<ConnectionMetadata> {
        self.lookup(connection_id)
    }
}
