//! Business Handler Traits
//!
//! The orchestrators never know what an item or a post-processing run
//! actually does. They call into these traits and stream whatever comes back.
//! Implementations own the domain logic (review agents, persistence, etc.)
//! and are free to fail: every error is turned into a client-visible
//! envelope by the orchestrator that called them.

use async_trait::async_trait;
use serde_json::Value;

use crate::items::{PostProcessRequest, WorkItem};

/// Executes one work item
#[async_trait]
pub trait ItemHandler: Send + Sync {
    /// Run the item to completion and return its structured result
    ///
    /// The result is classified by [`crate::items::OutcomeStatus::classify`].
    async fn execute(&self, item: &WorkItem) -> anyhow::Result<Value>;

    /// Whether this item should run in the first wave of a multi-item job
    ///
    /// Items that warm a shared cache (e.g. a provider prompt cache) run
    /// before everything else when more than one item is submitted.
    fn warms_cache(&self, _item: &WorkItem) -> bool {
        false
    }
}

/// Executes a post-processing run
#[async_trait]
pub trait PostProcessHandler: Send + Sync {
    /// Run post-processing; `None` means success without a result body
    async fn execute_post_process(&self, request: &PostProcessRequest)
        -> anyhow::Result<Option<Value>>;
}
