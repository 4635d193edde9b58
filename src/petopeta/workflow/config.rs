// SPDX-License-Identifier: MIT

//! Per-invocation run configuration
//!
//! A `RunConfig` is resolved once per invocation and handed to every node
//! handler through its `NodeContext`. Handlers only read it.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::graph::GraphEvent;

/// Default wave limit guarding against runaway cycles
pub const DEFAULT_MAX_WAVES: usize = 25;

/// Configuration of a single graph invocation
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Unique id of this invocation
    pub run_id: Uuid,
    /// Id of the invocation that started this one (sub-workflows)
    pub parent_run_id: Option<Uuid>,
    /// Free-form metadata, e.g. `user_id`
    pub metadata: HashMap<String, String>,
    /// Maximum number of waves before `LoopLimitExceeded`
    pub max_waves: usize,
    /// Timeout applied to nodes without their own
    pub node_timeout: Option<Duration>,
    /// Cancels the invocation and everything it started
    pub cancel: CancellationToken,
    /// Optional execution event sink
    pub events: Option<mpsc::Sender<GraphEvent>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            parent_run_id: None,
            metadata: HashMap::new(),
            max_waves: DEFAULT_MAX_WAVES,
            node_timeout: None,
            cancel: CancellationToken::new(),
            events: None,
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.metadata.insert("user_id".to_string(), user_id.into());
        self
    }

    pub fn with_max_waves(mut self, max_waves: usize) -> Self {
        self.max_waves = max_waves;
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<GraphEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// The `user_id` metadata entry
    pub fn user_id(&self) -> Option<&str> {
        self.metadata
            .get("user_id")
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Config for a nested invocation: same limits and metadata, a fresh run
    /// id and a child cancellation token
    pub fn child(&self) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            parent_run_id: Some(self.run_id),
            metadata: self.metadata.clone(),
            max_waves: self.max_waves,
            node_timeout: self.node_timeout,
            cancel: self.cancel.child_token(),
            events: self.events.clone(),
        }
    }

    /// Send an event if a sink is attached
    pub(crate) async fn emit(&self, event: GraphEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.max_waves, 25);
        assert!(config.node_timeout.is_none());
        assert!(config.user_id().is_none());
    }

    #[test]
    fn test_empty_user_id_is_none() {
        let config = RunConfig::new().with_user_id("");
        assert!(config.user_id().is_none());
    }

    #[test]
    fn test_child_inherits_limits_and_cancellation() {
        let parent = RunConfig::new()
            .with_user_id("u1")
            .with_max_waves(7)
            .with_node_timeout(Duration::from_secs(2));
        let child = parent.child();

        assert_eq!(child.user_id(), Some("u1"));
        assert_eq!(child.max_waves, 7);
        assert_eq!(child.node_timeout, Some(Duration::from_secs(2)));
        assert_eq!(child.parent_run_id, Some(parent.run_id));
        assert_ne!(child.run_id, parent.run_id);

        parent.cancel.cancel();
        assert!(child.cancel.is_cancelled());
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let parent = RunConfig::new();
        let child = parent.child();
        child.cancel.cancel();
        assert!(!parent.cancel.is_cancelled());
    }
}
