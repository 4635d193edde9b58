// SPDX-License-Identifier: MIT

//! Typed error handling for petopeta-rs
//!
//! Three layers:
//! - [`GraphError`] - structural and runtime failures of the workflow engine
//! - [`ModelError`] - failures of the language model collaborator
//! - [`PetopetaError`] - everything a node handler can fail with

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for petopeta-rs
#[derive(Debug, Error)]
pub enum PetopetaError {
    /// Workflow engine errors (including failures of nested sub-workflows)
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Language model errors
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Key-value store errors
    #[error("Store error: {0}")]
    Store(String),

    /// Retriever / search errors
    #[error("Retrieval error from {provider}: {message}")]
    Retrieval { provider: String, message: String },

    /// A node ran longer than its configured timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Workflow engine errors
#[derive(Debug, Error)]
pub enum GraphError {
    /// Structural defect found while compiling a graph
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// The wave loop ran past its configured limit
    #[error("Loop limit of {limit} waves exceeded")]
    LoopLimitExceeded { limit: usize },

    /// A node handler failed; the whole invocation is aborted
    #[error("Node '{node}' failed in wave {wave}: {source}")]
    NodeExecution {
        node: String,
        wave: usize,
        #[source]
        source: Box<PetopetaError>,
    },

    /// A node routed to a target outside its declared allowlist
    #[error("Node '{node}' routed to undeclared target '{target}'")]
    UndeclaredRoute { node: String, target: String },

    /// The invocation was cancelled by the caller
    #[error("Invocation cancelled")]
    Cancelled,
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// Transport, authentication or upstream API failure
    #[error("Provider error from {provider}: {message}")]
    Provider { provider: String, message: String },

    /// Structured output could not be parsed into the requested schema
    #[error("Structured output validation failed: {0}")]
    Validation(String),

    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),
}

impl PetopetaError {
    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a retrieval error
    pub fn retrieval(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Retrieval {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl GraphError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Id of the innermost failing node, following nested sub-workflow failures
    pub fn failing_node(&self) -> Option<&str> {
        match self {
            GraphError::NodeExecution { node, source, .. } => match source.as_ref() {
                PetopetaError::Graph(inner) => inner.failing_node().or(Some(node)),
                _ => Some(node),
            },
            _ => None,
        }
    }
}

impl ModelError {
    /// Create a provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

impl From<&str> for PetopetaError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for PetopetaError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_execution_message_carries_node_and_wave() {
        let err = GraphError::NodeExecution {
            node: "respond".to_string(),
            wave: 3,
            source: Box::new(PetopetaError::other("boom")),
        };
        assert_eq!(err.to_string(), "Node 'respond' failed in wave 3: boom");
    }

    #[test]
    fn test_failing_node_follows_nested_failures() {
        let inner = GraphError::NodeExecution {
            node: "retrieve_documents".to_string(),
            wave: 1,
            source: Box::new(ModelError::provider("brave", "401").into()),
        };
        let outer = GraphError::NodeExecution {
            node: "conduct_research".to_string(),
            wave: 4,
            source: Box::new(PetopetaError::Graph(inner)),
        };
        assert_eq!(outer.failing_node(), Some("retrieve_documents"));
        assert_eq!(GraphError::Cancelled.failing_node(), None);
    }

    #[test]
    fn test_model_error_converts() {
        let err: PetopetaError = ModelError::Validation("missing field".into()).into();
        assert!(matches!(err, PetopetaError::Model(ModelError::Validation(_))));
    }
}
