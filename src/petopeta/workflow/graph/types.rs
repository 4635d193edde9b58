// SPDX-License-Identifier: MIT

//! Graph workflow type definitions
//!
//! This module defines the core types shared by the compiler, the executor
//! and node handlers.

use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use crate::adk::error::PetopetaError;
use crate::petopeta::workflow::config::RunConfig;
use crate::petopeta::workflow::state::GraphState;

/// Pseudo-node every graph starts from
pub const START: &str = "__start__";
/// Pseudo-node marking the end of a path
pub const END: &str = "__end__";

/// What a handler gets besides the state snapshot
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// Id of the node being executed
    pub node: String,
    /// Index of the current wave, starting at 0
    pub wave: usize,
    /// Invocation configuration
    pub config: RunConfig,
}

/// Routing override carried by a [`Command`]
#[derive(Debug)]
pub enum Goto<S: GraphState> {
    /// Continue at these nodes instead of the static successors
    Nodes(Vec<String>),
    /// Run `target` once per item, each against its own state, in the next wave
    FanOut { target: String, items: Vec<S> },
}

/// A partial update together with an explicit routing decision
pub struct Command<S: GraphState> {
    pub update: S::Update,
    pub goto: Goto<S>,
}

impl<S: GraphState> Command<S> {
    /// Route to a single node
    pub fn goto(update: S::Update, target: impl Into<String>) -> Self {
        Self {
            update,
            goto: Goto::Nodes(vec![target.into()]),
        }
    }

    /// Route to several nodes at once
    pub fn goto_many(update: S::Update, targets: Vec<String>) -> Self {
        Self {
            update,
            goto: Goto::Nodes(targets),
        }
    }

    /// Fan out over `items`
    pub fn fan_out(update: S::Update, target: impl Into<String>, items: Vec<S>) -> Self {
        Self {
            update,
            goto: Goto::FanOut {
                target: target.into(),
                items,
            },
        }
    }
}

/// Result of a node handler
pub enum NodeOutput<S: GraphState> {
    /// Partial update; routing follows the static edges
    Update(S::Update),
    /// Partial update plus a routing override
    Command(Command<S>),
}

impl<S: GraphState> NodeOutput<S> {
    /// Output that changes nothing
    pub fn empty() -> Self {
        NodeOutput::Update(S::Update::default())
    }
}

impl<S: GraphState> From<Command<S>> for NodeOutput<S> {
    fn from(command: Command<S>) -> Self {
        NodeOutput::Command(command)
    }
}

/// A node's behavior: a function of an immutable state snapshot
#[async_trait]
pub trait NodeHandler<S: GraphState>: Send + Sync {
    async fn call(&self, state: Arc<S>, ctx: NodeContext) -> Result<NodeOutput<S>, PetopetaError>;
}

/// Adapter turning an async closure into a [`NodeHandler`]
pub struct FnHandler<F>(F);

/// Wrap an async closure as a node handler
pub fn node_fn<S, F, Fut>(f: F) -> FnHandler<F>
where
    S: GraphState,
    F: Fn(Arc<S>, NodeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<NodeOutput<S>, PetopetaError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<S, F, Fut> NodeHandler<S> for FnHandler<F>
where
    S: GraphState,
    F: Fn(Arc<S>, NodeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<NodeOutput<S>, PetopetaError>> + Send + 'static,
{
    async fn call(&self, state: Arc<S>, ctx: NodeContext) -> Result<NodeOutput<S>, PetopetaError> {
        (self.0)(state, ctx).await
    }
}

/// Execution events, emitted when a sink is attached to the `RunConfig`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GraphEvent {
    WaveStarted {
        graph: String,
        wave: usize,
        nodes: Vec<String>,
    },
    NodeFinished {
        graph: String,
        wave: usize,
        node: String,
        elapsed_ms: u64,
    },
    NodeFailed {
        graph: String,
        wave: usize,
        node: String,
        error: String,
    },
    Finished {
        graph: String,
        waves: usize,
    },
}
