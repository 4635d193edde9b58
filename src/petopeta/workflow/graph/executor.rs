// SPDX-License-Identifier: MIT

//! Graph workflow executor
//!
//! Execution proceeds in waves. Every ready task of a wave runs concurrently
//! against a snapshot frozen at wave start, so handlers never observe writes
//! of their siblings. Once the whole wave has finished, updates are merged in
//! ready-set order and the next ready set is derived from Commands, static
//! edges and conditional routers.

use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

use super::builder::{CompiledGraph, CompiledNode};
use super::fanout::FanOutCoordinator;
use super::types::{GraphEvent, Goto, NodeContext, NodeOutput, END};
use crate::adk::error::{GraphError, PetopetaError};
use crate::petopeta::workflow::config::RunConfig;
use crate::petopeta::workflow::state::GraphState;

/// A node scheduled for the next wave
pub(crate) struct ReadyTask<S> {
    pub node: String,
    /// Private state for fan-out children; `None` means the wave snapshot
    pub state: Option<Arc<S>>,
}

/// Ordered ready set. Tasks on the shared snapshot are de-duplicated by node
/// id, which is what joins parallel branches; fan-out children never are.
pub(crate) struct ReadySet<S> {
    tasks: Vec<ReadyTask<S>>,
    shared: HashSet<String>,
}

impl<S> ReadySet<S> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            shared: HashSet::new(),
        }
    }

    pub fn push_shared(&mut self, node: String) {
        if node == END || !self.shared.insert(node.clone()) {
            return;
        }
        self.tasks.push(ReadyTask { node, state: None });
    }

    pub fn push_private(&mut self, node: String, state: Arc<S>) {
        self.tasks.push(ReadyTask {
            node,
            state: Some(state),
        });
    }

    pub fn into_tasks(self) -> Vec<ReadyTask<S>> {
        self.tasks
    }
}

type TaskResult<S> = (usize, String, u64, Result<NodeOutput<S>, PetopetaError>);

impl<S: GraphState> CompiledGraph<S> {
    /// Run the graph to completion.
    ///
    /// Returns the final state, or the single error that aborted the run.
    pub async fn invoke(&self, input: impl Into<S>, config: &RunConfig) -> Result<S, GraphError> {
        let plan = &self.plan;
        let mut state: S = input.into();

        let mut initial = ReadySet::new();
        for node in &plan.entry {
            initial.push_shared(node.clone());
        }
        let mut ready = initial.into_tasks();
        let mut wave = 0;

        log::info!("Invoking graph '{}' (run {})", plan.name, config.run_id);

        while !ready.is_empty() {
            if wave >= config.max_waves {
                log::error!(
                    "Graph '{}' exceeded the limit of {} waves",
                    plan.name,
                    config.max_waves
                );
                return Err(GraphError::LoopLimitExceeded {
                    limit: config.max_waves,
                });
            }
            if config.cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }

            let node_ids: Vec<String> = ready.iter().map(|t| t.node.clone()).collect();
            log::info!(
                "Graph '{}' wave {}: executing {} nodes: {:?}",
                plan.name,
                wave,
                node_ids.len(),
                node_ids
            );
            config
                .emit(GraphEvent::WaveStarted {
                    graph: plan.name.clone(),
                    wave,
                    nodes: node_ids,
                })
                .await;

            let snapshot = Arc::new(state.clone());
            let outputs = self.run_wave(&ready, &snapshot, wave, config).await?;
            drop(snapshot);

            let before = self.append_lengths(&state);
            let mut routes = Vec::with_capacity(outputs.len());
            for output in outputs {
                match output {
                    NodeOutput::Update(update) => {
                        state.apply(update);
                        routes.push(None);
                    }
                    NodeOutput::Command(command) => {
                        state.apply(command.update);
                        routes.push(Some(command.goto));
                    }
                }
            }
            self.check_append_only(&state, &before, wave)?;

            let mut next = ReadySet::new();
            for (task, route) in ready.iter().zip(routes) {
                match route {
                    None => self.follow_edges(&task.node, &state, &mut next)?,
                    Some(Goto::Nodes(targets)) => {
                        log::debug!("Node '{}' routed to {:?}", task.node, targets);
                        for target in targets {
                            self.check_route(&task.node, &target)?;
                            next.push_shared(target);
                        }
                    }
                    Some(Goto::FanOut { target, items }) => {
                        self.check_route(&task.node, &target)?;
                        if !FanOutCoordinator::expand(&target, items, &mut next) {
                            // nothing to fan out to: continue past the target
                            self.follow_edges(&target, &state, &mut next)?;
                        }
                    }
                }
            }

            ready = next.into_tasks();
            wave += 1;
        }

        log::info!("Graph '{}' finished after {} waves", plan.name, wave);
        config
            .emit(GraphEvent::Finished {
                graph: plan.name.clone(),
                waves: wave,
            })
            .await;

        Ok(state)
    }

    /// Run every task of a wave concurrently and collect outputs in ready order
    async fn run_wave(
        &self,
        ready: &[ReadyTask<S>],
        snapshot: &Arc<S>,
        wave: usize,
        config: &RunConfig,
    ) -> Result<Vec<NodeOutput<S>>, GraphError> {
        let mut join_set: JoinSet<TaskResult<S>> = JoinSet::new();

        for (index, task) in ready.iter().enumerate() {
            let node = self.node(&task.node)?;
            let handler = node.handler.clone();
            let timeout = node.timeout.or(config.node_timeout);
            let state = task.state.clone().unwrap_or_else(|| snapshot.clone());
            let ctx = NodeContext {
                node: task.node.clone(),
                wave,
                config: config.clone(),
            };
            let node_id = task.node.clone();

            join_set.spawn(async move {
                let started = Instant::now();
                let call = AssertUnwindSafe(handler.call(state, ctx)).catch_unwind();
                let result = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, call).await {
                        Ok(result) => result,
                        Err(_) => Ok(Err(PetopetaError::Timeout(limit))),
                    },
                    None => call.await,
                };
                let result = result
                    .unwrap_or_else(|_| Err(PetopetaError::other("node handler panicked")));
                (index, node_id, started.elapsed().as_millis() as u64, result)
            });
        }

        let mut outputs: Vec<Option<NodeOutput<S>>> = ready.iter().map(|_| None).collect();
        loop {
            let joined = tokio::select! {
                biased;
                _ = config.cancel.cancelled() => {
                    log::warn!("Graph '{}' cancelled in wave {}", self.plan.name, wave);
                    join_set.abort_all();
                    return Err(GraphError::Cancelled);
                }
                joined = join_set.join_next() => joined,
            };
            let Some(joined) = joined else { break };

            let (index, node, elapsed_ms, result) = joined.map_err(|e| {
                if e.is_cancelled() {
                    GraphError::Cancelled
                } else {
                    GraphError::NodeExecution {
                        node: "<unknown>".to_string(),
                        wave,
                        source: Box::new(PetopetaError::other(e.to_string())),
                    }
                }
            })?;

            match result {
                Ok(output) => {
                    log::info!("Node {} completed in {}ms", node, elapsed_ms);
                    config
                        .emit(GraphEvent::NodeFinished {
                            graph: self.plan.name.clone(),
                            wave,
                            node,
                            elapsed_ms,
                        })
                        .await;
                    outputs[index] = Some(output);
                }
                Err(e) => {
                    log::error!("Node {} failed: {}", node, e);
                    join_set.abort_all();
                    config
                        .emit(GraphEvent::NodeFailed {
                            graph: self.plan.name.clone(),
                            wave,
                            node: node.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    return Err(GraphError::NodeExecution {
                        node,
                        wave,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(outputs.into_iter().flatten().collect())
    }

    fn node(&self, id: &str) -> Result<&CompiledNode<S>, GraphError> {
        self.plan
            .nodes
            .get(id)
            .ok_or_else(|| GraphError::validation(format!("node '{}' is not in the graph", id)))
    }

    /// Lengths of the append-only fields the state reports
    fn append_lengths(&self, state: &S) -> Vec<(&str, usize)> {
        self.plan
            .schema
            .append_fields()
            .filter_map(|field| state.field_len(field).map(|len| (field, len)))
            .collect()
    }

    /// Append-only fields must not shrink across a merge
    fn check_append_only(
        &self,
        state: &S,
        before: &[(&str, usize)],
        wave: usize,
    ) -> Result<(), GraphError> {
        for &(field, len) in before {
            let now = state.field_len(field).unwrap_or(0);
            if now < len {
                log::error!(
                    "Graph '{}' wave {}: append field '{}' shrank from {} to {}",
                    self.plan.name,
                    wave,
                    field,
                    len,
                    now
                );
                return Err(GraphError::validation(format!(
                    "append field '{}' shrank from {} to {} entries in wave {}",
                    field, len, now, wave
                )));
            }
        }
        Ok(())
    }

    /// Static successors plus the conditional router, evaluated on the merged state
    fn follow_edges(
        &self,
        node: &str,
        state: &S,
        next: &mut ReadySet<S>,
    ) -> Result<(), GraphError> {
        if let Some(targets) = self.plan.edges.get(node) {
            for target in targets {
                next.push_shared(target.clone());
            }
        }

        if let Some(edge) = self.plan.conditional.get(node) {
            let chosen = (edge.router)(state);
            log::debug!("Router of '{}' chose {:?}", node, chosen);
            for target in chosen {
                if !edge.targets.contains(&target) {
                    return Err(GraphError::UndeclaredRoute {
                        node: node.to_string(),
                        target,
                    });
                }
                next.push_shared(target);
            }
        }

        Ok(())
    }

    /// A Command may only route inside the node's declared allowlist
    fn check_route(&self, node: &str, target: &str) -> Result<(), GraphError> {
        let allowed = self
            .node(node)?
            .routes
            .as_ref()
            .is_some_and(|routes| routes.iter().any(|r| r == target));

        if allowed {
            Ok(())
        } else {
            Err(GraphError::UndeclaredRoute {
                node: node.to_string(),
                target: target.to_string(),
            })
        }
    }
}
