// SPDX-License-Identifier: MIT

//! Graph builder and compiler
//!
//! [`StateGraph`] collects nodes and edges; [`StateGraph::compile`] validates
//! them into an immutable, cheaply cloneable [`CompiledGraph`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::types::{NodeHandler, END, START};
use crate::adk::error::GraphError;
use crate::petopeta::workflow::state::{GraphState, StateSchema};

/// Router evaluated on the merged state after its source node ran
pub type RouterFn<S> = Arc<dyn Fn(&S) -> Vec<String> + Send + Sync>;

/// Compiled node ready for execution
pub(crate) struct CompiledNode<S: GraphState> {
    pub id: String,
    pub handler: Arc<dyn NodeHandler<S>>,
    /// Targets a Command from this node may route to; `None` for plain nodes
    pub routes: Option<Vec<String>>,
    pub timeout: Option<Duration>,
}

/// Conditional edge: a router function plus the targets it may return
pub(crate) struct ConditionalEdge<S> {
    pub router: RouterFn<S>,
    pub targets: Vec<String>,
}

/// Graph definition under construction
pub struct StateGraph<S: GraphState> {
    name: String,
    nodes: Vec<CompiledNode<S>>,
    edges: Vec<(String, String)>,
    conditional: Vec<(String, ConditionalEdge<S>)>,
}

impl<S: GraphState> StateGraph<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            conditional: Vec::new(),
        }
    }

    /// Add a node whose successors come from static edges only
    pub fn add_node(
        mut self,
        id: impl Into<String>,
        handler: impl NodeHandler<S> + 'static,
    ) -> Self {
        self.nodes.push(CompiledNode {
            id: id.into(),
            handler: Arc::new(handler),
            routes: None,
            timeout: None,
        });
        self
    }

    /// Add a node that may return a Command routing to one of `routes`
    pub fn add_router_node(
        mut self,
        id: impl Into<String>,
        handler: impl NodeHandler<S> + 'static,
        routes: &[&str],
    ) -> Self {
        self.nodes.push(CompiledNode {
            id: id.into(),
            handler: Arc::new(handler),
            routes: Some(routes.iter().map(|r| r.to_string()).collect()),
            timeout: None,
        });
        self
    }

    /// Set a timeout for an already added node
    pub fn with_timeout(mut self, id: &str, timeout: Duration) -> Self {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
            node.timeout = Some(timeout);
        }
        self
    }

    /// Add a static edge
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Add a router function choosing the successors of `source` at runtime
    pub fn add_conditional_edges<F>(
        mut self,
        source: impl Into<String>,
        router: F,
        targets: &[&str],
    ) -> Self
    where
        F: Fn(&S) -> Vec<String> + Send + Sync + 'static,
    {
        self.conditional.push((
            source.into(),
            ConditionalEdge {
                router: Arc::new(router),
                targets: targets.iter().map(|t| t.to_string()).collect(),
            },
        ));
        self
    }

    /// Validate the definition and produce an executable graph
    pub fn compile(self) -> Result<CompiledGraph<S>, GraphError> {
        let schema = S::schema();
        schema.validate()?;

        let mut nodes: HashMap<String, CompiledNode<S>> = HashMap::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for node in self.nodes {
            if node.id.is_empty() || node.id == START || node.id == END {
                return Err(GraphError::validation(format!(
                    "'{}' is not a valid node id",
                    node.id
                )));
            }
            if nodes.contains_key(&node.id) {
                return Err(GraphError::validation(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            order.push(node.id.clone());
            nodes.insert(node.id.clone(), node);
        }

        let is_node = |id: &str| nodes.contains_key(id);
        let is_target = |id: &str| id == END || nodes.contains_key(id);

        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        for (from, to) in self.edges {
            if from != START && !is_node(&from) {
                return Err(GraphError::validation(format!(
                    "edge source '{}' is not a node",
                    from
                )));
            }
            if !is_target(&to) {
                return Err(GraphError::validation(format!(
                    "edge '{}' -> '{}' targets an unknown node",
                    from, to
                )));
            }
            let targets = edges.entry(from).or_default();
            if !targets.contains(&to) {
                targets.push(to);
            }
        }

        for node in nodes.values() {
            if let Some(routes) = &node.routes {
                if routes.is_empty() {
                    return Err(GraphError::validation(format!(
                        "router node '{}' declares no allowlist",
                        node.id
                    )));
                }
                if let Some(bad) = routes.iter().find(|r| !is_target(r)) {
                    return Err(GraphError::validation(format!(
                        "router node '{}' allows unknown target '{}'",
                        node.id, bad
                    )));
                }
            }
        }

        let mut conditional = HashMap::new();
        for (source, edge) in self.conditional {
            if !is_node(&source) {
                return Err(GraphError::validation(format!(
                    "conditional edge source '{}' is not a node",
                    source
                )));
            }
            if edge.targets.is_empty() {
                return Err(GraphError::validation(format!(
                    "conditional edge from '{}' declares no allowlist",
                    source
                )));
            }
            if let Some(bad) = edge.targets.iter().find(|t| !is_target(t)) {
                return Err(GraphError::validation(format!(
                    "conditional edge from '{}' allows unknown target '{}'",
                    source, bad
                )));
            }
            if conditional.insert(source.clone(), edge).is_some() {
                return Err(GraphError::validation(format!(
                    "node '{}' has more than one conditional edge",
                    source
                )));
            }
        }

        let entry = edges.remove(START).unwrap_or_default();
        if entry.is_empty() {
            return Err(GraphError::validation(format!(
                "graph '{}' has no edge from START",
                self.name
            )));
        }

        log::debug!(
            "Compiled graph '{}' with {} nodes, entry {:?}",
            self.name,
            order.len(),
            entry
        );

        Ok(CompiledGraph {
            plan: Arc::new(GraphPlan {
                name: self.name,
                nodes,
                order,
                edges,
                conditional,
                entry,
                schema,
            }),
        })
    }
}

/// Validated graph structure
pub(crate) struct GraphPlan<S: GraphState> {
    pub name: String,
    pub nodes: HashMap<String, CompiledNode<S>>,
    /// Node ids in declaration order
    pub order: Vec<String>,
    pub edges: HashMap<String, Vec<String>>,
    pub conditional: HashMap<String, ConditionalEdge<S>>,
    pub entry: Vec<String>,
    pub schema: StateSchema,
}

/// Executable graph; clones share the same plan
pub struct CompiledGraph<S: GraphState> {
    pub(crate) plan: Arc<GraphPlan<S>>,
}

impl<S: GraphState> Clone for CompiledGraph<S> {
    fn clone(&self) -> Self {
        Self {
            plan: self.plan.clone(),
        }
    }
}

impl<S: GraphState> CompiledGraph<S> {
    pub fn name(&self) -> &str {
        &self.plan.name
    }

    /// Node ids in declaration order
    pub fn node_ids(&self) -> &[String] {
        &self.plan.order
    }

    /// Nodes run first
    pub fn entry(&self) -> &[String] {
        &self.plan.entry
    }

    /// Static successors of a node
    pub fn edges_from(&self, id: &str) -> &[String] {
        self.plan.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every target a node may reach dynamically (Command allowlist and
    /// conditional edge targets)
    pub fn dynamic_targets(&self, id: &str) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        if let Some(routes) = self.plan.nodes.get(id).and_then(|n| n.routes.as_ref()) {
            targets.extend(routes.iter().map(String::as_str));
        }
        if let Some(edge) = self.plan.conditional.get(id) {
            targets.extend(edge.targets.iter().map(String::as_str));
        }
        targets
    }

    pub fn schema(&self) -> &StateSchema {
        &self.plan.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::PetopetaError;
    use crate::petopeta::workflow::graph::types::{node_fn, NodeContext, NodeOutput};
    use crate::petopeta::workflow::state::{replace, FieldType, ReducerType};

    #[derive(Debug, Clone, Default)]
    struct Counter {
        value: i64,
    }

    impl GraphState for Counter {
        type Update = Option<i64>;

        fn schema() -> StateSchema {
            StateSchema::new().field("value", FieldType::Number, ReducerType::Replace)
        }

        fn apply(&mut self, update: Self::Update) {
            replace(&mut self.value, update);
        }
    }

    fn noop() -> impl NodeHandler<Counter> {
        node_fn(|_state: Arc<Counter>, _ctx: NodeContext| async {
            Ok::<_, PetopetaError>(NodeOutput::empty())
        })
    }

    fn validation_message(result: Result<CompiledGraph<Counter>, GraphError>) -> String {
        match result {
            Err(GraphError::Validation(msg)) => msg,
            Err(other) => panic!("Expected validation error, got {}", other),
            Ok(_) => panic!("Expected validation error"),
        }
    }

    #[test]
    fn test_compile_linear_graph() {
        let graph = StateGraph::new("linear")
            .add_node("a", noop())
            .add_node("b", noop())
            .add_edge(START, "a")
            .add_edge("a", "b")
            .add_edge("b", END)
            .compile()
            .unwrap();

        assert_eq!(graph.name(), "linear");
        assert_eq!(graph.node_ids(), &["a".to_string(), "b".to_string()]);
        assert_eq!(graph.entry(), &["a".to_string()]);
        assert_eq!(graph.edges_from("a"), &["b".to_string()]);
        assert!(graph.edges_from("missing").is_empty());
    }

    #[test]
    fn test_duplicate_node_id() {
        let result = StateGraph::new("dup")
            .add_node("a", noop())
            .add_node("a", noop())
            .add_edge(START, "a")
            .compile();
        assert!(validation_message(result).contains("duplicate"));
    }

    #[test]
    fn test_edge_to_unknown_node() {
        let result = StateGraph::new("bad")
            .add_node("a", noop())
            .add_edge(START, "a")
            .add_edge("a", "ghost")
            .compile();
        assert!(validation_message(result).contains("ghost"));
    }

    #[test]
    fn test_edge_from_unknown_node() {
        let result = StateGraph::new("bad")
            .add_node("a", noop())
            .add_edge(START, "a")
            .add_edge("ghost", "a")
            .compile();
        assert!(validation_message(result).contains("ghost"));
    }

    #[test]
    fn test_router_without_allowlist() {
        let result = StateGraph::new("router")
            .add_router_node("route", noop(), &[])
            .add_edge(START, "route")
            .compile();
        assert!(validation_message(result).contains("no allowlist"));
    }

    #[test]
    fn test_router_allowlist_unknown_target() {
        let result = StateGraph::new("router")
            .add_router_node("route", noop(), &["a", "nowhere"])
            .add_node("a", noop())
            .add_edge(START, "route")
            .compile();
        assert!(validation_message(result).contains("nowhere"));
    }

    #[test]
    fn test_conditional_edge_without_allowlist() {
        let result = StateGraph::new("cond")
            .add_node("a", noop())
            .add_edge(START, "a")
            .add_conditional_edges("a", |_: &Counter| vec![END.to_string()], &[])
            .compile();
        assert!(validation_message(result).contains("no allowlist"));
    }

    #[test]
    fn test_reserved_node_id() {
        let result = StateGraph::new("reserved")
            .add_node(END, noop())
            .add_edge(START, END)
            .compile();
        assert!(validation_message(result).contains("not a valid node id"));
    }

    #[test]
    fn test_missing_entry() {
        let result = StateGraph::new("no-entry").add_node("a", noop()).compile();
        assert!(validation_message(result).contains("START"));
    }

    #[test]
    fn test_every_referenced_id_exists() {
        let graph = StateGraph::new("mixed")
            .add_router_node("route", noop(), &["a", "b", END])
            .add_node("a", noop())
            .add_node("b", noop())
            .add_edge(START, "route")
            .add_edge("a", "b")
            .add_conditional_edges("b", |_: &Counter| vec![END.to_string()], &["a", END])
            .compile()
            .unwrap();

        let ids: HashSet<&str> = graph.node_ids().iter().map(String::as_str).collect();
        for id in graph.node_ids() {
            for target in graph
                .edges_from(id)
                .iter()
                .map(String::as_str)
                .chain(graph.dynamic_targets(id))
            {
                assert!(target == END || ids.contains(target), "{} is unknown", target);
            }
        }
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let graph = StateGraph::new("dup-edge")
            .add_node("a", noop())
            .add_edge(START, "a")
            .add_edge("a", END)
            .add_edge("a", END)
            .compile()
            .unwrap();
        assert_eq!(graph.edges_from("a").len(), 1);
    }
}
