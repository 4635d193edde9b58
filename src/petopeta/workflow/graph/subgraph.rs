// SPDX-License-Identifier: MIT

//! Compiled graphs used as nodes of another graph

use async_trait::async_trait;
use std::sync::Arc;

use super::builder::CompiledGraph;
use super::types::{NodeContext, NodeHandler, NodeOutput};
use crate::adk::error::PetopetaError;
use crate::petopeta::workflow::state::GraphState;

type InputFn<P, C> = Arc<dyn Fn(&P) -> C + Send + Sync>;
type OutputFn<P, C> = Arc<dyn Fn(C) -> <P as GraphState>::Update + Send + Sync>;

/// Runs a child graph on a projection of the parent state and maps the
/// child's final state back to a parent update.
///
/// The child is invoked with a child [`RunConfig`](crate::petopeta::workflow::config::RunConfig):
/// cancelling the parent cancels the child, and a child failure surfaces as
/// a failure of the node hosting it.
pub struct SubgraphNode<P: GraphState, C: GraphState> {
    graph: CompiledGraph<C>,
    input: InputFn<P, C>,
    output: OutputFn<P, C>,
}

impl<P: GraphState, C: GraphState> SubgraphNode<P, C> {
    pub fn new<I, O>(graph: CompiledGraph<C>, input: I, output: O) -> Self
    where
        I: Fn(&P) -> C + Send + Sync + 'static,
        O: Fn(C) -> P::Update + Send + Sync + 'static,
    {
        Self {
            graph,
            input: Arc::new(input),
            output: Arc::new(output),
        }
    }

    pub fn graph(&self) -> &CompiledGraph<C> {
        &self.graph
    }

    /// Invoke the child graph for `parent` and return the projected update
    pub async fn run(&self, parent: &P, ctx: &NodeContext) -> Result<P::Update, PetopetaError> {
        let child_input = (self.input)(parent);
        let child_config = ctx.config.child();
        log::debug!(
            "Node '{}' invoking subgraph '{}' (run {})",
            ctx.node,
            self.graph.name(),
            child_config.run_id
        );
        let child_state = self.graph.invoke(child_input, &child_config).await?;
        Ok((self.output)(child_state))
    }
}

impl<P: GraphState, C: GraphState> Clone for SubgraphNode<P, C> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
        }
    }
}

#[async_trait]
impl<P: GraphState, C: GraphState> NodeHandler<P> for SubgraphNode<P, C> {
    async fn call(&self, state: Arc<P>, ctx: NodeContext) -> Result<NodeOutput<P>, PetopetaError> {
        let update = self.run(&state, &ctx).await?;
        Ok(NodeOutput::Update(update))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::GraphError;
    use crate::petopeta::workflow::config::RunConfig;
    use crate::petopeta::workflow::graph::builder::StateGraph;
    use crate::petopeta::workflow::graph::types::{node_fn, Command, END, START};
    use crate::petopeta::workflow::state::{append, replace, FieldType, ReducerType, StateSchema};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Debug, Clone, Default)]
    struct Parent {
        question: String,
        notes: Vec<String>,
    }

    impl GraphState for Parent {
        type Update = Vec<String>;

        fn schema() -> StateSchema {
            StateSchema::new()
                .field("question", FieldType::String, ReducerType::Input)
                .field("notes", FieldType::Array, ReducerType::Append)
        }

        fn apply(&mut self, update: Vec<String>) {
            append(&mut self.notes, update);
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Child {
        topic: String,
        answer: String,
    }

    impl GraphState for Child {
        type Update = Option<String>;

        fn schema() -> StateSchema {
            StateSchema::new()
                .field("topic", FieldType::String, ReducerType::Input)
                .field("answer", FieldType::String, ReducerType::Replace)
        }

        fn apply(&mut self, update: Option<String>) {
            replace(&mut self.answer, update);
        }
    }

    fn child_graph(fail: bool) -> CompiledGraph<Child> {
        let answer = node_fn(move |state: Arc<Child>, _ctx: NodeContext| async move {
            if fail {
                return Err(PetopetaError::other("no answer"));
            }
            Ok(NodeOutput::<Child>::Update(Some(format!("about {}", state.topic))))
        });

        StateGraph::new("child")
            .add_node("answer", answer)
            .add_edge(START, "answer")
            .add_edge("answer", END)
            .compile()
            .unwrap()
    }

    fn parent_graph(fail: bool) -> CompiledGraph<Parent> {
        let sub = SubgraphNode::new(
            child_graph(fail),
            |p: &Parent| Child {
                topic: p.question.clone(),
                ..Default::default()
            },
            |c: Child| vec![c.answer],
        );

        StateGraph::new("parent")
            .add_node("research", sub)
            .add_edge(START, "research")
            .add_edge("research", END)
            .compile()
            .unwrap()
    }

    #[tokio::test]
    async fn test_subgraph_projects_state() {
        let input = Parent {
            question: "cats".to_string(),
            ..Default::default()
        };
        let state = parent_graph(false).invoke(input, &RunConfig::default()).await.unwrap();
        assert_eq!(state.notes, vec!["about cats"]);
    }

    #[tokio::test]
    async fn test_subgraph_failure_names_both_nodes() {
        let err = parent_graph(true)
            .invoke(Parent::default(), &RunConfig::default())
            .await
            .unwrap_err();

        match &err {
            GraphError::NodeExecution { node, source, .. } => {
                assert_eq!(node, "research");
                assert!(matches!(**source, PetopetaError::Graph(_)));
            }
            other => panic!("Expected NodeExecution, got {}", other),
        }
        assert_eq!(err.failing_node(), Some("answer"));
    }

    #[tokio::test]
    async fn test_run_inside_another_handler() {
        let sub = SubgraphNode::new(
            child_graph(false),
            |p: &Parent| Child {
                topic: p.question.clone(),
                ..Default::default()
            },
            |c: Child| vec![c.answer],
        );
        let ctx = NodeContext {
            node: "host".to_string(),
            wave: 0,
            config: RunConfig::default(),
        };
        let parent = Parent {
            question: "dogs".to_string(),
            ..Default::default()
        };

        let update = sub.run(&parent, &ctx).await.unwrap();
        assert_eq!(update, vec!["about dogs"]);
    }

    #[tokio::test]
    async fn test_cancel_reaches_fan_out_inside_subgraph() {
        let finished = Arc::new(AtomicUsize::new(0));

        let split = node_fn(|_state: Arc<Child>, _ctx: NodeContext| async move {
            let items: Vec<Child> = (0..3)
                .map(|i| Child {
                    topic: i.to_string(),
                    ..Default::default()
                })
                .collect();
            Ok::<NodeOutput<Child>, PetopetaError>(Command::fan_out(None, "slow", items).into())
        });
        let counter = finished.clone();
        let slow = node_fn(move |_state: Arc<Child>, _ctx: NodeContext| {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, PetopetaError>(NodeOutput::<Child>::Update(None))
            }
        });

        let child = StateGraph::new("child")
            .add_router_node("split", split, &["slow"])
            .add_node("slow", slow)
            .add_edge(START, "split")
            .compile()
            .unwrap();
        let sub = SubgraphNode::new(
            child,
            |p: &Parent| Child {
                topic: p.question.clone(),
                ..Default::default()
            },
            |c: Child| vec![c.answer],
        );
        let parent = StateGraph::new("parent")
            .add_node("research", sub)
            .add_edge(START, "research")
            .compile()
            .unwrap();

        let config = RunConfig::default();
        let cancel = config.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let started = Instant::now();
        let err = parent.invoke(Parent::default(), &config).await.unwrap_err();
        assert!(matches!(err, GraphError::Cancelled), "got {}", err);
        assert!(started.elapsed() < Duration::from_secs(2));

        // aborted children never complete
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
