// SPDX-License-Identifier: MIT

//! The main assistant graph
//!
//! ```text
//! START -> analyze_and_route_query -+-> ask_for_more_info -> END
//!                                   +-> respond_to_general_query -> END
//!                                   +-> get_and_update_pet_info
//!                                         -> create_research_plan -+-> respond -> END
//!                                                                  +-> conduct_research (loops) -> respond
//! ```

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

use super::pets::get_and_update_pet_info;
use super::prompts;
use super::researcher::{build_researcher_graph, format_pets, ResearcherState};
use super::router::{AnalyzeAndRouteQuery, ReplyWithLogic, ROUTES};
use super::state::{AgentState, AgentUpdate, ResearchProgress};
use super::Collaborators;
use crate::adk::error::{GraphError, PetopetaError};
use crate::adk::model::{generate_structured, GenerationConfig, Message};
use crate::adk::retriever::Document;
use crate::petopeta::workflow::graph::{
    Command, CompiledGraph, NodeContext, NodeHandler, NodeOutput, StateGraph, SubgraphNode, END,
    START,
};

pub mod node {
    pub const ANALYZE_AND_ROUTE_QUERY: &str = "analyze_and_route_query";
    pub const ASK_FOR_MORE_INFO: &str = "ask_for_more_info";
    pub const RESPOND_TO_GENERAL_QUERY: &str = "respond_to_general_query";
    pub const GET_AND_UPDATE_PET_INFO: &str = "get_and_update_pet_info";
    pub const CREATE_RESEARCH_PLAN: &str = "create_research_plan";
    pub const CONDUCT_RESEARCH: &str = "conduct_research";
    pub const RESPOND: &str = "respond";
}

const RESEARCH_ROUTES: [&str; 2] = [node::CONDUCT_RESEARCH, node::RESPOND];

#[derive(Debug, Deserialize, JsonSchema)]
struct Plan {
    #[serde(default)]
    steps: Vec<String>,
}

/// Render documents as `<document>` blocks
pub fn format_docs(documents: &[Document]) -> String {
    let blocks: Vec<String> = documents
        .iter()
        .map(|doc| {
            format!(
                "<document source=\"{}\" title=\"{}\">\n{}\n</document>",
                doc.source, doc.title, doc.content
            )
        })
        .collect();
    format!("<documents>\n{}\n</documents>", blocks.join("\n"))
}

/// Pet information message shared by planning and responding
fn pet_information_message(state: &AgentState) -> Message {
    Message::assistant(prompts::pet_information(&format_pets(&state.pets)))
}

fn skip_research() -> AgentUpdate {
    AgentUpdate {
        steps: Some(Vec::new()),
        research: Some(ResearchProgress::Done),
        ..Default::default()
    }
}

/// Plans the research, or skips it when no pet is known
pub struct CreateResearchPlan {
    deps: Arc<Collaborators>,
}

#[async_trait]
impl NodeHandler<AgentState> for CreateResearchPlan {
    async fn call(
        &self,
        state: Arc<AgentState>,
        _ctx: NodeContext,
    ) -> Result<NodeOutput<AgentState>, PetopetaError> {
        if state.pets.is_empty() {
            log::info!("No pet information, skipping research");
            return Ok(Command::goto(skip_research(), node::RESPOND).into());
        }

        let mut messages = vec![
            Message::system(&self.deps.config.research_plan_system_prompt),
            pet_information_message(&state),
        ];
        messages.extend(state.messages.iter().cloned());

        let plan: Plan = generate_structured(self.deps.query_model.as_ref(), &messages).await?;
        let steps: Vec<String> = plan
            .steps
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect();

        if steps.is_empty() {
            log::info!("Empty research plan");
            return Ok(Command::goto(skip_research(), node::RESPOND).into());
        }

        log::info!("Research plan with {} steps", steps.len());
        let update = AgentUpdate {
            steps: Some(steps),
            research: Some(ResearchProgress::AwaitingStep),
            ..Default::default()
        };
        Ok(Command::goto(update, node::CONDUCT_RESEARCH).into())
    }
}

/// Researches the head of the plan and loops while steps remain
pub struct ConductResearch {
    researcher: SubgraphNode<AgentState, ResearcherState>,
}

impl ConductResearch {
    pub fn new(deps: Arc<Collaborators>) -> Result<Self, GraphError> {
        let researcher = SubgraphNode::new(
            build_researcher_graph(deps)?,
            |parent: &AgentState| ResearcherState {
                question: parent.steps.first().cloned().unwrap_or_default(),
                pets: parent.pets.clone(),
                ..Default::default()
            },
            |child: ResearcherState| AgentUpdate {
                documents: child.documents,
                ..Default::default()
            },
        );
        Ok(Self { researcher })
    }
}

#[async_trait]
impl NodeHandler<AgentState> for ConductResearch {
    async fn call(
        &self,
        state: Arc<AgentState>,
        ctx: NodeContext,
    ) -> Result<NodeOutput<AgentState>, PetopetaError> {
        let Some((step, rest)) = state.steps.split_first() else {
            return Ok(Command::goto(skip_research(), node::RESPOND).into());
        };
        log::info!("Conducting research step: {}", step);

        let mut update = self.researcher.run(&state, &ctx).await?;
        update.steps = Some(rest.to_vec());

        let goto = if rest.is_empty() {
            update.research = Some(ResearchProgress::Done);
            node::RESPOND
        } else {
            update.research = Some(ResearchProgress::AwaitingStep);
            node::CONDUCT_RESEARCH
        };
        Ok(Command::goto(update, goto).into())
    }
}

/// Writes the final answer from the top documents
pub struct Respond {
    deps: Arc<Collaborators>,
}

#[async_trait]
impl NodeHandler<AgentState> for Respond {
    async fn call(
        &self,
        state: Arc<AgentState>,
        _ctx: NodeContext,
    ) -> Result<NodeOutput<AgentState>, PetopetaError> {
        let top_k = self.deps.config.response_top_k.min(state.documents.len());
        let context = format_docs(&state.documents[..top_k]);
        let system = prompts::fill(
            &self.deps.config.response_system_prompt,
            &[("context", &context)],
        );

        let mut messages = vec![Message::system(system), pet_information_message(&state)];
        messages.extend(state.messages.iter().cloned());

        let reply = self
            .deps
            .response_model
            .generate(&messages, &GenerationConfig::default())
            .await?;
        Ok(NodeOutput::Update(AgentUpdate::reply(reply)))
    }
}

/// Compile the assistant graph
pub fn build_graph(deps: Arc<Collaborators>) -> Result<CompiledGraph<AgentState>, GraphError> {
    StateGraph::new("petopeta")
        .add_router_node(
            node::ANALYZE_AND_ROUTE_QUERY,
            AnalyzeAndRouteQuery::new(deps.clone()),
            &ROUTES,
        )
        .add_node(node::ASK_FOR_MORE_INFO, ReplyWithLogic::ask_for_more_info(deps.clone()))
        .add_node(
            node::RESPOND_TO_GENERAL_QUERY,
            ReplyWithLogic::respond_to_general_query(deps.clone()),
        )
        .add_node(node::GET_AND_UPDATE_PET_INFO, get_and_update_pet_info(deps.clone())?)
        .add_router_node(
            node::CREATE_RESEARCH_PLAN,
            CreateResearchPlan { deps: deps.clone() },
            &RESEARCH_ROUTES,
        )
        .add_router_node(
            node::CONDUCT_RESEARCH,
            ConductResearch::new(deps.clone())?,
            &RESEARCH_ROUTES,
        )
        .add_node(node::RESPOND, Respond { deps })
        .add_edge(START, node::ANALYZE_AND_ROUTE_QUERY)
        .add_edge(node::ASK_FOR_MORE_INFO, END)
        .add_edge(node::RESPOND_TO_GENERAL_QUERY, END)
        .add_edge(node::GET_AND_UPDATE_PET_INFO, node::CREATE_RESEARCH_PLAN)
        .add_edge(node::RESPOND, END)
        .compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::petopeta::assistant::state::{InputState, PetRecord};
    use crate::petopeta::assistant::testing::{collaborators, MockModel};
    use crate::petopeta::workflow::config::RunConfig;
    use crate::petopeta::workflow::graph::GraphEvent;
    use tokio::sync::mpsc;

    #[test]
    fn test_graph_compiles() {
        let graph = build_graph(collaborators(MockModel::new(vec![]))).unwrap();
        assert_eq!(graph.entry(), &[node::ANALYZE_AND_ROUTE_QUERY.to_string()]);
        assert_eq!(graph.dynamic_targets(node::CONDUCT_RESEARCH), RESEARCH_ROUTES.to_vec());
        assert_eq!(graph.edges_from(node::RESPOND), &[END.to_string()]);
    }

    #[test]
    fn test_format_docs() {
        let docs = vec![
            Document::new("https://a.example", "Grass", "Dogs eat grass"),
            Document::new("", "", "untitled"),
        ];
        let text = format_docs(&docs);
        assert!(text.starts_with("<documents>"));
        assert!(text.contains(
            "<document source=\"https://a.example\" title=\"Grass\">\nDogs eat grass\n</document>"
        ));
        assert!(text.contains("<document source=\"\" title=\"\">"));
    }

    #[tokio::test]
    async fn test_research_steps_run_once_each() {
        let model = MockModel::new(vec![
            r#"{"type": "behavior", "logic": "grass eating"}"#,
            r#"{"pets": [{"name": "Rex", "species": "Dog"}]}"#,
            r#"{"steps": ["causes", "risks"]}"#,
            r#"{"queries": ["q1"]}"#,
            r#"{"queries": ["q2", "q3"]}"#,
            "Rex is probably fine.",
        ]);
        let deps = collaborators(model.clone());
        let graph = build_graph(deps).unwrap();

        let (tx, mut rx) = mpsc::channel(256);
        let config = RunConfig::default().with_user_id("u1").with_events(tx);
        let state = graph
            .invoke(InputState::from_user("My dog Rex won't stop eating grass"), &config)
            .await
            .unwrap();
        drop(config);

        let mut research_runs = 0;
        while let Some(event) = rx.recv().await {
            if let GraphEvent::NodeFinished { graph, node, .. } = event {
                if graph == "petopeta" && node == node::CONDUCT_RESEARCH {
                    research_runs += 1;
                }
            }
        }

        assert_eq!(research_runs, 2);
        assert_eq!(state.documents.len(), 9);
        assert!(state.steps.is_empty());
        assert_eq!(state.research, ResearchProgress::Done);
        assert_eq!(state.answer, "Rex is probably fine.");
        assert_eq!(state.pets, vec![PetRecord::named("Rex", "Dog")]);
    }

    #[tokio::test]
    async fn test_no_pets_skips_research() {
        let model = MockModel::new(vec![
            r#"{"type": "health", "logic": "diet"}"#,
            r#"{"pets": []}"#,
            "Feed a balanced diet.",
        ]);
        let graph = build_graph(collaborators(model.clone())).unwrap();

        let state = graph
            .invoke(InputState::from_user("What should a dog eat?"), &RunConfig::default())
            .await
            .unwrap();

        assert!(state.documents.is_empty());
        assert_eq!(state.research, ResearchProgress::Done);
        assert_eq!(state.answer, "Feed a balanced diet.");

        let respond_prompt = &model.requests()[2];
        assert!(respond_prompt[0].content.contains("<documents>\n\n</documents>"));
        assert!(respond_prompt[1].content.contains(prompts::NO_PET_INFORMATION));
    }

    #[tokio::test]
    async fn test_respond_uses_top_k_documents() {
        let model = MockModel::new(vec!["answer"]);
        let deps = collaborators(model.clone());
        let respond = Respond { deps };

        let state = AgentState {
            documents: (0..25)
                .map(|i| Document::new(format!("s{}", i), "", "c"))
                .collect(),
            ..AgentState::from(InputState::from_user("hi"))
        };
        let ctx = NodeContext {
            node: node::RESPOND.to_string(),
            wave: 0,
            config: RunConfig::default(),
        };
        respond.call(Arc::new(state), ctx).await.unwrap();

        let system = &model.requests()[0][0].content;
        assert!(system.contains("source=\"s19\""));
        assert!(!system.contains("source=\"s20\""));
    }
}
