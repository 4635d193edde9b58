// SPDX-License-Identifier: MIT

//! Query routing and the two short-circuit replies

use async_trait::async_trait;
use std::sync::Arc;

use super::graph::node;
use super::prompts;
use super::state::{AgentState, AgentUpdate, RouteKind, Router};
use super::Collaborators;
use crate::adk::error::PetopetaError;
use crate::adk::model::{generate_structured, GenerationConfig, Message};
use crate::petopeta::workflow::graph::{Command, NodeContext, NodeHandler, NodeOutput};

/// Node ids the router may send a turn to
pub const ROUTES: [&str; 3] = [
    node::GET_AND_UPDATE_PET_INFO,
    node::ASK_FOR_MORE_INFO,
    node::RESPOND_TO_GENERAL_QUERY,
];

/// Where a classification leads
pub fn route_for(kind: RouteKind) -> &'static str {
    match kind {
        RouteKind::Health | RouteKind::Behavior | RouteKind::Disease => {
            node::GET_AND_UPDATE_PET_INFO
        }
        RouteKind::MoreInfo => node::ASK_FOR_MORE_INFO,
        RouteKind::General => node::RESPOND_TO_GENERAL_QUERY,
    }
}

/// Classifies the inquiry with one structured model call and routes on it
pub struct AnalyzeAndRouteQuery {
    deps: Arc<Collaborators>,
}

impl AnalyzeAndRouteQuery {
    pub fn new(deps: Arc<Collaborators>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl NodeHandler<AgentState> for AnalyzeAndRouteQuery {
    async fn call(
        &self,
        state: Arc<AgentState>,
        _ctx: NodeContext,
    ) -> Result<NodeOutput<AgentState>, PetopetaError> {
        let mut messages = vec![Message::system(&self.deps.config.router_system_prompt)];
        messages.extend(state.messages.iter().cloned());

        let router: Router = generate_structured(self.deps.query_model.as_ref(), &messages).await?;
        let goto = route_for(router.kind);
        log::info!("Query classified as {:?}, routing to {}", router.kind, goto);

        let update = AgentUpdate {
            router: Some(router),
            ..Default::default()
        };
        Ok(Command::goto(update, goto).into())
    }
}

/// Terminal reply driven by the router's reasoning
pub struct ReplyWithLogic {
    deps: Arc<Collaborators>,
    template: String,
}

impl ReplyWithLogic {
    /// `ask_for_more_info`: ask the user one follow-up question
    pub fn ask_for_more_info(deps: Arc<Collaborators>) -> Self {
        let template = deps.config.more_info_system_prompt.clone();
        Self { deps, template }
    }

    /// `respond_to_general_query`: answer without research
    pub fn respond_to_general_query(deps: Arc<Collaborators>) -> Self {
        let template = deps.config.general_system_prompt.clone();
        Self { deps, template }
    }
}

#[async_trait]
impl NodeHandler<AgentState> for ReplyWithLogic {
    async fn call(
        &self,
        state: Arc<AgentState>,
        _ctx: NodeContext,
    ) -> Result<NodeOutput<AgentState>, PetopetaError> {
        let logic = state.router.as_ref().map(|r| r.logic.as_str()).unwrap_or_default();
        let system = prompts::fill(&self.template, &[("logic", logic)]);

        let mut messages = vec![Message::system(system)];
        messages.extend(state.messages.iter().cloned());

        let reply = self
            .deps
            .query_model
            .generate(&messages, &GenerationConfig::default())
            .await?;
        Ok(NodeOutput::Update(AgentUpdate::reply(reply)))
    }
}
