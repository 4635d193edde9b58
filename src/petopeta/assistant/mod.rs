// SPDX-License-Identifier: MIT

//! Pet-care assistant built on the graph engine
//!
//! One conversational turn runs the main graph: the router classifies the
//! inquiry, research-worthy inquiries reconcile the user's stored pets and
//! run an iterative research loop, and `respond` writes the final answer.

pub mod config;
pub mod graph;
pub mod pets;
pub mod prompts;
pub mod researcher;
pub mod router;
pub mod state;

use std::sync::Arc;

use crate::adk::error::GraphError;
use crate::adk::model::Model;
use crate::adk::retriever::Retriever;
use crate::petopeta::tools::pets::PetTools;
use crate::petopeta::workflow::config::RunConfig;
use crate::petopeta::workflow::graph::CompiledGraph;

pub use config::AgentConfiguration;
pub use state::{AgentState, InputState, PetRecord, ResearchProgress, RouteKind, Router};

/// Everything the assistant's nodes talk to
#[derive(Clone)]
pub struct Collaborators {
    pub query_model: Arc<dyn Model>,
    pub response_model: Arc<dyn Model>,
    pub retriever: Arc<dyn Retriever>,
    pub pets: PetTools,
    pub config: AgentConfiguration,
}

/// A compiled assistant graph together with its configuration
#[derive(Clone)]
pub struct Assistant {
    graph: CompiledGraph<AgentState>,
    config: AgentConfiguration,
    pets: PetTools,
}

impl Assistant {
    pub fn new(collaborators: Collaborators) -> Result<Self, GraphError> {
        let config = collaborators.config.clone();
        let pets = collaborators.pets.clone();
        let graph = graph::build_graph(Arc::new(collaborators))?;
        Ok(Self {
            graph,
            config,
            pets,
        })
    }

    pub fn graph(&self) -> &CompiledGraph<AgentState> {
        &self.graph
    }

    /// The pet records the graph reads and writes
    pub fn pets(&self) -> &PetTools {
        &self.pets
    }

    /// Run configuration for a turn of `user_id`, derived from the assistant configuration
    pub fn run_config(&self, user_id: Option<&str>) -> RunConfig {
        self.config.run_config(user_id)
    }

    /// Answer one turn of the conversation
    pub async fn chat(
        &self,
        input: InputState,
        user_id: Option<&str>,
    ) -> Result<AgentState, GraphError> {
        self.invoke(input, &self.run_config(user_id)).await
    }

    /// Answer one turn with a caller-provided run configuration
    pub async fn invoke(
        &self,
        input: InputState,
        config: &RunConfig,
    ) -> Result<AgentState, GraphError> {
        self.graph.invoke(input, config).await
    }
}
