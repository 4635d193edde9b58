// SPDX-License-Identifier: MIT

//! Researcher sub-workflow
//!
//! `generate_queries` turns one research step into several search queries and
//! fans out one `retrieve_documents` execution per query. The retrieved
//! documents of every branch are appended to `documents`.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

use super::prompts;
use super::state::PetRecord;
use super::Collaborators;
use crate::adk::error::{GraphError, PetopetaError};
use crate::adk::model::{generate_structured, Message};
use crate::adk::retriever::Document;
use crate::petopeta::workflow::graph::{
    Command, CompiledGraph, NodeContext, NodeHandler, NodeOutput, StateGraph, END, START,
};
use crate::petopeta::workflow::state::{
    append, replace, FieldType, GraphState, ReducerType, StateSchema,
};

pub const GENERATE_QUERIES: &str = "generate_queries";
pub const RETRIEVE_DOCUMENTS: &str = "retrieve_documents";

#[derive(Debug, Clone, Default)]
pub struct ResearcherState {
    /// The research step being worked on
    pub question: String,
    pub pets: Vec<PetRecord>,
    pub queries: Vec<String>,
    /// Set on the private state of each fan-out branch
    pub query: Option<String>,
    pub documents: Vec<Document>,
}

#[derive(Debug, Default)]
pub struct ResearcherUpdate {
    pub queries: Option<Vec<String>>,
    pub documents: Vec<Document>,
}

impl GraphState for ResearcherState {
    type Update = ResearcherUpdate;

    fn schema() -> StateSchema {
        StateSchema::new()
            .field("question", FieldType::String, ReducerType::Input)
            .field("pets", FieldType::Array, ReducerType::Input)
            .field("queries", FieldType::Array, ReducerType::Replace)
            .field("query", FieldType::String, ReducerType::Input)
            .field("documents", FieldType::Array, ReducerType::Append)
    }

    fn apply(&mut self, update: ResearcherUpdate) {
        replace(&mut self.queries, update.queries);
        append(&mut self.documents, update.documents);
    }

    fn field_len(&self, field: &str) -> Option<usize> {
        (field == "documents").then_some(self.documents.len())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct QueryList {
    #[serde(default)]
    queries: Vec<String>,
}

/// Render pets for a prompt
pub fn format_pets(pets: &[PetRecord]) -> String {
    if pets.is_empty() {
        return prompts::NO_PET_INFORMATION.to_string();
    }
    serde_json::to_string(pets).unwrap_or_else(|_| prompts::NO_PET_INFORMATION.to_string())
}

pub struct GenerateQueries {
    deps: Arc<Collaborators>,
}

#[async_trait]
impl NodeHandler<ResearcherState> for GenerateQueries {
    async fn call(
        &self,
        state: Arc<ResearcherState>,
        _ctx: NodeContext,
    ) -> Result<NodeOutput<ResearcherState>, PetopetaError> {
        let count = self.deps.config.query_count;
        let system = prompts::fill(
            &self.deps.config.generate_queries_system_prompt,
            &[("count", &count.to_string())],
        );
        let messages = vec![
            Message::system(system),
            Message::assistant(prompts::pet_information(&format_pets(&state.pets))),
            Message::user(&state.question),
        ];

        let response: QueryList =
            generate_structured(self.deps.query_model.as_ref(), &messages).await?;
        let queries: Vec<String> = response
            .queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(count)
            .collect();
        log::info!("Researching '{}' with {} queries", state.question, queries.len());

        let branches = queries
            .iter()
            .map(|q| ResearcherState {
                query: Some(q.clone()),
                ..Default::default()
            })
            .collect();
        let update = ResearcherUpdate {
            queries: Some(queries),
            ..Default::default()
        };
        Ok(Command::fan_out(update, RETRIEVE_DOCUMENTS, branches).into())
    }
}

pub struct RetrieveDocuments {
    deps: Arc<Collaborators>,
}

#[async_trait]
impl NodeHandler<ResearcherState> for RetrieveDocuments {
    async fn call(
        &self,
        state: Arc<ResearcherState>,
        _ctx: NodeContext,
    ) -> Result<NodeOutput<ResearcherState>, PetopetaError> {
        let Some(query) = state.query.as_deref() else {
            return Err(PetopetaError::other("retrieve_documents needs a query"));
        };

        let documents = self
            .deps
            .retriever
            .search(query, self.deps.config.search_k)
            .await?;
        log::debug!(
            "Retriever {} returned {} documents for '{}'",
            self.deps.retriever.name(),
            documents.len(),
            query
        );

        Ok(NodeOutput::Update(ResearcherUpdate {
            documents,
            ..Default::default()
        }))
    }
}

pub fn build_researcher_graph(
    deps: Arc<Collaborators>,
) -> Result<CompiledGraph<ResearcherState>, GraphError> {
    StateGraph::new("researcher")
        .add_router_node(
            GENERATE_QUERIES,
            GenerateQueries { deps: deps.clone() },
            &[RETRIEVE_DOCUMENTS],
        )
        .add_node(RETRIEVE_DOCUMENTS, RetrieveDocuments { deps })
        .add_edge(START, GENERATE_QUERIES)
        .add_edge(RETRIEVE_DOCUMENTS, END)
        .compile()
}
