// SPDX-License-Identifier: MIT

//! Pet reconciliation sub-workflow
//!
//! Five sequential stages over [`PetFilterState`]:
//!
//! 1. load the user's stored records
//! 2. pick the stored records the conversation is about
//! 3. extract pets the conversation mentions that are not stored
//! 4. store the new pets that have a name and a species
//! 5. assemble the result: matched stored records plus new pets with a species

use std::sync::Arc;

use super::prompts;
use super::state::{AgentState, AgentUpdate, PetList, PetRecord};
use super::Collaborators;
use crate::adk::error::{GraphError, PetopetaError};
use crate::adk::model::{generate_structured, Message};
use crate::petopeta::tools::pets::PetTools;
use crate::petopeta::workflow::graph::{
    node_fn, CompiledGraph, NodeContext, NodeOutput, StateGraph, SubgraphNode, END, START,
};
use crate::petopeta::workflow::state::{replace, FieldType, GraphState, ReducerType, StateSchema};

pub const GET_ALL_RECORDED_PETS: &str = "get_all_recorded_pets";
pub const FILTER_PETS_RECORDED: &str = "filter_pets_recorded";
pub const FILTER_PETS_NOT_RECORDED: &str = "filter_pets_not_recorded";
pub const ADD_NEW_PETS_TO_STORAGE: &str = "add_new_pets_to_storage";
pub const ASSEMBLE_FILTER_PETS: &str = "assemble_filter_pets";

#[derive(Debug, Clone, Default)]
pub struct PetFilterState {
    pub messages: Vec<Message>,
    pub pets_recorded: Vec<PetRecord>,
    pub target_pets_recorded: Vec<PetRecord>,
    pub new_pets: Vec<PetRecord>,
    pub result_pets: Vec<PetRecord>,
}

#[derive(Debug, Default)]
pub struct PetFilterUpdate {
    pub pets_recorded: Option<Vec<PetRecord>>,
    pub target_pets_recorded: Option<Vec<PetRecord>>,
    pub new_pets: Option<Vec<PetRecord>>,
    pub result_pets: Option<Vec<PetRecord>>,
}

impl GraphState for PetFilterState {
    type Update = PetFilterUpdate;

    fn schema() -> StateSchema {
        StateSchema::new()
            .field("messages", FieldType::Array, ReducerType::Input)
            .field("pets_recorded", FieldType::Array, ReducerType::Replace)
            .field("target_pets_recorded", FieldType::Array, ReducerType::Replace)
            .field("new_pets", FieldType::Array, ReducerType::Replace)
            .field("result_pets", FieldType::Array, ReducerType::Replace)
    }

    fn apply(&mut self, update: PetFilterUpdate) {
        replace(&mut self.pets_recorded, update.pets_recorded);
        replace(&mut self.target_pets_recorded, update.target_pets_recorded);
        replace(&mut self.new_pets, update.new_pets);
        replace(&mut self.result_pets, update.result_pets);
    }
}

fn same_name(a: &PetRecord, b: &PetRecord) -> bool {
    match (a.name.as_deref(), b.name.as_deref()) {
        (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        _ => false,
    }
}

/// System prompt, the stored records, then the conversation
fn filter_messages(system: &str, state: &PetFilterState) -> Result<Vec<Message>, PetopetaError> {
    let recorded = serde_json::to_string(&state.pets_recorded)?;
    let mut messages = vec![
        Message::system(system),
        Message::assistant(prompts::fill(
            prompts::PETS_RECORDED_MESSAGE,
            &[("pets_recorded", &recorded)],
        )),
    ];
    messages.extend(state.messages.iter().cloned());
    Ok(messages)
}

/// Stored records the model picked, merged with what the conversation adds.
/// Anything that does not name a stored record is dropped.
pub fn constrain_to_recorded(recorded: &[PetRecord], picked: Vec<PetRecord>) -> Vec<PetRecord> {
    let mut result: Vec<PetRecord> = Vec::new();
    for pet in picked {
        let Some(stored) = recorded.iter().find(|r| same_name(r, &pet)) else {
            log::debug!("Ignoring pet {:?}: not in the stored records", pet.name);
            continue;
        };
        if !result.iter().any(|r| same_name(r, stored)) {
            result.push(stored.merged_with(&pet));
        }
    }
    result
}

async fn get_all_recorded_pets(
    tools: PetTools,
    ctx: NodeContext,
) -> Result<NodeOutput<PetFilterState>, PetopetaError> {
    let pets = tools.get_pets(ctx.config.user_id()).await?;
    log::debug!("Loaded {} stored pets", pets.len());
    Ok(NodeOutput::Update(PetFilterUpdate {
        pets_recorded: Some(pets),
        ..Default::default()
    }))
}

async fn filter_pets_recorded(
    deps: Arc<Collaborators>,
    state: Arc<PetFilterState>,
) -> Result<NodeOutput<PetFilterState>, PetopetaError> {
    // nothing stored, nothing to match
    if state.pets_recorded.is_empty() {
        return Ok(NodeOutput::empty());
    }
    let messages = filter_messages(&deps.config.filter_pets_recorded_system_prompt, &state)?;
    let picked: PetList = generate_structured(deps.query_model.as_ref(), &messages).await?;
    let targets = constrain_to_recorded(&state.pets_recorded, picked.pets);
    Ok(NodeOutput::Update(PetFilterUpdate {
        target_pets_recorded: Some(targets),
        ..Default::default()
    }))
}

async fn filter_pets_not_recorded(
    deps: Arc<Collaborators>,
    state: Arc<PetFilterState>,
) -> Result<NodeOutput<PetFilterState>, PetopetaError> {
    let messages = filter_messages(&deps.config.filter_pets_not_recorded_system_prompt, &state)?;
    let extracted: PetList = generate_structured(deps.query_model.as_ref(), &messages).await?;
    let new_pets = extracted
        .pets
        .into_iter()
        .filter(|pet| !state.pets_recorded.iter().any(|r| same_name(r, pet)))
        .collect();
    Ok(NodeOutput::Update(PetFilterUpdate {
        new_pets: Some(new_pets),
        ..Default::default()
    }))
}

async fn add_new_pets_to_storage(
    tools: PetTools,
    state: Arc<PetFilterState>,
    ctx: NodeContext,
) -> Result<NodeOutput<PetFilterState>, PetopetaError> {
    for pet in state.new_pets.iter().filter(|p| p.is_storable()) {
        tools.add_or_update_pet(ctx.config.user_id(), pet).await?;
    }
    Ok(NodeOutput::empty())
}

async fn assemble_filter_pets(
    state: Arc<PetFilterState>,
) -> Result<NodeOutput<PetFilterState>, PetopetaError> {
    let mut result = state.target_pets_recorded.clone();
    result.extend(state.new_pets.iter().filter(|p| p.has_species()).cloned());
    Ok(NodeOutput::Update(PetFilterUpdate {
        result_pets: Some(result),
        ..Default::default()
    }))
}

/// The reconciliation graph on its own
pub fn build_pet_filter_graph(
    deps: Arc<Collaborators>,
) -> Result<CompiledGraph<PetFilterState>, GraphError> {
    let (load_tools, store_tools) = (deps.pets.clone(), deps.pets.clone());
    let (recorded_deps, new_deps) = (deps.clone(), deps);

    StateGraph::new("pet_filter")
        .add_node(
            GET_ALL_RECORDED_PETS,
            node_fn(move |_state: Arc<PetFilterState>, ctx: NodeContext| {
                get_all_recorded_pets(load_tools.clone(), ctx)
            }),
        )
        .add_node(
            FILTER_PETS_RECORDED,
            node_fn(move |state: Arc<PetFilterState>, _ctx: NodeContext| {
                filter_pets_recorded(recorded_deps.clone(), state)
            }),
        )
        .add_node(
            FILTER_PETS_NOT_RECORDED,
            node_fn(move |state: Arc<PetFilterState>, _ctx: NodeContext| {
                filter_pets_not_recorded(new_deps.clone(), state)
            }),
        )
        .add_node(
            ADD_NEW_PETS_TO_STORAGE,
            node_fn(move |state: Arc<PetFilterState>, ctx: NodeContext| {
                add_new_pets_to_storage(store_tools.clone(), state, ctx)
            }),
        )
        .add_node(
            ASSEMBLE_FILTER_PETS,
            node_fn(|state: Arc<PetFilterState>, _ctx: NodeContext| assemble_filter_pets(state)),
        )
        .add_edge(START, GET_ALL_RECORDED_PETS)
        .add_edge(GET_ALL_RECORDED_PETS, FILTER_PETS_RECORDED)
        .add_edge(FILTER_PETS_RECORDED, FILTER_PETS_NOT_RECORDED)
        .add_edge(FILTER_PETS_NOT_RECORDED, ADD_NEW_PETS_TO_STORAGE)
        .add_edge(ADD_NEW_PETS_TO_STORAGE, ASSEMBLE_FILTER_PETS)
        .add_edge(ASSEMBLE_FILTER_PETS, END)
        .compile()
}

/// `get_and_update_pet_info`: the reconciliation graph as a node of the main graph
pub fn get_and_update_pet_info(
    deps: Arc<Collaborators>,
) -> Result<SubgraphNode<AgentState, PetFilterState>, GraphError> {
    Ok(SubgraphNode::new(
        build_pet_filter_graph(deps)?,
        |parent: &AgentState| PetFilterState {
            messages: parent.messages.clone(),
            ..Default::default()
        },
        |child: PetFilterState| AgentUpdate {
            pets: child.result_pets,
            ..Default::default()
        },
    ))
}
