// SPDX-License-Identifier: MIT

//! Conversation state of the pet-care assistant

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::adk::model::Message;
use crate::adk::retriever::Document;
use crate::petopeta::workflow::state::{
    append, replace, replace_by_key, FieldType, GraphState, ReducerType, StateSchema,
};

/// Classification of an inquiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RouteKind {
    /// More information is needed before anything can be researched
    MoreInfo,
    /// Health, nutrition and daily care
    Health,
    /// Behavior and training
    Behavior,
    /// Disease prevention and treatment
    Disease,
    /// Anything else about pets and animals
    General,
}

impl RouteKind {
    /// Whether the inquiry goes through pet reconciliation and research
    pub fn needs_research(self) -> bool {
        matches!(self, RouteKind::Health | RouteKind::Behavior | RouteKind::Disease)
    }
}

/// Router decision: the classification and the reasoning behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Router {
    #[serde(rename = "type")]
    pub kind: RouteKind,
    #[serde(default)]
    pub logic: String,
}

/// Everything known about one pet of a user.
///
/// Every field is optional while in transit from the model; a record is only
/// persisted when both `name` and `species` are non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PetRecord {
    /// the name of the pet
    #[serde(default)]
    pub name: Option<String>,
    /// the species of the pet
    #[serde(default)]
    pub species: Option<String>,
    /// the breed of the pet
    #[serde(default)]
    pub breed: Option<String>,
    /// the gender of the pet
    #[serde(default)]
    pub gender: Option<String>,
    /// the age in years of the pet
    #[serde(default)]
    pub age: Option<f64>,
    /// the weight in kg of the pet
    #[serde(default)]
    pub weight: Option<f64>,
    /// extra condition of the pet, like health conditions, allergies,
    /// activity level or dietary restrictions
    #[serde(default)]
    pub extra_condition: Option<String>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl PetRecord {
    pub fn named(name: impl Into<String>, species: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            species: Some(species.into()),
            ..Default::default()
        }
    }

    pub fn has_name(&self) -> bool {
        present(&self.name)
    }

    pub fn has_species(&self) -> bool {
        present(&self.species)
    }

    /// Name and species are both known
    pub fn is_storable(&self) -> bool {
        self.has_name() && self.has_species()
    }

    /// Key used by the replace-by-key reducer; unnamed pets have none
    pub fn key(&self) -> Option<String> {
        self.name.clone().filter(|_| self.has_name())
    }

    /// This record with every field `other` knows about taken from `other`
    pub fn merged_with(&self, other: &PetRecord) -> PetRecord {
        PetRecord {
            name: self.name.clone(),
            species: if present(&other.species) {
                other.species.clone()
            } else {
                self.species.clone()
            },
            breed: other.breed.clone().or_else(|| self.breed.clone()),
            gender: other.gender.clone().or_else(|| self.gender.clone()),
            age: other.age.or(self.age),
            weight: other.weight.or(self.weight),
            extra_condition: other
                .extra_condition
                .clone()
                .or_else(|| self.extra_condition.clone()),
        }
    }
}

/// Structured-output wrapper for a list of pets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PetList {
    #[serde(default)]
    pub pets: Vec<PetRecord>,
}

/// Progress of the research loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchProgress {
    /// Steps of the plan remain to be researched
    #[default]
    AwaitingStep,
    /// The plan is exhausted (or was empty)
    Done,
}

/// What a caller submits: the conversation so far
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputState {
    pub messages: Vec<Message>,
}

impl InputState {
    pub fn from_user(content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(content)],
        }
    }
}

/// Full state of one assistant turn
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentState {
    pub messages: Vec<Message>,
    pub router: Option<Router>,
    pub pets: Vec<PetRecord>,
    pub steps: Vec<String>,
    pub documents: Vec<Document>,
    pub answer: String,
    pub research: ResearchProgress,
}

impl From<InputState> for AgentState {
    fn from(input: InputState) -> Self {
        Self {
            messages: input.messages,
            ..Default::default()
        }
    }
}

/// Partial update returned by assistant nodes
#[derive(Debug, Default)]
pub struct AgentUpdate {
    pub messages: Vec<Message>,
    pub router: Option<Router>,
    pub pets: Vec<PetRecord>,
    pub steps: Option<Vec<String>>,
    pub documents: Vec<Document>,
    pub answer: Option<String>,
    pub research: Option<ResearchProgress>,
}

impl AgentUpdate {
    /// The assistant replied: append the message and record it as the answer
    pub fn reply(content: String) -> Self {
        Self {
            messages: vec![Message::assistant(content.clone())],
            answer: Some(content),
            ..Default::default()
        }
    }
}

impl GraphState for AgentState {
    type Update = AgentUpdate;

    fn schema() -> StateSchema {
        StateSchema::new()
            .field("messages", FieldType::Array, ReducerType::Append)
            .field("router", FieldType::Object, ReducerType::Replace)
            .field("pets", FieldType::Array, ReducerType::ReplaceByKey)
            .field("steps", FieldType::Array, ReducerType::Replace)
            .field("documents", FieldType::Array, ReducerType::Append)
            .field("answer", FieldType::String, ReducerType::Replace)
            .field("research", FieldType::String, ReducerType::Replace)
    }

    fn apply(&mut self, update: AgentUpdate) {
        append(&mut self.messages, update.messages);
        if update.router.is_some() {
            self.router = update.router;
        }
        replace_by_key(&mut self.pets, update.pets, PetRecord::key);
        replace(&mut self.steps, update.steps);
        append(&mut self.documents, update.documents);
        replace(&mut self.answer, update.answer);
        replace(&mut self.research, update.research);
    }

    fn field_len(&self, field: &str) -> Option<usize> {
        match field {
            "messages" => Some(self.messages.len()),
            "documents" => Some(self.documents.len()),
            _ => None,
        }
    }
}
