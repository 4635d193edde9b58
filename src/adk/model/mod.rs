// SPDX-License-Identifier: MIT

//! Model module - the language model collaborator boundary
//!
//! This module provides the core Model trait and shared types.
//! Model implementations are in their own submodules:
//! - [openai] - any OpenAI-compatible chat completions API

pub mod openai;

use crate::adk::error::ModelError;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Speaker of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// JSON schema the model output must conform to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl ResponseSchema {
    /// Derive the schema of `T`
    pub fn of<T: JsonSchema>() -> Self {
        let root = schemars::schema_for!(T);
        Self {
            name: T::schema_name(),
            schema: serde_json::to_value(root).unwrap_or_default(),
        }
    }
}

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    /// Request structured output instead of free text
    pub response_schema: Option<ResponseSchema>,
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    /// Returns the model name, used in logs
    fn name(&self) -> &str;

    /// Generate a reply to the ordered messages.
    ///
    /// When `config.response_schema` is set the returned text is expected to
    /// be a JSON document conforming to it.
    async fn generate(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<String, ModelError>;
}

/// Generate a structured value of type `T`
pub async fn generate_structured<T>(
    model: &dyn Model,
    messages: &[Message],
) -> Result<T, ModelError>
where
    T: DeserializeOwned + JsonSchema,
{
    let config = GenerationConfig {
        temperature: Some(0.0),
        response_schema: Some(ResponseSchema::of::<T>()),
        ..Default::default()
    };
    let text = model.generate(messages, &config).await?;
    parse_structured(&text)
}

/// Parse model output into `T`, tolerating a surrounding markdown code fence
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, ModelError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(body.trim()).map_err(|e| {
        log::warn!("Structured output rejected: {} (output: '{}')", e, text);
        ModelError::Validation(e.to_string())
    })
}
