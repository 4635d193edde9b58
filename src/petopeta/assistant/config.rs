// SPDX-License-Identifier: MIT

//! Assistant configuration
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration and a file only needs to name what it overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::prompts;
use crate::adk::error::PetopetaError;
use crate::petopeta::workflow::config::{RunConfig, DEFAULT_MAX_WAVES};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfiguration {
    /// Model used for routing, planning, query generation and pet filtering
    pub query_model: String,
    /// Model used to compose final answers
    pub response_model: String,

    pub router_system_prompt: String,
    pub more_info_system_prompt: String,
    pub general_system_prompt: String,
    pub research_plan_system_prompt: String,
    pub generate_queries_system_prompt: String,
    pub response_system_prompt: String,
    pub filter_pets_recorded_system_prompt: String,
    pub filter_pets_not_recorded_system_prompt: String,

    /// Documents requested from the retriever per query
    pub search_k: usize,
    /// Queries generated per research step
    pub query_count: usize,
    /// Documents handed to the response model
    pub response_top_k: usize,

    pub max_waves: usize,
    /// Per-node timeout in seconds; unset means no limit
    pub node_timeout_secs: Option<u64>,
}

impl Default for AgentConfiguration {
    fn default() -> Self {
        Self {
            query_model: "gpt-4o-mini".to_string(),
            response_model: "gpt-4o-mini".to_string(),
            router_system_prompt: prompts::ROUTER_SYSTEM_PROMPT.to_string(),
            more_info_system_prompt: prompts::MORE_INFO_SYSTEM_PROMPT.to_string(),
            general_system_prompt: prompts::GENERAL_SYSTEM_PROMPT.to_string(),
            research_plan_system_prompt: prompts::RESEARCH_PLAN_SYSTEM_PROMPT.to_string(),
            generate_queries_system_prompt: prompts::GENERATE_QUERIES_SYSTEM_PROMPT.to_string(),
            response_system_prompt: prompts::RESPONSE_SYSTEM_PROMPT.to_string(),
            filter_pets_recorded_system_prompt: prompts::FILTER_PETS_RECORDED_SYSTEM_PROMPT
                .to_string(),
            filter_pets_not_recorded_system_prompt: prompts::FILTER_PETS_NOT_RECORDED_SYSTEM_PROMPT
                .to_string(),
            search_k: 3,
            query_count: 3,
            response_top_k: 20,
            max_waves: DEFAULT_MAX_WAVES,
            node_timeout_secs: None,
        }
    }
}

impl AgentConfiguration {
    /// Load a configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PetopetaError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| PetopetaError::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse_yaml(&content)
    }

    /// Parse a configuration from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Self, PetopetaError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PetopetaError> {
        if self.search_k == 0 {
            return Err(PetopetaError::config("search_k must be at least 1"));
        }
        if self.query_count == 0 {
            return Err(PetopetaError::config("query_count must be at least 1"));
        }
        if self.max_waves == 0 {
            return Err(PetopetaError::config("max_waves must be at least 1"));
        }
        Ok(())
    }

    /// Run configuration for one turn of `user_id`
    pub fn run_config(&self, user_id: Option<&str>) -> RunConfig {
        let mut config = RunConfig::new().with_max_waves(self.max_waves);
        if let Some(secs) = self.node_timeout_secs {
            config = config.with_node_timeout(Duration::from_secs(secs));
        }
        if let Some(user_id) = user_id {
            config = config.with_user_id(user_id);
        }
        config
    }
}
