// SPDX-License-Identifier: MIT

//! State schema definitions

use serde::Serialize;
use std::collections::HashSet;

use crate::adk::error::GraphError;

/// Schema declaring the fields of a workflow state and how each one merges
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct StateSchema {
    /// Field definitions, in declaration order
    pub fields: Vec<StateFieldDef>,
}

/// Definition of a single state field
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StateFieldDef {
    pub name: String,
    /// Type of the field
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Reducer for merging values
    pub reducer: ReducerType,
}

/// Supported field types
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

/// Reducer types for merging partial updates into state
#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReducerType {
    /// Replace the value (default)
    #[default]
    Replace,
    /// Append to a sequence; the sequence never shrinks
    Append,
    /// Replace entries of a keyed collection, last writer wins per key
    ReplaceByKey,
    /// Set from the run input only; no update writes it
    Input,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field
    pub fn field(mut self, name: &str, field_type: FieldType, reducer: ReducerType) -> Self {
        self.fields.push(StateFieldDef {
            name: name.to_string(),
            field_type,
            reducer,
        });
        self
    }

    /// Names of the append-only fields
    pub fn append_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.reducer == ReducerType::Append)
            .map(|f| f.name.as_str())
    }

    /// Check the schema is well formed
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(GraphError::validation("state field with empty name"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(GraphError::validation(format!(
                    "state field '{}' declared twice",
                    field.name
                )));
            }
            if field.reducer == ReducerType::Append && field.field_type != FieldType::Array {
                return Err(GraphError::validation(format!(
                    "append reducer on non-array field '{}'",
                    field.name
                )));
            }
        }
        Ok(())
    }
}
