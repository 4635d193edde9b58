// SPDX-License-Identifier: MIT

//! State management for graph workflows
//!
//! This module provides:
//! - `StateSchema` - declares the fields, types and reducers of a state
//! - `GraphState` - the trait a workflow state implements
//! - reducer functions for merging partial updates into state

mod schema;
mod store;

pub use schema::{FieldType, ReducerType, StateFieldDef, StateSchema};
pub use store::{append, replace, replace_by_key, GraphState};
