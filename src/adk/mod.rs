// SPDX-License-Identifier: MIT

//! Collaborator kit - the boundaries the workflow engine talks through
//!
//! - [`model`] - language models
//! - [`retriever`] - document search
//! - [`store`] - key-value persistence
//! - [`error`] - error types shared by every layer

pub mod error;
pub mod model;
pub mod retriever;
pub mod store;
