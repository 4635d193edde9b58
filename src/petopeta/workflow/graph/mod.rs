// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! Graphs are declared with [`StateGraph`], validated by
//! [`StateGraph::compile`] and run wave by wave with
//! [`CompiledGraph::invoke`].

pub mod builder;
pub mod executor;
mod fanout;
pub mod subgraph;
pub mod types;

pub use builder::{CompiledGraph, StateGraph};
pub use subgraph::SubgraphNode;
pub use types::{
    node_fn, Command, FnHandler, GraphEvent, Goto, NodeContext, NodeHandler, NodeOutput, END, START,
};
