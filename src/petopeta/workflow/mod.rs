// SPDX-License-Identifier: MIT

pub mod config;
pub mod graph;
pub mod state;
