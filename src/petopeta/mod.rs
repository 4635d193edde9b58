// SPDX-License-Identifier: MIT

pub mod assistant;
pub mod ingest;
pub mod server;
pub mod tools;
pub mod workflow;
