// SPDX-License-Identifier: MIT

//! Fan-out / fan-in coordination
//!
//! A node fans out by returning `Goto::FanOut { target, items }`. Each item
//! becomes its own ready task for `target` in the next wave, running against
//! the item as its private state. The children's updates are merged through
//! the regular reducers, so contributions to an append field add up whatever
//! order the children finish in. The join is simply the static successor of
//! `target`, which the ready set de-duplicates.

use std::sync::Arc;

use super::executor::ReadySet;
use super::types::END;
use crate::petopeta::workflow::state::GraphState;

pub(crate) struct FanOutCoordinator;

impl FanOutCoordinator {
    /// Schedule one execution of `target` per item.
    ///
    /// Returns `false` when there is nothing to schedule. The executor then
    /// continues at the successors of `target`, static edges and conditional
    /// router alike, with an empty contribution.
    pub(crate) fn expand<S: GraphState>(
        target: &str,
        items: Vec<S>,
        ready: &mut ReadySet<S>,
    ) -> bool {
        if target == END {
            return true;
        }
        if items.is_empty() {
            log::debug!("Fan-out to '{}' has no items, skipping it", target);
            return false;
        }

        log::debug!("Fanning out '{}' over {} items", target, items.len());
        for item in items {
            ready.push_private(target.to_string(), Arc::new(item));
        }
        true
    }
}
