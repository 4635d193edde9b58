// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution
//!
//! A workflow state is a plain Rust struct implementing [`GraphState`]. Nodes
//! never touch it directly; they return a partial `Update` which the executor
//! folds in with [`GraphState::apply`] using the reducers below.

use super::schema::StateSchema;

/// A workflow state with declared per-field reducers
pub trait GraphState: Clone + Send + Sync + 'static {
    /// Partial update returned by node handlers; `Default` means "no change"
    type Update: Default + Send + 'static;

    /// Field declarations, shared by the compiler and the executor
    fn schema() -> StateSchema;

    /// Merge a partial update into the state, field by field
    fn apply(&mut self, update: Self::Update);

    /// Current length of a sequence field. The executor uses it to check that
    /// append fields never shrink; fields reporting `None` are not checked.
    fn field_len(&self, _field: &str) -> Option<usize> {
        None
    }
}

/// Replace reducer: the most recent writer wins
pub fn replace<T>(current: &mut T, update: Option<T>) {
    if let Some(value) = update {
        *current = value;
    }
}

/// Append reducer: extends the sequence, never shrinks it
pub fn append<T>(current: &mut Vec<T>, update: Vec<T>) {
    current.extend(update);
}

/// Replace-by-key reducer: entries whose key already exists are replaced in
/// place, new keys are appended. Entries without a key match nothing and are
/// always appended.
pub fn replace_by_key<T, K, F>(current: &mut Vec<T>, update: Vec<T>, key: F)
where
    K: PartialEq,
    F: Fn(&T) -> Option<K>,
{
    for item in update {
        let Some(k) = key(&item) else {
            current.push(item);
            continue;
        };
        match current
            .iter_mut()
            .find(|existing| key(existing).as_ref() == Some(&k))
        {
            Some(slot) => *slot = item,
            None => current.push(item),
        }
    }
}
