// SPDX-License-Identifier: MIT

//! Key-value store collaborator boundary
//!
//! Values are grouped by a two-part [`Namespace`] (collection, user id) and
//! addressed by a string key inside it.

use crate::adk::error::PetopetaError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// (collection id, user id)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub collection: String,
    pub user_id: String,
}

impl Namespace {
    pub fn new(collection: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            user_id: user_id.into(),
        }
    }
}

/// A stored entry
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub key: String,
    pub value: Value,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// All items of the namespace, ordered by key
    async fn list(&self, namespace: &Namespace) -> Result<Vec<Item>, PetopetaError>;

    /// Insert or replace the value stored under `key`
    async fn put(&self, namespace: &Namespace, key: &str, value: Value)
        -> Result<(), PetopetaError>;

    /// Remove `key`; returns whether something was removed
    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool, PetopetaError>;
}

/// Process-local store, shared between clones
#[derive(Clone, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<HashMap<Namespace, BTreeMap<String, Value>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn list(&self, namespace: &Namespace) -> Result<Vec<Item>, PetopetaError> {
        let data = self.data.read().await;
        Ok(data
            .get(namespace)
            .map(|items| {
                items
                    .iter()
                    .map(|(key, value)| Item {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        value: Value,
    ) -> Result<(), PetopetaError> {
        let mut data = self.data.write().await;
        data.entry(namespace.clone())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool, PetopetaError> {
        let mut data = self.data.write().await;
        Ok(data
            .get_mut(namespace)
            .map(|items| items.remove(key).is_some())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_and_list() {
        let store = InMemoryStore::new();
        let ns = Namespace::new("pets", "u1");

        store.put(&ns, "pet_b", json!({"name": "b"})).await.unwrap();
        store.put(&ns, "pet_a", json!({"name": "a"})).await.unwrap();

        let items = store.list(&ns).await.unwrap();
        let keys: Vec<_> = items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["pet_a", "pet_b"]);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = InMemoryStore::new();
        store
            .put(&Namespace::new("pets", "u1"), "pet_a", json!(1))
            .await
            .unwrap();

        assert!(store
            .list(&Namespace::new("pets", "u2"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new();
        let ns = Namespace::new("pets", "u1");
        store.put(&ns, "pet_a", json!(1)).await.unwrap();

        assert!(store.delete(&ns, "pet_a").await.unwrap());
        assert!(!store.delete(&ns, "pet_a").await.unwrap());
        assert!(store.list(&ns).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_is_clone() {
        let store = InMemoryStore::new();
        let cloned = store.clone();
        let ns = Namespace::new("pets", "u1");

        cloned.put(&ns, "pet_a", json!(1)).await.unwrap();
        assert_eq!(store.list(&ns).await.unwrap().len(), 1);
    }
}
