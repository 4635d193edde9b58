// SPDX-License-Identifier: MIT

//! Pet record tools
//!
//! Records of a user live in the `("pets", user_id)` namespace of a
//! [`KeyValueStore`] under the key `pet_<name>`. Without a user id nothing is
//! read or written.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::adk::error::PetopetaError;
use crate::adk::store::{KeyValueStore, Namespace};
use crate::petopeta::assistant::state::PetRecord;

pub const PET_COLLECTION: &str = "pets";
pub const NO_PET_FOUND: &str = "no pet found";
pub const PET_DELETED: &str = "the information of the pet is deleted";

fn pet_key(pet: &PetRecord) -> String {
    format!("pet_{}", pet.name.as_deref().unwrap_or_default())
}

/// Attributes identifying the pet to delete; unset fields are not compared
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PetFilter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub age: Option<f64>,
}

impl PetFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.species.is_none() && self.breed.is_none() && self.age.is_none()
    }

    /// Every set filter equals the candidate's field
    pub fn matches(&self, pet: &PetRecord) -> bool {
        let eq = |filter: &Option<String>, value: &Option<String>| {
            filter.as_ref().map_or(true, |f| value.as_ref() == Some(f))
        };
        eq(&self.name, &pet.name)
            && eq(&self.species, &pet.species)
            && eq(&self.breed, &pet.breed)
            && self.age.map_or(true, |age| pet.age == Some(age))
    }
}

/// Pet record operations over a key-value store
#[derive(Clone)]
pub struct PetTools {
    store: Arc<dyn KeyValueStore>,
}

impl PetTools {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn namespace(user_id: &str) -> Namespace {
        Namespace::new(PET_COLLECTION, user_id)
    }

    /// Every stored record of the user, ordered by key
    pub async fn get_pets(&self, user_id: Option<&str>) -> Result<Vec<PetRecord>, PetopetaError> {
        let Some(user_id) = user_id else {
            return Ok(Vec::new());
        };

        let items = self.store.list(&Self::namespace(user_id)).await?;
        items
            .into_iter()
            .map(|item| serde_json::from_value(item.value).map_err(PetopetaError::from))
            .collect()
    }

    /// Store `pet`, replacing any record with the same name.
    ///
    /// Returns whether the record was stored: records missing a name or a
    /// species, or calls without a user, store nothing.
    pub async fn add_or_update_pet(
        &self,
        user_id: Option<&str>,
        pet: &PetRecord,
    ) -> Result<bool, PetopetaError> {
        let Some(user_id) = user_id else {
            return Ok(false);
        };
        if !pet.is_storable() {
            log::debug!("Not storing pet without name or species: {:?}", pet);
            return Ok(false);
        }

        let value = serde_json::to_value(pet)?;
        self.store
            .put(&Self::namespace(user_id), &pet_key(pet), value)
            .await?;
        log::info!("Stored pet {:?} for user {}", pet.name, user_id);
        Ok(true)
    }

    /// Delete the first stored record matching `filter`
    pub async fn delete_pet(
        &self,
        user_id: Option<&str>,
        filter: &PetFilter,
    ) -> Result<String, PetopetaError> {
        let Some(user_id) = user_id else {
            return Ok(NO_PET_FOUND.to_string());
        };
        if filter.is_empty() {
            return Ok(NO_PET_FOUND.to_string());
        }

        let pets = self.get_pets(Some(user_id)).await?;
        let Some(found) = pets.iter().find(|pet| filter.matches(pet)) else {
            return Ok(NO_PET_FOUND.to_string());
        };

        self.store
            .delete(&Self::namespace(user_id), &pet_key(found))
            .await?;
        log::info!("Deleted pet {:?} for user {}", found.name, user_id);
        Ok(PET_DELETED.to_string())
    }
}
