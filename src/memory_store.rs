//! In-process [`CatalogStore`] backed by ordered maps.
//!
//! Mirrors the constraints of the SQLite schema so components behave the same
//! against either backend.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, MutexGuard},
};

use chrono::Utc;

use crate::{
    error::{CatalogError, Result},
    models::{
        Category, FirearmModel, ModelCategoryRelationship, NewCategory, NewFirearmModel, NewPart,
        Part,
    },
    store::CatalogStore,
};

#[derive(Debug, Default)]
struct MemoryState {
    categories: BTreeMap<i64, Category>,
    relationships: BTreeMap<(i64, i64), ModelCategoryRelationship>,
    parts: BTreeMap<i64, Part>,
    models: BTreeMap<i64, FirearmModel>,
    next_relationship_id: i64,
}

impl MemoryState {
    fn next_id<T>(map: &BTreeMap<i64, T>) -> i64 {
        map.keys().next_back().map(|id| id + 1).unwrap_or(1)
    }

    fn ensure_category(&self, id: i64) -> Result<()> {
        if self.categories.contains_key(&id) {
            Ok(())
        } else {
            Err(CatalogError::conflict(format!(
                "FOREIGN KEY constraint failed: part category {id}"
            )))
        }
    }

    fn ensure_unique_name(&self, name: &str, except: Option<i64>) -> Result<()> {
        let taken = self
            .categories
            .values()
            .any(|c| c.name == name && Some(c.id) != except);
        if taken {
            return Err(CatalogError::conflict(format!(
                "UNIQUE constraint failed: part_categories.name ({name})"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| CatalogError::Internal("memory store lock poisoned".to_string()))
    }
}

impl CatalogStore for MemoryStore {
    fn insert_category(&self, new: &NewCategory) -> Result<Category> {
        let mut state = self.state()?;
        let id = new
            .id
            .unwrap_or_else(|| MemoryState::next_id(&state.categories));
        if state.categories.contains_key(&id) {
            return Err(CatalogError::conflict(format!(
                "UNIQUE constraint failed: part_categories.id ({id})"
            )));
        }
        state.ensure_unique_name(&new.name, None)?;
        if let Some(parent) = new.parent_category_id {
            state.ensure_category(parent)?;
        }

        let now = Utc::now();
        let category = Category {
            id,
            name: new.name.clone(),
            parent_category_id: new.parent_category_id,
            description: new.description.clone(),
            created_at: now,
            updated_at: now,
        };
        state.categories.insert(id, category.clone());
        Ok(category)
    }

    fn category(&self, id: i64) -> Result<Option<Category>> {
        Ok(self.state()?.categories.get(&id).cloned())
    }

    fn category_by_name(&self, name: &str) -> Result<Option<Category>> {
        Ok(self
            .state()?
            .categories
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.state()?.categories.values().cloned().collect())
    }

    fn child_categories(&self, parent_id: i64) -> Result<Vec<Category>> {
        Ok(self
            .state()?
            .categories
            .values()
            .filter(|c| c.parent_category_id == Some(parent_id))
            .cloned()
            .collect())
    }

    fn top_level_categories(&self) -> Result<Vec<Category>> {
        Ok(self
            .state()?
            .categories
            .values()
            .filter(|c| c.parent_category_id.is_none())
            .cloned()
            .collect())
    }

    fn save_category(&self, category: &Category) -> Result<Category> {
        let mut state = self.state()?;
        if !state.categories.contains_key(&category.id) {
            return Err(CatalogError::not_found(format!(
                "Part category {} not found",
                category.id
            )));
        }
        state.ensure_unique_name(&category.name, Some(category.id))?;
        if let Some(parent) = category.parent_category_id {
            state.ensure_category(parent)?;
        }

        let Some(stored) = state.categories.get_mut(&category.id) else {
            return Err(CatalogError::Internal("category vanished".to_string()));
        };
        stored.name = category.name.clone();
        stored.parent_category_id = category.parent_category_id;
        stored.description = category.description.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    fn delete_category(&self, id: i64) -> Result<bool> {
        let mut state = self.state()?;
        let referenced = state
            .categories
            .values()
            .any(|c| c.parent_category_id == Some(id))
            || state.parts.values().any(|p| p.part_category_id == Some(id))
            || state.relationships.keys().any(|(_, cat)| *cat == id);
        if referenced {
            return Err(CatalogError::conflict(format!(
                "FOREIGN KEY constraint failed: part category {id} is referenced"
            )));
        }
        Ok(state.categories.remove(&id).is_some())
    }

    fn count_categories(&self) -> Result<u64> {
        Ok(self.state()?.categories.len() as u64)
    }

    fn count_child_categories(&self, id: i64) -> Result<u64> {
        Ok(self
            .state()?
            .categories
            .values()
            .filter(|c| c.parent_category_id == Some(id))
            .count() as u64)
    }

    fn count_parts_in_category(&self, id: i64) -> Result<u64> {
        Ok(self
            .state()?
            .parts
            .values()
            .filter(|p| p.part_category_id == Some(id))
            .count() as u64)
    }

    fn count_relationships_for_category(&self, id: i64) -> Result<u64> {
        Ok(self
            .state()?
            .relationships
            .keys()
            .filter(|(_, cat)| *cat == id)
            .count() as u64)
    }

    fn insert_relationship(
        &self,
        firearm_model_id: i64,
        part_category_id: i64,
        is_required: bool,
    ) -> Result<ModelCategoryRelationship> {
        let mut state = self.state()?;
        if !state.models.contains_key(&firearm_model_id) {
            return Err(CatalogError::conflict(format!(
                "FOREIGN KEY constraint failed: firearm model {firearm_model_id}"
            )));
        }
        state.ensure_category(part_category_id)?;
        let key = (firearm_model_id, part_category_id);
        if state.relationships.contains_key(&key) {
            return Err(CatalogError::conflict(
                "UNIQUE constraint failed: firearm_model_part_categories.firearm_model_id, firearm_model_part_categories.part_category_id",
            ));
        }

        state.next_relationship_id += 1;
        let relationship = ModelCategoryRelationship {
            id: state.next_relationship_id,
            firearm_model_id,
            part_category_id,
            is_required,
            created_at: Utc::now(),
        };
        state.relationships.insert(key, relationship.clone());
        Ok(relationship)
    }

    fn relationship(
        &self,
        firearm_model_id: i64,
        part_category_id: i64,
    ) -> Result<Option<ModelCategoryRelationship>> {
        Ok(self
            .state()?
            .relationships
            .get(&(firearm_model_id, part_category_id))
            .cloned())
    }

    fn relationships_for_model(
        &self,
        firearm_model_id: i64,
        required: Option<bool>,
    ) -> Result<Vec<ModelCategoryRelationship>> {
        Ok(self
            .state()?
            .relationships
            .range((firearm_model_id, i64::MIN)..=(firearm_model_id, i64::MAX))
            .map(|(_, rel)| rel)
            .filter(|rel| required.map_or(true, |flag| rel.is_required == flag))
            .cloned()
            .collect())
    }

    fn set_relationship_required(
        &self,
        firearm_model_id: i64,
        part_category_id: i64,
        is_required: bool,
    ) -> Result<Option<ModelCategoryRelationship>> {
        let mut state = self.state()?;
        Ok(state
            .relationships
            .get_mut(&(firearm_model_id, part_category_id))
            .map(|rel| {
                rel.is_required = is_required;
                rel.clone()
            }))
    }

    fn delete_relationship(&self, firearm_model_id: i64, part_category_id: i64) -> Result<bool> {
        Ok(self
            .state()?
            .relationships
            .remove(&(firearm_model_id, part_category_id))
            .is_some())
    }

    fn insert_part(&self, new: &NewPart) -> Result<Part> {
        let mut state = self.state()?;
        if let Some(category) = new.part_category_id {
            state.ensure_category(category)?;
        }
        let id = MemoryState::next_id(&state.parts);
        let now = Utc::now();
        let part = Part {
            id,
            name: new.name.clone(),
            category: new.category.clone(),
            subcategory: new.subcategory.clone(),
            part_category_id: new.part_category_id,
            created_at: now,
            updated_at: now,
        };
        state.parts.insert(id, part.clone());
        Ok(part)
    }

    fn part(&self, id: i64) -> Result<Option<Part>> {
        Ok(self.state()?.parts.get(&id).cloned())
    }

    fn parts(&self, part_category_id: Option<i64>) -> Result<Vec<Part>> {
        Ok(self
            .state()?
            .parts
            .values()
            .filter(|p| part_category_id.map_or(true, |id| p.part_category_id == Some(id)))
            .cloned()
            .collect())
    }

    fn uncategorized_parts(&self) -> Result<Vec<Part>> {
        Ok(self
            .state()?
            .parts
            .values()
            .filter(|p| p.part_category_id.is_none())
            .cloned()
            .collect())
    }

    fn assign_part_category(&self, part_id: i64, part_category_id: i64) -> Result<bool> {
        let mut state = self.state()?;
        state.ensure_category(part_category_id)?;
        match state.parts.get_mut(&part_id) {
            Some(part) if part.part_category_id.is_none() => {
                part.part_category_id = Some(part_category_id);
                part.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn legacy_categories(&self) -> Result<Vec<String>> {
        let categories: BTreeSet<String> = self
            .state()?
            .parts
            .values()
            .filter(|p| !p.category.is_empty())
            .map(|p| p.category.clone())
            .collect();
        Ok(categories.into_iter().collect())
    }

    fn legacy_subcategories(&self) -> Result<Vec<(String, String)>> {
        let pairs: BTreeSet<(String, String)> = self
            .state()?
            .parts
            .values()
            .filter(|p| !p.category.is_empty() && !p.subcategory.is_empty())
            .map(|p| (p.category.clone(), p.subcategory.clone()))
            .collect();
        Ok(pairs.into_iter().collect())
    }

    fn insert_firearm_model(&self, new: &NewFirearmModel) -> Result<FirearmModel> {
        let mut state = self.state()?;
        let id = MemoryState::next_id(&state.models);
        let model = FirearmModel {
            id,
            name: new.name.clone(),
            description: new.description.clone(),
            parts: new.parts.clone(),
            compatible_parts: new.compatible_parts.clone(),
            created_at: Utc::now(),
        };
        state.models.insert(id, model.clone());
        Ok(model)
    }

    fn firearm_model(&self, id: i64) -> Result<Option<FirearmModel>> {
        Ok(self.state()?.models.get(&id).cloned())
    }

    fn firearm_models(&self) -> Result<Vec<FirearmModel>> {
        Ok(self.state()?.models.values().cloned().collect())
    }

    fn firearm_models_without_relationships(&self) -> Result<Vec<FirearmModel>> {
        let state = self.state()?;
        Ok(state
            .models
            .values()
            .filter(|m| {
                state
                    .relationships
                    .range((m.id, i64::MIN)..=(m.id, i64::MAX))
                    .next()
                    .is_none()
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforces_unique_names_and_parent_references() {
        let store = MemoryStore::new();
        store
            .insert_category(&NewCategory {
                name: "Grip".into(),
                ..Default::default()
            })
            .unwrap();

        let dup = store.insert_category(&NewCategory {
            name: "Grip".into(),
            ..Default::default()
        });
        assert!(matches!(dup, Err(CatalogError::Conflict(_))));

        let orphan = store.insert_category(&NewCategory {
            name: "Grip Screw".into(),
            parent_category_id: Some(42),
            ..Default::default()
        });
        assert!(matches!(orphan, Err(CatalogError::Conflict(_))));
    }

    #[test]
    fn relationships_are_scoped_per_model() {
        let store = MemoryStore::new();
        let cat = store
            .insert_category(&NewCategory {
                name: "Barrel".into(),
                ..Default::default()
            })
            .unwrap();
        let a = store
            .insert_firearm_model(&NewFirearmModel {
                name: "AR-15".into(),
                ..Default::default()
            })
            .unwrap();
        let b = store
            .insert_firearm_model(&NewFirearmModel {
                name: "AR-10".into(),
                ..Default::default()
            })
            .unwrap();

        store.insert_relationship(a.id, cat.id, true).unwrap();
        assert_eq!(store.relationships_for_model(a.id, None).unwrap().len(), 1);
        assert!(store.relationships_for_model(b.id, None).unwrap().is_empty());
        assert_eq!(
            store.firearm_models_without_relationships().unwrap()[0].id,
            b.id
        );
    }
}
