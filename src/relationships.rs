use std::{collections::HashMap, sync::Arc};

use tracing::{info, warn};

use crate::{
    error::{CatalogError, Result},
    models::{FirearmModel, ModelCategory, ModelCategoryRelationship},
    store::CatalogStore,
};

/// Per-model membership of categories with a required/optional flag.
#[derive(Clone)]
pub struct RelationshipStore {
    store: Arc<dyn CatalogStore>,
}

impl RelationshipStore {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub fn require_model(&self, firearm_model_id: i64) -> Result<FirearmModel> {
        self.store.firearm_model(firearm_model_id)?.ok_or_else(|| {
            CatalogError::not_found(format!("Firearm model {firearm_model_id} not found"))
        })
    }

    pub fn list_for_model(
        &self,
        firearm_model_id: i64,
        required: Option<bool>,
    ) -> Result<Vec<ModelCategoryRelationship>> {
        self.store.relationships_for_model(firearm_model_id, required)
    }

    /// Strict creation: an existing (model, category) pair is a conflict.
    pub fn add_relationship(
        &self,
        firearm_model_id: i64,
        part_category_id: i64,
        is_required: bool,
    ) -> Result<ModelCategoryRelationship> {
        self.require_model(firearm_model_id)?;
        if self.store.category(part_category_id)?.is_none() {
            return Err(CatalogError::not_found(format!(
                "Part category {part_category_id} not found"
            )));
        }
        if self
            .store
            .relationship(firearm_model_id, part_category_id)?
            .is_some()
        {
            return Err(CatalogError::conflict(
                "This category is already associated with the firearm model",
            ));
        }

        // The pre-check above is best effort; the storage constraint decides
        // when two writers race on the same pair.
        let relationship = self
            .store
            .insert_relationship(firearm_model_id, part_category_id, is_required)
            .map_err(|err| match err {
                CatalogError::Conflict(detail) => {
                    warn!(
                        firearm_model_id,
                        part_category_id, "Lost relationship insert race: {detail}"
                    );
                    CatalogError::conflict(
                        "This category is already associated with the firearm model",
                    )
                }
                other => other,
            })?;

        info!(
            firearm_model_id,
            part_category_id, is_required, "Associated part category with firearm model"
        );
        Ok(relationship)
    }

    /// Flips the flag on an existing relationship; absent pairs are not found.
    pub fn update_relationship(
        &self,
        firearm_model_id: i64,
        part_category_id: i64,
        is_required: bool,
    ) -> Result<ModelCategoryRelationship> {
        self.store
            .set_relationship_required(firearm_model_id, part_category_id, is_required)?
            .ok_or_else(|| CatalogError::not_found("Relationship not found"))
    }

    pub fn remove_relationship(&self, firearm_model_id: i64, part_category_id: i64) -> Result<()> {
        if !self
            .store
            .delete_relationship(firearm_model_id, part_category_id)?
        {
            return Err(CatalogError::not_found("Relationship not found"));
        }
        info!(
            firearm_model_id,
            part_category_id, "Removed part category from firearm model"
        );
        Ok(())
    }

    /// Flat listing: each assigned category joined with its flag, no nesting.
    pub fn list_categories_for_model(
        &self,
        firearm_model_id: i64,
        required: Option<bool>,
    ) -> Result<Vec<ModelCategory>> {
        self.require_model(firearm_model_id)?;
        let relationships = self.list_for_model(firearm_model_id, required)?;
        if relationships.is_empty() {
            return Ok(Vec::new());
        }

        let categories: HashMap<i64, _> = self
            .store
            .categories()?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        Ok(relationships
            .into_iter()
            .filter_map(|rel| {
                categories
                    .get(&rel.part_category_id)
                    .cloned()
                    .map(|category| ModelCategory {
                        category,
                        is_required: rel.is_required,
                    })
            })
            .collect())
    }
}
