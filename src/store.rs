//! Storage seam for the catalog.
//!
//! Every component receives an `Arc<dyn CatalogStore>` at construction time.
//! Implementations must enforce the same rules the relational schema does:
//! unique category names, at most one relationship per (model, category)
//! pair, and parent/part/relationship references that resolve. Violations are
//! reported as [`CatalogError::Conflict`](crate::error::CatalogError).

use crate::{
    error::Result,
    models::{
        Category, FirearmModel, ModelCategoryRelationship, NewCategory, NewFirearmModel, NewPart,
        Part,
    },
};

pub trait CatalogStore: Send + Sync {
    fn insert_category(&self, new: &NewCategory) -> Result<Category>;
    fn category(&self, id: i64) -> Result<Option<Category>>;
    fn category_by_name(&self, name: &str) -> Result<Option<Category>>;
    /// All categories ordered by identifier.
    fn categories(&self) -> Result<Vec<Category>>;
    fn child_categories(&self, parent_id: i64) -> Result<Vec<Category>>;
    fn top_level_categories(&self) -> Result<Vec<Category>>;
    /// Persists name, parent and description; refreshes `updated_at`.
    fn save_category(&self, category: &Category) -> Result<Category>;
    fn delete_category(&self, id: i64) -> Result<bool>;
    fn count_categories(&self) -> Result<u64>;
    fn count_child_categories(&self, id: i64) -> Result<u64>;
    fn count_parts_in_category(&self, id: i64) -> Result<u64>;
    fn count_relationships_for_category(&self, id: i64) -> Result<u64>;

    fn insert_relationship(
        &self,
        firearm_model_id: i64,
        part_category_id: i64,
        is_required: bool,
    ) -> Result<ModelCategoryRelationship>;
    fn relationship(
        &self,
        firearm_model_id: i64,
        part_category_id: i64,
    ) -> Result<Option<ModelCategoryRelationship>>;
    fn relationships_for_model(
        &self,
        firearm_model_id: i64,
        required: Option<bool>,
    ) -> Result<Vec<ModelCategoryRelationship>>;
    fn set_relationship_required(
        &self,
        firearm_model_id: i64,
        part_category_id: i64,
        is_required: bool,
    ) -> Result<Option<ModelCategoryRelationship>>;
    fn delete_relationship(&self, firearm_model_id: i64, part_category_id: i64) -> Result<bool>;

    fn insert_part(&self, new: &NewPart) -> Result<Part>;
    fn part(&self, id: i64) -> Result<Option<Part>>;
    fn parts(&self, part_category_id: Option<i64>) -> Result<Vec<Part>>;
    fn uncategorized_parts(&self) -> Result<Vec<Part>>;
    /// Sets the category only if the part has none yet. Returns whether the
    /// row changed.
    fn assign_part_category(&self, part_id: i64, part_category_id: i64) -> Result<bool>;
    /// Distinct non-empty legacy `category` texts, sorted.
    fn legacy_categories(&self) -> Result<Vec<String>>;
    /// Distinct `(category, subcategory)` text pairs with both sides
    /// non-empty, sorted by category then subcategory.
    fn legacy_subcategories(&self) -> Result<Vec<(String, String)>>;

    fn insert_firearm_model(&self, new: &NewFirearmModel) -> Result<FirearmModel>;
    fn firearm_model(&self, id: i64) -> Result<Option<FirearmModel>>;
    fn firearm_models(&self) -> Result<Vec<FirearmModel>>;
    fn firearm_models_without_relationships(&self) -> Result<Vec<FirearmModel>>;
}
