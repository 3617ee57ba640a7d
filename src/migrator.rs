use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    category_tree::CategoryTree,
    error::{CatalogError, Result},
    legacy::{decode_document, decode_optional_document, LegacyNode},
    models::{FirearmModel, Part},
    store::CatalogStore,
    taxonomy::seed_categories,
};

/// Outcome of linking one firearm model's legacy documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelMigration {
    pub firearm_model_id: i64,
    pub created: usize,
    pub existing: usize,
    /// Category names from the documents with no matching category.
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedField {
    Subcategory,
    Category,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PartMigration {
    AlreadyCategorized {
        part_category_id: Option<i64>,
    },
    Assigned {
        part_category_id: i64,
        matched_on: MatchedField,
    },
    Unmatched,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub seeded_categories: usize,
    pub parts_examined: usize,
    pub parts_assigned: usize,
    pub parts_unmatched: usize,
    pub parts_failed: usize,
    pub models_examined: usize,
    pub models_migrated: usize,
    pub models_failed: usize,
    pub relationships_created: usize,
}

/// Moves legacy per-model documents and free-text part categories onto the
/// relational category tree. Every step checks before it writes, so the whole
/// run can be repeated on each start.
#[derive(Clone)]
pub struct Migrator {
    store: Arc<dyn CatalogStore>,
    tree: CategoryTree,
}

impl Migrator {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            tree: CategoryTree::new(store.clone()),
            store,
        }
    }

    /// Seeds the fixed taxonomy when the category table is empty, then
    /// back-fills uncategorized parts and links models that have no
    /// relationships yet. Per-entity failures are logged and skipped.
    pub fn migrate_schema(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();

        if self.store.count_categories()? == 0 {
            info!("No part categories found, seeding taxonomy");
            report.seeded_categories = self.seed_taxonomy()?;
        }

        for part in self.store.uncategorized_parts()? {
            report.parts_examined += 1;
            match self.migrate_part_category(&part) {
                Ok(PartMigration::Assigned { .. }) => report.parts_assigned += 1,
                Ok(PartMigration::Unmatched) => report.parts_unmatched += 1,
                Ok(PartMigration::AlreadyCategorized { .. }) => {}
                Err(err) => {
                    error!(part_id = part.id, "Failed migrating part category: {err}");
                    report.parts_failed += 1;
                }
            }
        }

        for model in self.store.firearm_models_without_relationships()? {
            report.models_examined += 1;
            match self.migrate_model_categories(&model) {
                Ok(outcome) => {
                    report.models_migrated += 1;
                    report.relationships_created += outcome.created;
                }
                Err(err @ CatalogError::Parse(_)) => {
                    warn!(
                        firearm_model_id = model.id,
                        model = %model.name,
                        "Skipping firearm model: {err}"
                    );
                    report.models_failed += 1;
                }
                Err(err) => {
                    error!(
                        firearm_model_id = model.id,
                        model = %model.name,
                        "Failed migrating firearm model categories: {err}"
                    );
                    report.models_failed += 1;
                }
            }
        }

        info!(
            seeded = report.seeded_categories,
            parts_assigned = report.parts_assigned,
            parts_unmatched = report.parts_unmatched,
            models_migrated = report.models_migrated,
            models_failed = report.models_failed,
            relationships_created = report.relationships_created,
            "Category migration finished"
        );
        Ok(report)
    }

    /// Inserts every seed category whose id is not present yet.
    pub fn seed_taxonomy(&self) -> Result<usize> {
        let mut created = 0;
        for category in seed_categories() {
            let Some(id) = category.id else {
                continue;
            };
            if self.store.category(id)?.is_some() {
                debug!(category_id = id, name = %category.name, "Part category already exists");
                continue;
            }
            match self.store.insert_category(&category) {
                Ok(_) => {
                    info!(category_id = id, name = %category.name, "Created part category");
                    created += 1;
                }
                Err(CatalogError::Conflict(detail)) => {
                    warn!(
                        category_id = id,
                        name = %category.name,
                        "Skipping seed category: {detail}"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(created)
    }

    /// Links a model to every category named in its legacy documents: the
    /// parts document as required, the compatible-parts document as optional.
    /// Existing pairs are left untouched, so a category named in both keeps
    /// the flag from the parts document.
    pub fn migrate_model_categories(&self, model: &FirearmModel) -> Result<ModelMigration> {
        info!(firearm_model_id = model.id, model = %model.name, "Migrating categories for firearm model");

        let required = decode_document(&model.parts)?;
        let optional = decode_optional_document(model.compatible_parts.as_deref())?;

        let mut outcome = ModelMigration {
            firearm_model_id: model.id,
            ..Default::default()
        };
        self.link_nodes(model, &required, true, &mut outcome)?;
        self.link_nodes(model, &optional, false, &mut outcome)?;
        Ok(outcome)
    }

    fn link_nodes(
        &self,
        model: &FirearmModel,
        nodes: &[LegacyNode],
        is_required: bool,
        outcome: &mut ModelMigration,
    ) -> Result<()> {
        let mut names = Vec::new();
        for node in nodes {
            node.walk(&mut |n| names.push(n.name.as_str()));
        }
        for name in names {
            self.link_category(model, name, is_required, outcome)?;
        }
        Ok(())
    }

    fn link_category(
        &self,
        model: &FirearmModel,
        name: &str,
        is_required: bool,
        outcome: &mut ModelMigration,
    ) -> Result<()> {
        let Some(category) = self.tree.find_by_name(name)? else {
            debug!(firearm_model_id = model.id, category = %name, "Category not found");
            if !outcome.missing.iter().any(|m| m == name) {
                outcome.missing.push(name.to_string());
            }
            return Ok(());
        };

        if self.store.relationship(model.id, category.id)?.is_some() {
            outcome.existing += 1;
            return Ok(());
        }

        match self
            .store
            .insert_relationship(model.id, category.id, is_required)
        {
            Ok(_) => {
                info!(
                    firearm_model_id = model.id,
                    category_id = category.id,
                    category = %category.name,
                    is_required,
                    "Created model category relationship"
                );
                outcome.created += 1;
            }
            Err(CatalogError::Conflict(_)) => outcome.existing += 1,
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Points an uncategorized part at the category named by its legacy
    /// subcategory, falling back to its legacy category. Parts that already
    /// have a category are never changed.
    pub fn migrate_part_category(&self, part: &Part) -> Result<PartMigration> {
        if part.part_category_id.is_some() {
            return Ok(PartMigration::AlreadyCategorized {
                part_category_id: part.part_category_id,
            });
        }

        let candidates = [
            (MatchedField::Subcategory, part.subcategory.as_str()),
            (MatchedField::Category, part.category.as_str()),
        ];
        for (field, name) in candidates {
            if name.is_empty() {
                continue;
            }
            let Some(category) = self.tree.find_by_name(name)? else {
                continue;
            };

            if !self.store.assign_part_category(part.id, category.id)? {
                let current = self.store.part(part.id)?.and_then(|p| p.part_category_id);
                return Ok(PartMigration::AlreadyCategorized {
                    part_category_id: current,
                });
            }
            info!(
                part_id = part.id,
                part = %part.name,
                category_id = category.id,
                matched_on = ?field,
                "Associated part with category"
            );
            return Ok(PartMigration::Assigned {
                part_category_id: category.id,
                matched_on: field,
            });
        }

        info!(
            part_id = part.id,
            part = %part.name,
            category = %part.category,
            subcategory = %part.subcategory,
            "No matching category found for part"
        );
        Ok(PartMigration::Unmatched)
    }
}
