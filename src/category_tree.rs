use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tracing::info;

use crate::{
    error::{CatalogError, Result},
    models::{Category, CategoryTreeNode, CategoryUpdate, NewCategory},
    store::CatalogStore,
};

/// The part-category taxonomy: a self-referential tree addressed by id, with
/// children derived from each node's parent reference.
#[derive(Clone)]
pub struct CategoryTree {
    store: Arc<dyn CatalogStore>,
}

impl CategoryTree {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, id: i64) -> Result<Category> {
        self.store
            .category(id)?
            .ok_or_else(|| CatalogError::not_found(format!("Part category {id} not found")))
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<Category>> {
        self.store.category_by_name(name)
    }

    pub fn list(&self) -> Result<Vec<Category>> {
        self.store.categories()
    }

    pub fn get_children(&self, id: i64) -> Result<Vec<Category>> {
        self.store.child_categories(id)
    }

    pub fn get_top_level(&self) -> Result<Vec<Category>> {
        self.store.top_level_categories()
    }

    pub fn create_category(&self, mut new: NewCategory) -> Result<Category> {
        new.name = normalize_name(&new.name)?;

        if let Some(parent) = new.parent_category_id {
            if self.store.category(parent)?.is_none() {
                return Err(CatalogError::validation(format!(
                    "Parent category {parent} does not exist"
                )));
            }
        }
        if let Some(id) = new.id {
            if self.store.category(id)?.is_some() {
                return Err(CatalogError::conflict(format!(
                    "Part category {id} already exists"
                )));
            }
        }
        if self.store.category_by_name(&new.name)?.is_some() {
            return Err(CatalogError::conflict(format!(
                "Part category named '{}' already exists",
                new.name
            )));
        }

        let category = self.store.insert_category(&new)?;
        info!(
            category_id = category.id,
            name = %category.name,
            parent = ?category.parent_category_id,
            "Created part category"
        );
        Ok(category)
    }

    pub fn update_category(&self, id: i64, changes: CategoryUpdate) -> Result<Category> {
        let mut category = self.get(id)?;

        if let Some(name) = changes.name {
            let name = normalize_name(&name)?;
            if let Some(other) = self.store.category_by_name(&name)? {
                if other.id != id {
                    return Err(CatalogError::conflict(format!(
                        "Part category named '{name}' already exists"
                    )));
                }
            }
            category.name = name;
        }
        if let Some(description) = changes.description {
            category.description = description;
        }
        if let Some(parent) = changes.parent_category_id {
            if let Some(parent_id) = parent {
                self.ensure_acyclic(id, parent_id)?;
            }
            category.parent_category_id = parent;
        }

        self.store.save_category(&category)
    }

    /// Rejects attaching `id` under `new_parent` when that parent is missing,
    /// is `id` itself, or already descends from `id`.
    pub fn ensure_acyclic(&self, id: i64, new_parent: i64) -> Result<()> {
        if new_parent == id {
            return Err(CatalogError::validation(format!(
                "Part category {id} cannot be its own parent"
            )));
        }
        if self.store.category(new_parent)?.is_none() {
            return Err(CatalogError::validation(format!(
                "Parent category {new_parent} does not exist"
            )));
        }

        let parents: HashMap<i64, Option<i64>> = self
            .store
            .categories()?
            .into_iter()
            .map(|c| (c.id, c.parent_category_id))
            .collect();

        let mut seen = HashSet::new();
        let mut cursor = Some(new_parent);
        while let Some(current) = cursor {
            if current == id {
                return Err(CatalogError::validation(format!(
                    "Moving part category {id} under {new_parent} would create a cycle"
                )));
            }
            if !seen.insert(current) {
                break;
            }
            cursor = parents.get(&current).copied().flatten();
        }
        Ok(())
    }

    /// Deletion is refused while anything still points at the category:
    /// child categories first, then parts, then model relationships.
    pub fn delete_category(&self, id: i64) -> Result<()> {
        let category = self.get(id)?;

        if self.store.count_child_categories(id)? > 0 {
            return Err(CatalogError::conflict(
                "Cannot delete category with child categories",
            ));
        }
        if self.store.count_parts_in_category(id)? > 0 {
            return Err(CatalogError::conflict(
                "Cannot delete category with associated parts",
            ));
        }
        if self.store.count_relationships_for_category(id)? > 0 {
            return Err(CatalogError::conflict(
                "Cannot delete category associated with firearm models",
            ));
        }

        if !self.store.delete_category(id)? {
            return Err(CatalogError::not_found(format!(
                "Part category {id} not found"
            )));
        }
        info!(category_id = id, name = %category.name, "Deleted part category");
        Ok(())
    }

    /// Nested view rooted at `root`, or the whole forest of top-level
    /// categories when `root` is `None`. Siblings are sorted by name.
    pub fn subtree(&self, root: Option<i64>) -> Result<Vec<CategoryTreeNode>> {
        let mut roots = match root {
            Some(id) => vec![self.get(id)?],
            None => self.get_top_level()?,
        };
        roots.sort_by(|a, b| a.name.cmp(&b.name));

        let mut visiting = HashSet::new();
        roots
            .into_iter()
            .map(|category| self.build_tree_node(category, &mut visiting))
            .collect()
    }

    fn build_tree_node(
        &self,
        category: Category,
        visiting: &mut HashSet<i64>,
    ) -> Result<CategoryTreeNode> {
        visiting.insert(category.id);
        let mut kids = self.get_children(category.id)?;
        kids.sort_by(|a, b| a.name.cmp(&b.name));

        let mut child_categories = Vec::with_capacity(kids.len());
        for kid in kids {
            if visiting.contains(&kid.id) {
                continue;
            }
            child_categories.push(self.build_tree_node(kid, visiting)?);
        }
        visiting.remove(&category.id);

        Ok(CategoryTreeNode {
            category,
            child_categories,
        })
    }
}

fn normalize_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(CatalogError::validation("Category name must not be empty"));
    }
    Ok(name.to_string())
}
