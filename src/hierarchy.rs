use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tracing::debug;

use crate::{
    error::{CatalogError, Result},
    models::{Category, HierarchyNode},
    store::CatalogStore,
};

/// Builds the nested, per-model view of assigned categories. Unassigned
/// descendants of an assigned category are included and inherit the nearest
/// resolved flag above them.
#[derive(Clone)]
pub struct HierarchyBuilder {
    store: Arc<dyn CatalogStore>,
}

struct TreeIndex {
    by_id: HashMap<i64, Category>,
    children: HashMap<i64, Vec<i64>>,
}

impl TreeIndex {
    fn new(categories: Vec<Category>) -> Self {
        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        for category in &categories {
            if let Some(parent) = category.parent_category_id {
                children.entry(parent).or_default().push(category.id);
            }
        }
        let by_id: HashMap<i64, Category> = categories.into_iter().map(|c| (c.id, c)).collect();
        for kids in children.values_mut() {
            kids.sort_by(|a, b| by_id[a].name.cmp(&by_id[b].name));
        }
        Self { by_id, children }
    }

    /// True when some ancestor of `id` is in `assigned`.
    fn has_assigned_ancestor(&self, id: i64, assigned: &HashMap<i64, bool>) -> bool {
        let mut seen = HashSet::from([id]);
        let mut cursor = self.by_id.get(&id).and_then(|c| c.parent_category_id);
        while let Some(current) = cursor {
            if assigned.contains_key(&current) {
                return true;
            }
            if !seen.insert(current) {
                return false;
            }
            cursor = self.by_id.get(&current).and_then(|c| c.parent_category_id);
        }
        false
    }
}

impl HierarchyBuilder {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub fn build_hierarchy(
        &self,
        firearm_model_id: i64,
        required: Option<bool>,
    ) -> Result<Vec<HierarchyNode>> {
        if self.store.firearm_model(firearm_model_id)?.is_none() {
            return Err(CatalogError::not_found(format!(
                "Firearm model {firearm_model_id} not found"
            )));
        }

        // Flags resolve against every assignment; the filter only prunes the
        // resolved tree.
        let relationships = self.store.relationships_for_model(firearm_model_id, None)?;
        if relationships.is_empty() {
            return Ok(Vec::new());
        }

        let assigned: HashMap<i64, bool> = relationships
            .iter()
            .map(|rel| (rel.part_category_id, rel.is_required))
            .collect();
        let index = TreeIndex::new(self.store.categories()?);

        let mut roots: Vec<&Category> = assigned
            .keys()
            .filter_map(|id| index.by_id.get(id))
            .filter(|category| !index.has_assigned_ancestor(category.id, &assigned))
            .collect();
        roots.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(
            firearm_model_id,
            assigned = assigned.len(),
            roots = roots.len(),
            required = ?required,
            "Building category hierarchy"
        );

        let mut visiting = HashSet::new();
        let tree: Vec<HierarchyNode> = roots
            .into_iter()
            .map(|root| build_node(root, assigned[&root.id], &index, &assigned, &mut visiting))
            .collect();

        let Some(required) = required else {
            return Ok(tree);
        };
        let mut filtered: Vec<HierarchyNode> = tree
            .into_iter()
            .flat_map(|node| retain_matching(node, required))
            .collect();
        filtered.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(filtered)
    }
}

/// Keeps nodes whose resolved flag equals `required`. A dropped node's
/// matching descendants move up to take its place.
fn retain_matching(mut node: HierarchyNode, required: bool) -> Vec<HierarchyNode> {
    let kept: Vec<HierarchyNode> = std::mem::take(&mut node.children)
        .into_iter()
        .flat_map(|child| retain_matching(child, required))
        .collect();
    if node.is_required == required {
        node.children = kept;
        vec![node]
    } else {
        kept
    }
}

fn build_node(
    category: &Category,
    inherited: bool,
    index: &TreeIndex,
    assigned: &HashMap<i64, bool>,
    visiting: &mut HashSet<i64>,
) -> HierarchyNode {
    let explicit = assigned.get(&category.id).copied();
    let is_required = explicit.unwrap_or(inherited);

    visiting.insert(category.id);
    let children = index
        .children
        .get(&category.id)
        .into_iter()
        .flatten()
        .filter_map(|id| index.by_id.get(id))
        .filter(|child| !visiting.contains(&child.id))
        .collect::<Vec<_>>()
        .into_iter()
        .map(|child| build_node(child, is_required, index, assigned, visiting))
        .collect();
    visiting.remove(&category.id);

    HierarchyNode {
        id: category.id,
        name: category.name.clone(),
        description: category.description.clone(),
        parent_category_id: category.parent_category_id,
        is_required,
        is_assigned: explicit.is_some(),
        children,
    }
}
