//! Read-only views over the pre-normalization data: the free-text
//! category/subcategory columns on parts and the per-model parts documents.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use tracing::debug;

use crate::{
    error::Result,
    legacy::decode_document,
    models::PartHierarchyItem,
    store::CatalogStore,
};

type Assemblies = BTreeMap<String, BTreeMap<String, BTreeSet<String>>>;

#[derive(Clone)]
pub struct LegacyCatalog {
    store: Arc<dyn CatalogStore>,
}

impl LegacyCatalog {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub fn categories(&self) -> Result<Vec<String>> {
        self.store.legacy_categories()
    }

    pub fn subcategories_by_category(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (category, subcategory) in self.store.legacy_subcategories()? {
            grouped.entry(category).or_default().push(subcategory);
        }
        Ok(grouped)
    }

    pub fn subcategories(&self, category: &str) -> Result<Vec<String>> {
        Ok(self
            .store
            .legacy_subcategories()?
            .into_iter()
            .filter(|(c, _)| c == category)
            .map(|(_, subcategory)| subcategory)
            .collect())
    }

    /// Every model's parts document merged into one assembly > component >
    /// sub-component tree, sorted by name at each level. Legacy part
    /// categories that are not already an assembly follow as bare entries.
    /// Documents that fail to decode are skipped.
    pub fn part_hierarchy(&self) -> Result<Vec<PartHierarchyItem>> {
        let mut assemblies: Assemblies = BTreeMap::new();
        for model in self.store.firearm_models()? {
            let nodes = match decode_document(&model.parts) {
                Ok(nodes) => nodes,
                Err(err) => {
                    debug!(firearm_model_id = model.id, "Skipping parts document: {err}");
                    continue;
                }
            };
            for assembly in nodes {
                let components = assemblies.entry(assembly.name).or_default();
                for component in assembly.children {
                    components
                        .entry(component.name)
                        .or_default()
                        .extend(component.children.into_iter().map(|sub| sub.name));
                }
            }
        }

        let mut items: Vec<PartHierarchyItem> = assemblies
            .into_iter()
            .map(|(assembly, components)| {
                let children = components
                    .into_iter()
                    .map(|(component, subs)| {
                        let children = subs.into_iter().map(|sub| item(sub, Vec::new())).collect();
                        item(component, children)
                    })
                    .collect();
                item(assembly, children)
            })
            .collect();

        for category in self.store.legacy_categories()? {
            if !items.iter().any(|existing| existing.name == category) {
                items.push(item(category, Vec::new()));
            }
        }
        Ok(items)
    }
}

fn item(name: String, children: Vec<PartHierarchyItem>) -> PartHierarchyItem {
    PartHierarchyItem {
        id: slugify(&name),
        name,
        children,
    }
}

/// Lowercase, spaces to hyphens, anything outside `[a-z0-9-]` dropped.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}
