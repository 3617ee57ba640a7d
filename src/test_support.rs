use std::sync::Arc;

use crate::{
    memory_store::MemoryStore,
    models::{FirearmModel, NewCategory, NewFirearmModel},
    sqlite_store::SqliteStore,
    store::CatalogStore,
};

pub fn memory_store() -> Arc<dyn CatalogStore> {
    Arc::new(MemoryStore::new())
}

pub fn sqlite_store() -> Arc<dyn CatalogStore> {
    Arc::new(SqliteStore::open_in_memory().expect("in-memory sqlite"))
}

/// Both backends, so component tests exercise identical behaviour.
pub fn stores() -> Vec<Arc<dyn CatalogStore>> {
    vec![memory_store(), sqlite_store()]
}

pub fn add_category(
    store: &dyn CatalogStore,
    id: i64,
    name: &str,
    parent: Option<i64>,
) -> crate::models::Category {
    store
        .insert_category(&NewCategory {
            id: Some(id),
            name: name.to_string(),
            parent_category_id: parent,
            description: String::new(),
        })
        .expect("insert category")
}

/// Lower Assembly (1) > Grip (3) > Grip Screw (15).
pub fn seed_grip_chain(store: &dyn CatalogStore) {
    add_category(store, 1, "Lower Assembly", None);
    add_category(store, 3, "Grip", Some(1));
    add_category(store, 15, "Grip Screw", Some(3));
}

pub fn add_model(
    store: &dyn CatalogStore,
    name: &str,
    parts: &str,
    compatible: Option<&str>,
) -> FirearmModel {
    store
        .insert_firearm_model(&NewFirearmModel {
            name: name.to_string(),
            description: String::new(),
            parts: parts.to_string(),
            compatible_parts: compatible.map(ToString::to_string),
        })
        .expect("insert firearm model")
}
