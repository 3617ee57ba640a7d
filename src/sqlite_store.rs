use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::{
    error::{CatalogError, Result},
    models::{
        Category, FirearmModel, ModelCategoryRelationship, NewCategory, NewFirearmModel, NewPart,
        Part,
    },
    store::CatalogStore,
};

const CATEGORY_COLUMNS: &str = "id,name,parent_category_id,description,created_at,updated_at";
const RELATIONSHIP_COLUMNS: &str = "id,firearm_model_id,part_category_id,is_required,created_at";
const PART_COLUMNS: &str = "id,name,category,subcategory,part_category_id,created_at,updated_at";
const MODEL_COLUMNS: &str = "id,name,description,parts,compatible_parts,created_at";

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    CREATE TABLE IF NOT EXISTS part_categories (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        parent_category_id INTEGER REFERENCES part_categories(id),
        description TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS firearm_models (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        parts TEXT NOT NULL DEFAULT '{}',
        compatible_parts TEXT,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS parts (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        category TEXT NOT NULL DEFAULT '',
        subcategory TEXT NOT NULL DEFAULT '',
        part_category_id INTEGER REFERENCES part_categories(id),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS firearm_model_part_categories (
        id INTEGER PRIMARY KEY,
        firearm_model_id INTEGER NOT NULL REFERENCES firearm_models(id) ON DELETE CASCADE,
        part_category_id INTEGER NOT NULL REFERENCES part_categories(id),
        is_required INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        CONSTRAINT unique_model_category UNIQUE (firearm_model_id, part_category_id)
    );
    CREATE INDEX IF NOT EXISTS idx_part_categories_parent ON part_categories(parent_category_id);
    CREATE INDEX IF NOT EXISTS idx_firearm_model_part_categories_model ON firearm_model_part_categories(firearm_model_id);
    CREATE INDEX IF NOT EXISTS idx_firearm_model_part_categories_category ON firearm_model_part_categories(part_category_id);
    CREATE INDEX IF NOT EXISTS idx_parts_category ON parts(part_category_id);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened catalog database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CatalogError::Internal("catalog connection lock poisoned".to_string()))
    }
}

fn now_text() -> String {
    Utc::now().to_rfc3339()
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|v| v.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        parent_category_id: row.get(2)?,
        description: row.get(3)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn relationship_from_row(row: &Row<'_>) -> rusqlite::Result<ModelCategoryRelationship> {
    let created_at: String = row.get(4)?;
    Ok(ModelCategoryRelationship {
        id: row.get(0)?,
        firearm_model_id: row.get(1)?,
        part_category_id: row.get(2)?,
        is_required: row.get(3)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn part_from_row(row: &Row<'_>) -> rusqlite::Result<Part> {
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(Part {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        subcategory: row.get(3)?,
        part_category_id: row.get(4)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn model_from_row(row: &Row<'_>) -> rusqlite::Result<FirearmModel> {
    let created_at: String = row.get(5)?;
    Ok(FirearmModel {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        parts: row.get(3)?,
        compatible_parts: row.get(4)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn query_categories(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, category_from_row)?;
    let mut categories = Vec::new();
    for row in rows {
        categories.push(row?);
    }
    Ok(categories)
}

fn query_parts(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Part>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, part_from_row)?;
    let mut parts = Vec::new();
    for row in rows {
        parts.push(row?);
    }
    Ok(parts)
}

fn query_models(conn: &Connection, sql: &str) -> Result<Vec<FirearmModel>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], model_from_row)?;
    let mut models = Vec::new();
    for row in rows {
        models.push(row?);
    }
    Ok(models)
}

fn count(conn: &Connection, sql: &str, id: i64) -> Result<u64> {
    let value: i64 = conn.query_row(sql, params![id], |row| row.get(0))?;
    Ok(value.max(0) as u64)
}

fn load_category(conn: &Connection, id: i64) -> Result<Option<Category>> {
    Ok(conn
        .query_row(
            &format!("SELECT {CATEGORY_COLUMNS} FROM part_categories WHERE id=?1"),
            params![id],
            category_from_row,
        )
        .optional()?)
}

fn load_relationship(
    conn: &Connection,
    firearm_model_id: i64,
    part_category_id: i64,
) -> Result<Option<ModelCategoryRelationship>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {RELATIONSHIP_COLUMNS} FROM firearm_model_part_categories WHERE firearm_model_id=?1 AND part_category_id=?2"
            ),
            params![firearm_model_id, part_category_id],
            relationship_from_row,
        )
        .optional()?)
}

fn load_part(conn: &Connection, id: i64) -> Result<Option<Part>> {
    Ok(conn
        .query_row(
            &format!("SELECT {PART_COLUMNS} FROM parts WHERE id=?1"),
            params![id],
            part_from_row,
        )
        .optional()?)
}

fn load_model(conn: &Connection, id: i64) -> Result<Option<FirearmModel>> {
    Ok(conn
        .query_row(
            &format!("SELECT {MODEL_COLUMNS} FROM firearm_models WHERE id=?1"),
            params![id],
            model_from_row,
        )
        .optional()?)
}

fn inserted<T>(row: Option<T>, what: &str) -> Result<T> {
    row.ok_or_else(|| CatalogError::Internal(format!("{what} vanished after insert")))
}

impl CatalogStore for SqliteStore {
    fn insert_category(&self, new: &NewCategory) -> Result<Category> {
        let conn = self.conn()?;
        let now = now_text();
        conn.execute(
            "INSERT INTO part_categories(id,name,parent_category_id,description,created_at,updated_at) VALUES(?1,?2,?3,?4,?5,?5)",
            params![new.id, new.name, new.parent_category_id, new.description, now],
        )?;
        let id = conn.last_insert_rowid();
        inserted(load_category(&conn, id)?, "category")
    }

    fn category(&self, id: i64) -> Result<Option<Category>> {
        let conn = self.conn()?;
        load_category(&conn, id)
    }

    fn category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM part_categories WHERE name=?1"),
                params![name],
                category_from_row,
            )
            .optional()?)
    }

    fn categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        query_categories(
            &conn,
            &format!("SELECT {CATEGORY_COLUMNS} FROM part_categories ORDER BY id"),
            params![],
        )
    }

    fn child_categories(&self, parent_id: i64) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        query_categories(
            &conn,
            &format!(
                "SELECT {CATEGORY_COLUMNS} FROM part_categories WHERE parent_category_id=?1 ORDER BY id"
            ),
            params![parent_id],
        )
    }

    fn top_level_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        query_categories(
            &conn,
            &format!(
                "SELECT {CATEGORY_COLUMNS} FROM part_categories WHERE parent_category_id IS NULL ORDER BY id"
            ),
            params![],
        )
    }

    fn save_category(&self, category: &Category) -> Result<Category> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE part_categories SET name=?2, parent_category_id=?3, description=?4, updated_at=?5 WHERE id=?1",
            params![
                category.id,
                category.name,
                category.parent_category_id,
                category.description,
                now_text()
            ],
        )?;
        if changed == 0 {
            return Err(CatalogError::not_found(format!(
                "Part category {} not found",
                category.id
            )));
        }
        inserted(load_category(&conn, category.id)?, "category")
    }

    fn delete_category(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM part_categories WHERE id=?1", params![id])?;
        Ok(changed > 0)
    }

    fn count_categories(&self) -> Result<u64> {
        let conn = self.conn()?;
        let value: i64 =
            conn.query_row("SELECT COUNT(*) FROM part_categories", [], |row| row.get(0))?;
        Ok(value.max(0) as u64)
    }

    fn count_child_categories(&self, id: i64) -> Result<u64> {
        let conn = self.conn()?;
        count(
            &conn,
            "SELECT COUNT(*) FROM part_categories WHERE parent_category_id=?1",
            id,
        )
    }

    fn count_parts_in_category(&self, id: i64) -> Result<u64> {
        let conn = self.conn()?;
        count(
            &conn,
            "SELECT COUNT(*) FROM parts WHERE part_category_id=?1",
            id,
        )
    }

    fn count_relationships_for_category(&self, id: i64) -> Result<u64> {
        let conn = self.conn()?;
        count(
            &conn,
            "SELECT COUNT(*) FROM firearm_model_part_categories WHERE part_category_id=?1",
            id,
        )
    }

    fn insert_relationship(
        &self,
        firearm_model_id: i64,
        part_category_id: i64,
        is_required: bool,
    ) -> Result<ModelCategoryRelationship> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO firearm_model_part_categories(firearm_model_id,part_category_id,is_required,created_at) VALUES(?1,?2,?3,?4)",
            params![firearm_model_id, part_category_id, is_required, now_text()],
        )?;
        inserted(
            load_relationship(&conn, firearm_model_id, part_category_id)?,
            "relationship",
        )
    }

    fn relationship(
        &self,
        firearm_model_id: i64,
        part_category_id: i64,
    ) -> Result<Option<ModelCategoryRelationship>> {
        let conn = self.conn()?;
        load_relationship(&conn, firearm_model_id, part_category_id)
    }

    fn relationships_for_model(
        &self,
        firearm_model_id: i64,
        required: Option<bool>,
    ) -> Result<Vec<ModelCategoryRelationship>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM firearm_model_part_categories WHERE firearm_model_id=?1 AND (?2 IS NULL OR is_required=?2) ORDER BY part_category_id"
        ))?;
        let rows = stmt.query_map(params![firearm_model_id, required], relationship_from_row)?;
        let mut relationships = Vec::new();
        for row in rows {
            relationships.push(row?);
        }
        Ok(relationships)
    }

    fn set_relationship_required(
        &self,
        firearm_model_id: i64,
        part_category_id: i64,
        is_required: bool,
    ) -> Result<Option<ModelCategoryRelationship>> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE firearm_model_part_categories SET is_required=?3 WHERE firearm_model_id=?1 AND part_category_id=?2",
            params![firearm_model_id, part_category_id, is_required],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        load_relationship(&conn, firearm_model_id, part_category_id)
    }

    fn delete_relationship(&self, firearm_model_id: i64, part_category_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM firearm_model_part_categories WHERE firearm_model_id=?1 AND part_category_id=?2",
            params![firearm_model_id, part_category_id],
        )?;
        Ok(changed > 0)
    }

    fn insert_part(&self, new: &NewPart) -> Result<Part> {
        let conn = self.conn()?;
        let now = now_text();
        conn.execute(
            "INSERT INTO parts(name,category,subcategory,part_category_id,created_at,updated_at) VALUES(?1,?2,?3,?4,?5,?5)",
            params![new.name, new.category, new.subcategory, new.part_category_id, now],
        )?;
        let id = conn.last_insert_rowid();
        inserted(load_part(&conn, id)?, "part")
    }

    fn part(&self, id: i64) -> Result<Option<Part>> {
        let conn = self.conn()?;
        load_part(&conn, id)
    }

    fn parts(&self, part_category_id: Option<i64>) -> Result<Vec<Part>> {
        let conn = self.conn()?;
        query_parts(
            &conn,
            &format!(
                "SELECT {PART_COLUMNS} FROM parts WHERE (?1 IS NULL OR part_category_id=?1) ORDER BY id"
            ),
            params![part_category_id],
        )
    }

    fn uncategorized_parts(&self) -> Result<Vec<Part>> {
        let conn = self.conn()?;
        query_parts(
            &conn,
            &format!("SELECT {PART_COLUMNS} FROM parts WHERE part_category_id IS NULL ORDER BY id"),
            params![],
        )
    }

    fn assign_part_category(&self, part_id: i64, part_category_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE parts SET part_category_id=?2, updated_at=?3 WHERE id=?1 AND part_category_id IS NULL",
            params![part_id, part_category_id, now_text()],
        )?;
        Ok(changed > 0)
    }

    fn legacy_categories(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT category FROM parts WHERE category != '' ORDER BY category",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }
        Ok(categories)
    }

    fn legacy_subcategories(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT category, subcategory FROM parts WHERE category != '' AND subcategory != '' GROUP BY category, subcategory ORDER BY category, subcategory",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row?);
        }
        Ok(pairs)
    }

    fn insert_firearm_model(&self, new: &NewFirearmModel) -> Result<FirearmModel> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO firearm_models(name,description,parts,compatible_parts,created_at) VALUES(?1,?2,?3,?4,?5)",
            params![
                new.name,
                new.description,
                new.parts,
                new.compatible_parts,
                now_text()
            ],
        )?;
        let id = conn.last_insert_rowid();
        inserted(load_model(&conn, id)?, "firearm model")
    }

    fn firearm_model(&self, id: i64) -> Result<Option<FirearmModel>> {
        let conn = self.conn()?;
        load_model(&conn, id)
    }

    fn firearm_models(&self) -> Result<Vec<FirearmModel>> {
        let conn = self.conn()?;
        query_models(
            &conn,
            &format!("SELECT {MODEL_COLUMNS} FROM firearm_models ORDER BY id"),
        )
    }

    fn firearm_models_without_relationships(&self) -> Result<Vec<FirearmModel>> {
        let conn = self.conn()?;
        query_models(
            &conn,
            &format!(
                "SELECT {MODEL_COLUMNS} FROM firearm_models m WHERE NOT EXISTS (SELECT 1 FROM firearm_model_part_categories r WHERE r.firearm_model_id = m.id) ORDER BY m.id"
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str, parent: Option<i64>) -> NewCategory {
        NewCategory {
            name: name.to_string(),
            parent_category_id: parent,
            ..Default::default()
        }
    }

    #[test]
    fn duplicate_relationship_is_rejected_by_the_schema() {
        let store = SqliteStore::open_in_memory().expect("store");
        let cat = store.insert_category(&category("Barrel", None)).unwrap();
        let model = store
            .insert_firearm_model(&NewFirearmModel {
                name: "AR-15".into(),
                parts: "{}".into(),
                ..Default::default()
            })
            .unwrap();

        store.insert_relationship(model.id, cat.id, true).unwrap();
        let err = store
            .insert_relationship(model.id, cat.id, false)
            .expect_err("duplicate pair");
        assert!(matches!(err, CatalogError::Conflict(_)));

        let rel = store.relationship(model.id, cat.id).unwrap().unwrap();
        assert!(rel.is_required);
    }

    #[test]
    fn explicit_ids_are_kept_and_autoincrement_follows() {
        let store = SqliteStore::open_in_memory().expect("store");
        let seeded = store
            .insert_category(&NewCategory {
                id: Some(15),
                ..category("Grip Screw", None)
            })
            .unwrap();
        assert_eq!(seeded.id, 15);

        let next = store.insert_category(&category("Bolt", None)).unwrap();
        assert_eq!(next.id, 16);
    }

    #[test]
    fn dangling_parent_violates_foreign_key() {
        let store = SqliteStore::open_in_memory().expect("store");
        let err = store
            .insert_category(&category("Orphan", Some(99)))
            .expect_err("missing parent");
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[test]
    fn part_category_assignment_only_fills_empty_slot() {
        let store = SqliteStore::open_in_memory().expect("store");
        let first = store.insert_category(&category("Grip", None)).unwrap();
        let second = store.insert_category(&category("Barrel", None)).unwrap();
        let part = store
            .insert_part(&NewPart {
                name: "Hogue Grip".into(),
                ..Default::default()
            })
            .unwrap();

        assert!(store.assign_part_category(part.id, first.id).unwrap());
        assert!(!store.assign_part_category(part.id, second.id).unwrap());
        assert_eq!(
            store.part(part.id).unwrap().unwrap().part_category_id,
            Some(first.id)
        );
        assert!(store.uncategorized_parts().unwrap().is_empty());
    }

    #[test]
    fn relationship_filter_and_model_scan() {
        let store = SqliteStore::open_in_memory().expect("store");
        let upper = store.insert_category(&category("Upper Assembly", None)).unwrap();
        let slings = store.insert_category(&category("Slings", None)).unwrap();
        let model = store
            .insert_firearm_model(&NewFirearmModel {
                name: "M4 Carbine".into(),
                parts: "{}".into(),
                ..Default::default()
            })
            .unwrap();
        let bare = store
            .insert_firearm_model(&NewFirearmModel {
                name: "AK-47".into(),
                parts: "{}".into(),
                ..Default::default()
            })
            .unwrap();

        store.insert_relationship(model.id, upper.id, true).unwrap();
        store.insert_relationship(model.id, slings.id, false).unwrap();

        assert_eq!(store.relationships_for_model(model.id, None).unwrap().len(), 2);
        let required = store.relationships_for_model(model.id, Some(true)).unwrap();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0].part_category_id, upper.id);

        let pending = store.firearm_models_without_relationships().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, bare.id);
    }
}
