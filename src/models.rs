use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_category_id: Option<i64>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a category. `id` is only set when seeding the fixed
/// taxonomy; otherwise storage assigns one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCategory {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub parent_category_id: Option<i64>,
    #[serde(default)]
    pub description: String,
}

/// Partial update. `parent_category_id` distinguishes "absent" (keep) from
/// explicit `null` (detach to top level).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present_field")]
    pub parent_category_id: Option<Option<i64>>,
    #[serde(default)]
    pub description: Option<String>,
}

fn present_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A category with its descendants, as returned by recursive listings.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryTreeNode {
    #[serde(flatten)]
    pub category: Category,
    pub child_categories: Vec<CategoryTreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCategoryRelationship {
    pub id: i64,
    pub firearm_model_id: i64,
    pub part_category_id: i64,
    pub is_required: bool,
    pub created_at: DateTime<Utc>,
}

/// Row of the flat per-model listing: the category joined with its flag.
#[derive(Debug, Clone, Serialize)]
pub struct ModelCategory {
    #[serde(flatten)]
    pub category: Category,
    pub is_required: bool,
}

/// One node of the per-model hierarchy view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyNode {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_category_id: Option<i64>,
    pub is_required: bool,
    /// True when the model carries its own relationship for this category,
    /// false when the flag was inherited from an ancestor.
    pub is_assigned: bool,
    pub children: Vec<HierarchyNode>,
}

/// Node of the merged view over every model's legacy parts document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartHierarchyItem {
    pub name: String,
    /// Slug of `name`.
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PartHierarchyItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub subcategory: String,
    pub part_category_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPart {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    #[serde(default)]
    pub part_category_id: Option<i64>,
}

/// Firearm model with its legacy documents kept verbatim, since a stored
/// document may not be valid JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirearmModel {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(serialize_with = "legacy_document")]
    pub parts: String,
    #[serde(serialize_with = "optional_legacy_document")]
    pub compatible_parts: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewFirearmModel {
    pub name: String,
    pub description: String,
    pub parts: String,
    pub compatible_parts: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFirearmModelRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parts: Value,
    #[serde(default)]
    pub compatible_parts: Option<Value>,
}

impl From<CreateFirearmModelRequest> for NewFirearmModel {
    fn from(req: CreateFirearmModelRequest) -> Self {
        let parts = if req.parts.is_null() {
            "{}".to_string()
        } else {
            req.parts.to_string()
        };
        Self {
            name: req.name,
            description: req.description,
            parts,
            compatible_parts: req
                .compatible_parts
                .filter(|v| !v.is_null())
                .map(|v| v.to_string()),
        }
    }
}

fn legacy_document<S: Serializer>(raw: &str, serializer: S) -> Result<S::Ok, S::Error> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => value.serialize(serializer),
        Err(_) => serializer.serialize_str(raw),
    }
}

fn optional_legacy_document<S: Serializer>(
    raw: &Option<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match raw {
        Some(raw) => legacy_document(raw, serializer),
        None => serializer.serialize_none(),
    }
}
