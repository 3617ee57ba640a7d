use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::info;

use crate::{
    category_tree::CategoryTree,
    config::parse_flag,
    error::{CatalogError, Result},
    hierarchy::HierarchyBuilder,
    legacy_catalog::LegacyCatalog,
    migrator::Migrator,
    models::{CategoryUpdate, CreateFirearmModelRequest, NewCategory, NewFirearmModel, NewPart},
    relationships::RelationshipStore,
    AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct RequiredQuery {
    #[serde(default)]
    pub required: Option<String>,
}

impl RequiredQuery {
    /// Absent or blank means no filter.
    fn filter(&self) -> Option<bool> {
        self.required
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(parse_flag)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TreeQuery {
    #[serde(default)]
    pub recursive: Option<String>,
}

impl TreeQuery {
    fn recursive(&self) -> bool {
        self.recursive.as_deref().is_some_and(parse_flag)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PartsQuery {
    #[serde(default)]
    pub category_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AddRelationshipBody {
    #[serde(default)]
    is_required: bool,
}

#[derive(Debug, Deserialize)]
struct UpdateRelationshipBody {
    is_required: bool,
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| CatalogError::Internal(format!("blocking task failed: {err}")))?
}

fn parse_id(raw: &str, what: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id >= 0)
        .ok_or_else(|| CatalogError::validation(format!("Invalid {what} ID")))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|err| CatalogError::validation(format!("Invalid request body: {err}")))
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true, "timestamp": Utc::now() }))
}

pub async fn list_part_categories(
    State(state): State<AppState>,
    Query(query): Query<TreeQuery>,
) -> Result<Response> {
    let tree = CategoryTree::new(state.store.clone());
    if query.recursive() {
        let forest = blocking(move || tree.subtree(None)).await?;
        return Ok(Json(forest).into_response());
    }
    let categories = blocking(move || tree.list()).await?;
    Ok(Json(categories).into_response())
}

pub async fn get_part_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TreeQuery>,
) -> Result<Response> {
    let id = parse_id(&id, "part category")?;
    let tree = CategoryTree::new(state.store.clone());
    if query.recursive() {
        let mut nodes = blocking(move || tree.subtree(Some(id))).await?;
        let node = nodes
            .pop()
            .ok_or_else(|| CatalogError::not_found(format!("Part category {id} not found")))?;
        return Ok(Json(node).into_response());
    }
    let category = blocking(move || tree.get(id)).await?;
    Ok(Json(category).into_response())
}

pub async fn create_part_category(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let new: NewCategory = parse_body(&body)?;
    let tree = CategoryTree::new(state.store.clone());
    let category = blocking(move || tree.create_category(new)).await?;
    Ok((StatusCode::CREATED, Json(category)).into_response())
}

pub async fn update_part_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response> {
    let id = parse_id(&id, "part category")?;
    let changes: CategoryUpdate = parse_body(&body)?;
    let tree = CategoryTree::new(state.store.clone());
    let category = blocking(move || tree.update_category(id, changes)).await?;
    Ok(Json(category).into_response())
}

pub async fn delete_part_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_id(&id, "part category")?;
    let tree = CategoryTree::new(state.store.clone());
    blocking(move || tree.delete_category(id)).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Flat listing; also served at `/part-categories/firearm/{id}`.
pub async fn list_model_categories(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
    Query(query): Query<RequiredQuery>,
) -> Result<Response> {
    let model_id = parse_id(&model_id, "firearm model")?;
    let required = query.filter();
    let relationships = RelationshipStore::new(state.store.clone());
    let categories =
        blocking(move || relationships.list_categories_for_model(model_id, required)).await?;
    Ok(Json(categories).into_response())
}

pub async fn model_categories_hierarchy(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
    Query(query): Query<RequiredQuery>,
) -> Result<Response> {
    let model_id = parse_id(&model_id, "firearm model")?;
    let required = query.filter();
    let builder = HierarchyBuilder::new(state.store.clone());
    let hierarchy = blocking(move || builder.build_hierarchy(model_id, required)).await?;
    Ok(Json(hierarchy).into_response())
}

pub async fn add_model_category(
    State(state): State<AppState>,
    Path((model_id, category_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response> {
    let model_id = parse_id(&model_id, "firearm model")?;
    let category_id = parse_id(&category_id, "category")?;
    // Missing or unreadable bodies fall back to an optional relationship.
    let request: AddRelationshipBody = serde_json::from_slice(&body).unwrap_or_default();

    let relationships = RelationshipStore::new(state.store.clone());
    let relationship = blocking(move || {
        relationships.add_relationship(model_id, category_id, request.is_required)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(relationship)).into_response())
}

pub async fn update_model_category(
    State(state): State<AppState>,
    Path((model_id, category_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response> {
    let model_id = parse_id(&model_id, "firearm model")?;
    let category_id = parse_id(&category_id, "category")?;
    let request: UpdateRelationshipBody = parse_body(&body)?;

    let relationships = RelationshipStore::new(state.store.clone());
    let relationship = blocking(move || {
        relationships.update_relationship(model_id, category_id, request.is_required)
    })
    .await?;
    Ok(Json(relationship).into_response())
}

pub async fn remove_model_category(
    State(state): State<AppState>,
    Path((model_id, category_id)): Path<(String, String)>,
) -> Result<Response> {
    let model_id = parse_id(&model_id, "firearm model")?;
    let category_id = parse_id(&category_id, "category")?;
    let relationships = RelationshipStore::new(state.store.clone());
    blocking(move || relationships.remove_relationship(model_id, category_id)).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn list_firearm_models(State(state): State<AppState>) -> Result<Response> {
    let store = state.store.clone();
    let models = blocking(move || store.firearm_models()).await?;
    Ok(Json(models).into_response())
}

pub async fn get_firearm_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_id(&id, "firearm model")?;
    let relationships = RelationshipStore::new(state.store.clone());
    let model = blocking(move || relationships.require_model(id)).await?;
    Ok(Json(model).into_response())
}

pub async fn create_firearm_model(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let request: CreateFirearmModelRequest = parse_body(&body)?;
    let mut new = NewFirearmModel::from(request);
    new.name = new.name.trim().to_string();
    if new.name.is_empty() {
        return Err(CatalogError::validation(
            "Firearm model name must not be empty",
        ));
    }

    let store = state.store.clone();
    let model = blocking(move || store.insert_firearm_model(&new)).await?;
    info!(firearm_model_id = model.id, name = %model.name, "Created firearm model");
    Ok((StatusCode::CREATED, Json(model)).into_response())
}

pub async fn list_parts(
    State(state): State<AppState>,
    Query(query): Query<PartsQuery>,
) -> Result<Response> {
    let category_id = match query.category_id.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(parse_id(raw, "category")?),
        _ => None,
    };
    let store = state.store.clone();
    let parts = blocking(move || store.parts(category_id)).await?;
    Ok(Json(parts).into_response())
}

pub async fn get_part(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let id = parse_id(&id, "part")?;
    let store = state.store.clone();
    let part = blocking(move || store.part(id))
        .await?
        .ok_or_else(|| CatalogError::not_found(format!("Part {id} not found")))?;
    Ok(Json(part).into_response())
}

pub async fn create_part(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let mut new: NewPart = parse_body(&body)?;
    new.name = new.name.trim().to_string();
    if new.name.is_empty() {
        return Err(CatalogError::validation("Part name must not be empty"));
    }

    let store = state.store.clone();
    let part = blocking(move || {
        if let Some(category_id) = new.part_category_id {
            if store.category(category_id)?.is_none() {
                return Err(CatalogError::validation(format!(
                    "Part category {category_id} does not exist"
                )));
            }
        }
        store.insert_part(&new)
    })
    .await?;
    info!(part_id = part.id, name = %part.name, "Created part");
    Ok((StatusCode::CREATED, Json(part)).into_response())
}

pub async fn list_legacy_part_categories(State(state): State<AppState>) -> Result<Response> {
    let catalog = LegacyCatalog::new(state.store.clone());
    let categories = blocking(move || catalog.categories()).await?;
    Ok(Json(categories).into_response())
}

pub async fn list_part_subcategories(State(state): State<AppState>) -> Result<Response> {
    let catalog = LegacyCatalog::new(state.store.clone());
    let grouped = blocking(move || catalog.subcategories_by_category()).await?;
    Ok(Json(grouped).into_response())
}

pub async fn list_subcategories_for_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Response> {
    let catalog = LegacyCatalog::new(state.store.clone());
    let subcategories = blocking(move || catalog.subcategories(&category)).await?;
    Ok(Json(subcategories).into_response())
}

pub async fn part_hierarchy(State(state): State<AppState>) -> Result<Response> {
    let catalog = LegacyCatalog::new(state.store.clone());
    let hierarchy = blocking(move || catalog.part_hierarchy()).await?;
    Ok(Json(hierarchy).into_response())
}

pub async fn run_migrations(State(state): State<AppState>) -> Result<Response> {
    let migrator = Migrator::new(state.store.clone());
    let report = blocking(move || migrator.migrate_schema()).await?;
    Ok(Json(report).into_response())
}
