use std::sync::MutexGuard;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SharedHierarchy;
use crate::error::Error;
use crate::hierarchy::{DeleteGroupMode, Hierarchy, HierarchyView, RankScope};
use crate::models::*;
use crate::ranking::{ScoredEntity, SortWeight};

// ============================================================
// Request / response bodies
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntityRequest {
    pub name: String,
    /// Group to create the entity in. `None` appends to the root.
    #[serde(default)]
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveEntityRequest {
    /// Destination group. `None` moves the entity to the root.
    #[serde(default)]
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetValueRequest {
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetValueResponse {
    pub entity_id: Uuid,
    pub index: usize,
    /// The value actually stored, after clamping.
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCountRequest {
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderRequest {
    /// Group whose items are reordered. `None` reorders the root.
    #[serde(default)]
    pub container_id: Option<Uuid>,
    pub ordered_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankRequest {
    #[serde(default)]
    pub weights: Vec<SortWeight>,
    #[serde(default)]
    pub scope: RankScope,
}

#[derive(Debug, Deserialize)]
pub struct DeleteGroupQuery {
    #[serde(default)]
    pub mode: DeleteGroupMode,
}

// ============================================================
// Error Handling
// ============================================================

/// Map a hierarchy error to a response. Storage failures are logged in full
/// and reported to the client with a generic message.
fn api_error(e: Error) -> (StatusCode, String) {
    match e {
        Error::Validation(_) => {
            tracing::warn!("Validation error: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        Error::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        Error::Transport(_) | Error::Config(_) => {
            tracing::error!("Internal error: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Could not save changes, please retry".to_string(),
            )
        }
    }
}

fn lock(hierarchy: &SharedHierarchy) -> MutexGuard<'_, Hierarchy> {
    hierarchy.lock().expect("hierarchy lock poisoned")
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Hierarchy
// ============================================================

pub async fn get_hierarchy(State(hierarchy): State<SharedHierarchy>) -> Json<HierarchyView> {
    Json(lock(&hierarchy).view())
}

// ============================================================
// Groups
// ============================================================

pub async fn create_group(
    State(hierarchy): State<SharedHierarchy>,
    Json(input): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), (StatusCode, String)> {
    lock(&hierarchy)
        .create_group(&input.name)
        .map(|g| (StatusCode::CREATED, Json(g)))
        .map_err(api_error)
}

pub async fn get_group(
    State(hierarchy): State<SharedHierarchy>,
    Path(id): Path<Uuid>,
) -> Result<Json<Group>, (StatusCode, String)> {
    lock(&hierarchy)
        .group(id)
        .cloned()
        .map(Json)
        .ok_or_else(|| api_error(Error::group_not_found(id)))
}

pub async fn rename_group(
    State(hierarchy): State<SharedHierarchy>,
    Path(id): Path<Uuid>,
    Json(input): Json<NameRequest>,
) -> Result<Json<Group>, (StatusCode, String)> {
    lock(&hierarchy)
        .rename_group(id, &input.name)
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_group(
    State(hierarchy): State<SharedHierarchy>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteGroupQuery>,
) -> Result<StatusCode, (StatusCode, String)> {
    lock(&hierarchy)
        .delete_group(id, query.mode)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(api_error)
}

// ============================================================
// Entities
// ============================================================

pub async fn create_entity(
    State(hierarchy): State<SharedHierarchy>,
    Json(input): Json<CreateEntityRequest>,
) -> Result<(StatusCode, Json<RankedEntity>), (StatusCode, String)> {
    lock(&hierarchy)
        .create_ranked_entity(&input.name, input.group_id)
        .map(|e| (StatusCode::CREATED, Json(e)))
        .map_err(api_error)
}

pub async fn get_entity(
    State(hierarchy): State<SharedHierarchy>,
    Path(id): Path<Uuid>,
) -> Result<Json<RankedEntity>, (StatusCode, String)> {
    lock(&hierarchy)
        .entity(id)
        .cloned()
        .map(Json)
        .ok_or_else(|| api_error(Error::entity_not_found(id)))
}

pub async fn rename_entity(
    State(hierarchy): State<SharedHierarchy>,
    Path(id): Path<Uuid>,
    Json(input): Json<NameRequest>,
) -> Result<Json<RankedEntity>, (StatusCode, String)> {
    lock(&hierarchy)
        .rename_entity(id, &input.name)
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_entity(
    State(hierarchy): State<SharedHierarchy>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    lock(&hierarchy)
        .delete_ranked_entity(id)
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(api_error)
}

pub async fn move_entity(
    State(hierarchy): State<SharedHierarchy>,
    Path(id): Path<Uuid>,
    Json(input): Json<MoveEntityRequest>,
) -> Result<Json<RankedEntity>, (StatusCode, String)> {
    lock(&hierarchy)
        .move_entity_to_group(id, input.group_id)
        .map(Json)
        .map_err(api_error)
}

pub async fn set_attribute_value(
    State(hierarchy): State<SharedHierarchy>,
    Path((id, index)): Path<(Uuid, usize)>,
    Json(input): Json<SetValueRequest>,
) -> Result<Json<SetValueResponse>, (StatusCode, String)> {
    lock(&hierarchy)
        .set_attribute_value(id, index, input.value)
        .map(|value| {
            Json(SetValueResponse {
                entity_id: id,
                index,
                value,
            })
        })
        .map_err(api_error)
}

// ============================================================
// Attribute schema
// ============================================================

pub async fn set_attribute_count(
    State(hierarchy): State<SharedHierarchy>,
    Json(input): Json<SetCountRequest>,
) -> Result<Json<HierarchyView>, (StatusCode, String)> {
    let mut guard = lock(&hierarchy);
    guard.set_attribute_count(input.count).map_err(api_error)?;
    Ok(Json(guard.view()))
}

pub async fn rename_attribute(
    State(hierarchy): State<SharedHierarchy>,
    Path(index): Path<usize>,
    Json(input): Json<NameRequest>,
) -> Result<Json<HierarchyView>, (StatusCode, String)> {
    let mut guard = lock(&hierarchy);
    guard
        .rename_attribute(index, &input.name)
        .map_err(api_error)?;
    Ok(Json(guard.view()))
}

// ============================================================
// Ordering and ranking
// ============================================================

pub async fn reorder(
    State(hierarchy): State<SharedHierarchy>,
    Json(input): Json<ReorderRequest>,
) -> Result<Json<HierarchyView>, (StatusCode, String)> {
    let mut guard = lock(&hierarchy);
    guard
        .reorder(input.container_id, &input.ordered_ids)
        .map_err(api_error)?;
    Ok(Json(guard.view()))
}

pub async fn rank(
    State(hierarchy): State<SharedHierarchy>,
    Json(input): Json<RankRequest>,
) -> Result<Json<Vec<ScoredEntity>>, (StatusCode, String)> {
    lock(&hierarchy)
        .rank(input.scope, &input.weights)
        .map(Json)
        .map_err(api_error)
}

pub async fn flush_autosave(
    State(hierarchy): State<SharedHierarchy>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    lock(&hierarchy)
        .flush_all()
        .map(|written| Json(serde_json::json!({ "written": written })))
        .map_err(api_error)
}
