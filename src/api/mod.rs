mod handlers;

pub use handlers::{
    CreateEntityRequest, CreateGroupRequest, MoveEntityRequest, NameRequest, RankRequest,
    ReorderRequest, SetCountRequest, SetValueRequest, SetValueResponse,
};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::hierarchy::Hierarchy;

/// The hierarchy shared between request handlers and the autosave task.
pub type SharedHierarchy = Arc<Mutex<Hierarchy>>;

pub fn create_router(hierarchy: SharedHierarchy) -> Router {
    let api = Router::new()
        .route("/hierarchy", get(handlers::get_hierarchy))
        // Groups
        .route("/groups", post(handlers::create_group))
        .route("/groups/{id}", get(handlers::get_group))
        .route("/groups/{id}", put(handlers::rename_group))
        .route("/groups/{id}", delete(handlers::delete_group))
        // Entities
        .route("/entities", post(handlers::create_entity))
        .route("/entities/{id}", get(handlers::get_entity))
        .route("/entities/{id}", put(handlers::rename_entity))
        .route("/entities/{id}", delete(handlers::delete_entity))
        .route("/entities/{id}/move", post(handlers::move_entity))
        .route(
            "/entities/{id}/attributes/{index}",
            put(handlers::set_attribute_value),
        )
        // Attribute schema
        .route("/attributes/count", put(handlers::set_attribute_count))
        .route("/attributes/{index}", put(handlers::rename_attribute))
        // Ordering and ranking
        .route("/reorder", post(handlers::reorder))
        .route("/rank", post(handlers::rank))
        .route("/autosave/flush", post(handlers::flush_autosave))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(hierarchy)
}

/// Periodically write attribute edits that have gone quiet.
pub fn spawn_autosave(hierarchy: SharedHierarchy, tick: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            autosave_pass(&hierarchy);
        }
    })
}

fn autosave_pass(hierarchy: &SharedHierarchy) {
    let mut guard = hierarchy.lock().expect("hierarchy lock poisoned");
    if guard.pending_saves() == 0 {
        return;
    }
    if let Err(e) = guard.flush_autosave(Instant::now()) {
        tracing::warn!("Autosave pass incomplete: {}", e);
    }
}
