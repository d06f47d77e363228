//! Item resource routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use crate::db::{ItemPayload, ItemRecord};
use crate::error::{AppError, Result};
use crate::AppState;

/// Create item routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/items", get(list).post(create))
        .route("/items/{id}", get(show).put(update).delete(remove))
        .route("/items/container/{container_id}", get(list_for_container))
}

/// GET /items
async fn list(State(state): State<AppState>) -> Result<Json<Vec<ItemRecord>>> {
    Ok(Json(state.repo.list_items().await?))
}

/// GET /items/container/{container_id}
async fn list_for_container(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> Result<Json<Vec<ItemRecord>>> {
    Ok(Json(state.repo.list_items_for_container(&container_id).await?))
}

/// GET /items/{id}
async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ItemRecord>> {
    state
        .repo
        .get_item(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("item {id}")))
}

/// POST /items - `_id` is generated when absent.
async fn create(
    State(state): State<AppState>,
    Json(payload): Json<ItemPayload>,
) -> Result<(StatusCode, Json<ItemRecord>)> {
    let id = payload
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    payload.fields.validate(&id)?;

    let record = state
        .repo
        .insert_item(ItemRecord::new(id, payload.fields))
        .await?;
    tracing::info!(id = %record.id, container = %record.container_id, "Item created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /items/{id}
async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ItemPayload>,
) -> Result<Json<ItemRecord>> {
    if payload.id.as_deref().is_some_and(|body_id| body_id != id) {
        return Err(AppError::BadRequest("_id does not match the path".to_string()));
    }
    payload.fields.validate(&id)?;

    let record = state
        .repo
        .update_item(&id, payload.fields)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("item {id}")))?;
    tracing::debug!(id = %record.id, "Item updated");
    Ok(Json(record))
}

/// DELETE /items/{id}
async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    if !state.repo.delete_item(&id).await? {
        return Err(AppError::NotFound(format!("item {id}")));
    }
    tracing::info!(%id, "Item deleted");
    Ok(Json(json!({ "_id": id })))
}
