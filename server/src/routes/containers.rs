//! Container resource routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::db::{ContainerPayload, ContainerRecord};
use crate::error::{AppError, Result};
use crate::AppState;

/// Response for a container delete.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteContainerResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub deleted_items: u64,
}

/// Create container routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/containers", get(list).post(create))
        .route("/containers/{id}", get(show).put(update).delete(remove))
}

/// GET /containers
async fn list(State(state): State<AppState>) -> Result<Json<Vec<ContainerRecord>>> {
    Ok(Json(state.repo.list_containers().await?))
}

/// GET /containers/{id}
async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContainerRecord>> {
    state
        .repo
        .get_container(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("container {id}")))
}

/// POST /containers - `_id` is generated when absent.
async fn create(
    State(state): State<AppState>,
    Json(payload): Json<ContainerPayload>,
) -> Result<(StatusCode, Json<ContainerRecord>)> {
    let id = payload
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    payload.fields.validate(&id)?;

    let record = state
        .repo
        .insert_container(ContainerRecord::new(id, payload.fields))
        .await?;
    tracing::info!(id = %record.id, "Container created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /containers/{id}
async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ContainerPayload>,
) -> Result<Json<ContainerRecord>> {
    if payload.id.as_deref().is_some_and(|body_id| body_id != id) {
        return Err(AppError::BadRequest("_id does not match the path".to_string()));
    }
    payload.fields.validate(&id)?;

    let record = state
        .repo
        .update_container(&id, payload.fields)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("container {id}")))?;
    tracing::debug!(id = %record.id, "Container updated");
    Ok(Json(record))
}

/// DELETE /containers/{id} - also removes the container's items.
async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteContainerResponse>> {
    let deleted_items = state
        .repo
        .delete_container(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("container {id}")))?;
    tracing::info!(%id, deleted_items, "Container deleted");
    Ok(Json(DeleteContainerResponse { id, deleted_items }))
}
