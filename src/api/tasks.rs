//! Task endpoints.

use super::auth::AuthUser;
use super::{AppState, JsonBody, PathId};
use crate::db::pagination::Page;
use crate::error::AppError;
use crate::input::{read_new_task, read_task_patch};
use crate::types::{Task, TaskLog};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::collections::HashMap;

pub async fn index(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page<Task>>, AppError> {
    Ok(Json(state.lifecycle.list(&auth.actor(), &params)?))
}

pub async fn store(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(body): JsonBody,
) -> Result<Response, AppError> {
    let (input, errors) = read_new_task(&body);
    let task = state.lifecycle.create_with(&auth.actor(), input, errors)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Task created successfully", "task": task })),
    )
        .into_response())
}

pub async fn show(
    State(state): State<AppState>,
    auth: AuthUser,
    PathId(id): PathId,
) -> Result<Json<Task>, AppError> {
    Ok(Json(state.lifecycle.show(&auth.actor(), id)?))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    PathId(id): PathId,
    JsonBody(body): JsonBody,
) -> Result<Response, AppError> {
    let (patch, errors) = read_task_patch(&body);
    let task = state.lifecycle.update_with(&auth.actor(), id, patch, errors)?;
    Ok(Json(json!({ "message": "Task updated successfully", "task": task })).into_response())
}

pub async fn destroy(
    State(state): State<AppState>,
    auth: AuthUser,
    PathId(id): PathId,
) -> Result<Response, AppError> {
    state.lifecycle.delete(&auth.actor(), id)?;
    Ok(Json(json!({ "message": "Task deleted successfully" })).into_response())
}

pub async fn restore(
    State(state): State<AppState>,
    auth: AuthUser,
    PathId(id): PathId,
) -> Result<Response, AppError> {
    let task = state.lifecycle.restore(&auth.actor(), id)?;
    Ok(Json(json!({ "message": "Task restored successfully", "task": task })).into_response())
}

pub async fn toggle_status(
    State(state): State<AppState>,
    auth: AuthUser,
    PathId(id): PathId,
) -> Result<Response, AppError> {
    let task = state.lifecycle.toggle_status(&auth.actor(), id)?;
    Ok(Json(json!({ "message": "Task status updated successfully", "task": task })).into_response())
}

pub async fn logs(
    State(state): State<AppState>,
    auth: AuthUser,
    PathId(id): PathId,
) -> Result<Json<Vec<TaskLog>>, AppError> {
    Ok(Json(state.lifecycle.history(&auth.actor(), id)?))
}
