//! Tag endpoints.

use super::auth::AuthUser;
use super::{AppState, JsonBody, PathId};
use crate::error::AppError;
use crate::input::{parse_new_tag, parse_tag_patch};
use crate::types::Tag;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

pub async fn index(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<Tag>>, AppError> {
    Ok(Json(state.lifecycle.list_tags(&auth.actor())?))
}

pub async fn store(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(body): JsonBody,
) -> Result<Response, AppError> {
    let input = parse_new_tag(&body)?;
    let tag = state.lifecycle.create_tag(&auth.actor(), input)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Tag created successfully", "tag": tag })),
    )
        .into_response())
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    PathId(id): PathId,
    JsonBody(body): JsonBody,
) -> Result<Response, AppError> {
    let patch = parse_tag_patch(&body)?;
    let tag = state.lifecycle.update_tag(&auth.actor(), id, patch)?;
    Ok(Json(json!({ "message": "Tag updated successfully", "tag": tag })).into_response())
}

pub async fn destroy(
    State(state): State<AppState>,
    auth: AuthUser,
    PathId(id): PathId,
) -> Result<Response, AppError> {
    state.lifecycle.delete_tag(&auth.actor(), id)?;
    Ok(Json(json!({ "message": "Tag deleted successfully" })).into_response())
}
