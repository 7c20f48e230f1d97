//! Bearer-token identity: the request extractor and the login endpoints.

use super::{AppState, JsonBody};
use crate::error::AppError;
use crate::input::parse_credentials;
use crate::types::{Actor, User};
use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        self.user.actor()
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthenticated)?;
        let user = state
            .lifecycle
            .db()
            .resolve_token(token)?
            .ok_or(AppError::Unauthenticated)?;
        Ok(Self {
            user,
            token: token.to_string(),
        })
    }
}

pub async fn login(State(state): State<AppState>, JsonBody(body): JsonBody) -> Result<Response, AppError> {
    let credentials = parse_credentials(&body)?;
    let db = state.lifecycle.db();

    let Some(user) = db.authenticate(&credentials.email, &credentials.password)? else {
        tracing::warn!("Rejected login");
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid credentials" })),
        )
            .into_response());
    };

    let issued = db.issue_token(user.id, state.token_ttl_seconds)?;
    tracing::info!(user_id = user.id, "User logged in");
    Ok(Json(json!({
        "message": "User Login successfully",
        "access_token": issued.token,
        "token_type": "bearer",
        "expires_in": state.token_ttl_seconds,
        "expires_at": issued.expires_at,
    }))
    .into_response())
}

pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> Result<Response, AppError> {
    state.lifecycle.db().revoke_token(&auth.token)?;
    tracing::info!(user_id = auth.user.id, "User logged out");
    Ok(Json(json!({ "message": "User Successfully Logged Out" })).into_response())
}

pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}
