//! User directory.

use super::AppState;
use super::auth::AuthUser;
use crate::error::AppError;
use crate::types::UserSummary;
use axum::{Json, extract::State};

/// `{id, name}` of every user, for assignment pickers.
pub async fn index(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    Ok(Json(state.lifecycle.list_users(&auth.actor())?))
}
