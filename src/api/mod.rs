//! HTTP surface.
//!
//! Every route lives under `/api/v1`. All routes except `/login` and
//! `/health` require a bearer token (see [`auth::AuthUser`]).

pub mod auth;
pub mod tags;
pub mod tasks;
pub mod users;

use crate::error::{AppError, ErrorCode, VERSION_CONFLICT_MESSAGE};
use crate::lifecycle::TaskLifecycle;
use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: TaskLifecycle,
    pub token_ttl_seconds: i64,
}

impl AppState {
    pub fn new(lifecycle: TaskLifecycle, token_ttl_seconds: i64) -> Self {
        Self {
            lifecycle,
            token_ttl_seconds,
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } | AppError::UnknownResource => StatusCode::NOT_FOUND,
            AppError::VersionConflict { .. } => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AppError::Validation(errors) => json!({
                "message": "The given data was invalid.",
                "code": ErrorCode::ValidationFailed,
                "errors": errors,
            }),
            AppError::VersionConflict { .. } => json!({
                "message": VERSION_CONFLICT_MESSAGE,
                "code": ErrorCode::VersionConflict,
            }),
            AppError::Database(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                json!({ "message": "Server Error", "code": self.code() })
            }
            _ => json!({ "message": self.to_string(), "code": self.code() }),
        };
        (status, Json(body)).into_response()
    }
}

/// JSON request body whose parse failures surface as validation errors.
pub struct JsonBody(pub Value);

impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<Value>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::validation("body", rejection.body_text())),
        }
    }
}

/// Numeric `{id}` path segment. Anything else is a 404 in the JSON error shape.
pub struct PathId(pub i64);

impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<i64>::from_request_parts(parts, state).await {
            Ok(Path(id)) => Ok(Self(id)),
            Err(rejection) => {
                tracing::debug!(%rejection, "Rejected path id");
                Err(AppError::UnknownResource)
            }
        }
    }
}

/// Health check response.
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let v1 = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/tasks", get(tasks::index).post(tasks::store))
        .route(
            "/tasks/{id}",
            get(tasks::show)
                .put(tasks::update)
                .patch(tasks::update)
                .delete(tasks::destroy),
        )
        .route("/tasks/{id}/restore", patch(tasks::restore))
        .route("/tasks/{id}/toggle-status", patch(tasks::toggle_status))
        .route("/tasks/{id}/logs", get(tasks::logs))
        .route("/tags", get(tags::index).post(tags::store))
        .route(
            "/tags/{id}",
            put(tags::update).patch(tags::update).delete(tags::destroy),
        )
        .route("/users", get(users::index))
        .route("/health", get(health));

    Router::new()
        .nest("/api/v1", v1)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on `addr`.
///
/// Returns a oneshot sender that can be used to signal shutdown,
/// the actual address the server is bound to, and the serving task.
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr, tokio::task::JoinHandle<()>)> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Task desk listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("Task desk shutting down");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((shutdown_tx, bound_addr, handle))
}
