//! HTTP tests driving the router in-process.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use taskdesk::api::{AppState, build_router};
use taskdesk::db::Database;
use taskdesk::error::VERSION_CONFLICT_MESSAGE;
use taskdesk::lifecycle::TaskLifecycle;
use taskdesk::types::Role;
use tower::ServiceExt;

const PASSWORD: &str = "password";

fn setup() -> Router {
    let db = Database::open_in_memory().expect("Failed to create in-memory database");
    db.create_user("Admin", "admin@example.com", PASSWORD, Role::Admin)
        .unwrap();
    db.create_user("Alice", "alice@example.com", PASSWORD, Role::User)
        .unwrap();
    db.create_user("Bob", "bob@example.com", PASSWORD, Role::User)
        .unwrap();
    build_router(AppState::new(TaskLifecycle::new(db), 3600))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn login(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/login",
        None,
        Some(json!({ "email": email, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

async fn user_id(app: &Router, token: &str) -> i64 {
    let (_, me) = send(app, Method::GET, "/api/v1/me", Some(token), None).await;
    me["id"].as_i64().unwrap()
}

#[tokio::test]
async fn health_needs_no_token() {
    let app = setup();
    let (status, body) = send(&app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn task_routes_require_a_token() {
    let app = setup();
    let (status, _) = send(&app, Method::GET, "/api/v1/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/v1/tasks", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_rejects_bad_password_and_logout_revokes() {
    let app = setup();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/login",
        None,
        Some(json!({ "email": "alice@example.com", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");

    let token = login(&app, "alice@example.com").await;
    let (status, body) = send(&app, Method::POST, "/api/v1/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User Successfully Logged Out");

    let (status, _) = send(&app, Method::GET, "/api/v1/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_update_and_conflict() {
    let app = setup();
    let token = login(&app, "alice@example.com").await;
    let alice = user_id(&app, &token).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/tasks",
        Some(&token),
        Some(json!({ "title": "Ship it", "priority": "high", "assigned_to": alice })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Task created successfully");
    assert_eq!(body["task"]["version"], 1);
    assert_eq!(body["task"]["status"], "pending");
    let id = body["task"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/tasks/{}", id);

    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({ "version": 1, "title": "Ship it today" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task"]["version"], 2);

    let (status, body) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&token),
        Some(json!({ "version": 1, "title": "Stale edit" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], VERSION_CONFLICT_MESSAGE);

    let (status, body) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Ship it today");
}

#[tokio::test]
async fn validation_errors_are_grouped_by_field() {
    let app = setup();
    let token = login(&app, "alice@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/tasks",
        Some(&token),
        Some(json!({ "title": "x", "priority": "urgent", "due_date": "2001-01-01", "assigned_to": 9999 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    for field in ["title", "priority", "due_date", "assigned_to"] {
        assert!(body["errors"][field].is_array(), "missing {}", field);
    }

    let alice = user_id(&app, &token).await;
    let (_, created) = send(
        &app,
        Method::POST,
        "/api/v1/tasks",
        Some(&token),
        Some(json!({ "title": "Needs a version", "assigned_to": alice })),
    )
    .await;
    let uri = format!("/api/v1/tasks/{}", created["task"]["id"]);
    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&token),
        Some(json!({ "title": "no", "due_date": "2001-01-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["errors"]["version"][0],
        "The Version number is required for updates"
    );
    assert!(body["errors"]["title"].is_array());
    assert!(body["errors"]["due_date"].is_array());
}

#[tokio::test]
async fn non_numeric_ids_are_json_not_found() {
    let app = setup();
    let token = login(&app, "admin@example.com").await;

    for (method, uri) in [
        (Method::GET, "/api/v1/tasks/abc"),
        (Method::PATCH, "/api/v1/tasks/1.5/toggle-status"),
        (Method::DELETE, "/api/v1/tags/first"),
    ] {
        let (status, body) = send(&app, method, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn users_are_listed_for_assignment() {
    let app = setup();
    let token = login(&app, "bob@example.com").await;
    let (status, body) = send(&app, Method::GET, "/api/v1/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["Admin", "Alice", "Bob"]);
    assert!(body[0].get("email").is_none());
}

#[tokio::test]
async fn other_users_tasks_are_forbidden() {
    let app = setup();
    let admin = login(&app, "admin@example.com").await;
    let alice = login(&app, "alice@example.com").await;
    let bob = login(&app, "bob@example.com").await;
    let bob_id = user_id(&app, &bob).await;

    let (_, body) = send(
        &app,
        Method::POST,
        "/api/v1/tasks",
        Some(&admin),
        Some(json!({ "title": "Bob's chore", "assigned_to": bob_id })),
    )
    .await;
    let id = body["task"]["id"].as_i64().unwrap();

    for (method, path) in [
        (Method::GET, format!("/api/v1/tasks/{}", id)),
        (Method::PATCH, format!("/api/v1/tasks/{}/toggle-status", id)),
        (Method::DELETE, format!("/api/v1/tasks/{}", id)),
    ] {
        let (status, _) = send(&app, method, &path, Some(&alice), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", path);
    }

    let (status, body) = send(&app, Method::GET, "/api/v1/tasks", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
    assert_eq!(body["pagination"]["mode"], "offset");
}

#[tokio::test]
async fn delete_restore_and_history() {
    let app = setup();
    let admin = login(&app, "admin@example.com").await;

    let (_, body) = send(
        &app,
        Method::POST,
        "/api/v1/tasks",
        Some(&admin),
        Some(json!({ "title": "Temporary" })),
    )
    .await;
    let id = body["task"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/api/v1/tasks/{}", id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Task deleted successfully");

    let (status, _) = send(&app, Method::GET, &format!("/api/v1/tasks/{}", id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/tasks/{}/restore", id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["task"]["deleted_at"].is_null());

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/tasks/{}/logs", id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ops: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["operation_type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ops, ["update", "delete", "create"]);
}

#[tokio::test]
async fn only_admins_delete_tags() {
    let app = setup();
    let admin = login(&app, "admin@example.com").await;
    let alice = login(&app, "alice@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/tags",
        Some(&alice),
        Some(json!({ "name": "Research", "color": "#1D4ED8" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["tag"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/tags/{}", id);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Tag deleted successfully");
}
