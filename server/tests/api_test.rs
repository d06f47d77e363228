//! REST API tests against the in-memory repository.

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use stockroom_server::config::Config;
use stockroom_server::db::MemoryRepository;
use stockroom_server::{app, AppState};
use tower::ServiceExt;

fn test_app() -> Router {
    app(AppState::new(Arc::new(MemoryRepository::new()), Config::default()))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app();
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// ============================================================================
// Containers
// ============================================================================

#[tokio::test]
async fn container_lifecycle() {
    let app = test_app();

    let (status, created) = call(
        &app,
        Method::POST,
        "/api/containers",
        Some(json!({"_id": "c1", "name": "Corner Shop"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["_id"], "c1");

    let (status, found) = call(&app, Method::GET, "/api/containers/c1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["name"], "Corner Shop");

    let (status, updated) = call(
        &app,
        Method::PUT,
        "/api/containers/c1",
        Some(json!({"_id": "c1", "name": "Renamed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Renamed");

    let (status, list) = call(&app, Method::GET, "/api/containers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = call(&app, Method::DELETE, "/api/containers/c1", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app, Method::GET, "/api/containers/c1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_generates_missing_id() {
    let app = test_app();
    let (status, created) = call(
        &app,
        Method::POST,
        "/api/containers",
        Some(json!({"name": "Shop"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn duplicate_create_conflicts() {
    let app = test_app();
    let body = json!({"_id": "c1", "name": "Shop"});
    call(&app, Method::POST, "/api/containers", Some(body.clone())).await;
    let (status, _) = call(&app, Method::POST, "/api/containers", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn update_missing_is_not_found() {
    let app = test_app();
    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/containers/ghost",
        Some(json!({"name": "Shop"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mismatched_body_id_is_rejected() {
    let app = test_app();
    call(
        &app,
        Method::POST,
        "/api/containers",
        Some(json!({"_id": "c1", "name": "Shop"})),
    )
    .await;
    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/containers/c1",
        Some(json!({"_id": "c2", "name": "Shop"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_payloads_are_rejected() {
    let app = test_app();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/containers",
        Some(json!({"name": "x".repeat(101)})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].as_str().unwrap().contains("name"));

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/items",
        Some(json!({"name": "Widget", "qty": 1, "selling_price": -5.0, "container_id": "c1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/items",
        Some(json!({"name": "Widget", "qty": -1, "selling_price": 5.0, "container_id": "c1"})),
    )
    .await;
    assert!(status.is_client_error());
}

// ============================================================================
// Items
// ============================================================================

#[tokio::test]
async fn item_wire_format() {
    let app = test_app();
    let (status, created) = call(
        &app,
        Method::POST,
        "/api/items",
        Some(json!({
            "_id": "i1", "name": "Widget", "qty": 3,
            "selling_price": 9.99, "container_id": "c1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["qty"], 3);
    assert_eq!(created["selling_price"], 9.99);
    assert_eq!(created["container_id"], "c1");

    let (status, found) = call(&app, Method::GET, "/api/items/i1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["_id"], "i1");
}

#[tokio::test]
async fn items_by_container() {
    let app = test_app();
    for (id, container) in [("i1", "c1"), ("i2", "c1"), ("i3", "c2")] {
        call(
            &app,
            Method::POST,
            "/api/items",
            Some(json!({
                "_id": id, "name": "Widget", "qty": 1,
                "selling_price": 1.0, "container_id": container
            })),
        )
        .await;
    }

    let (status, items) = call(&app, Method::GET, "/api/items/container/c1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(items.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn container_delete_cascades_to_items() {
    let app = test_app();
    call(
        &app,
        Method::POST,
        "/api/containers",
        Some(json!({"_id": "c1", "name": "Shop"})),
    )
    .await;
    call(
        &app,
        Method::POST,
        "/api/items",
        Some(json!({
            "_id": "i1", "name": "Widget", "qty": 1,
            "selling_price": 1.0, "container_id": "c1"
        })),
    )
    .await;

    let (status, body) = call(&app, Method::DELETE, "/api/containers/c1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deletedItems"], 1);

    let (status, _) = call(&app, Method::GET, "/api/items/i1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn item_delete() {
    let app = test_app();
    call(
        &app,
        Method::POST,
        "/api/items",
        Some(json!({
            "_id": "i1", "name": "Widget", "qty": 1,
            "selling_price": 1.0, "container_id": "c1"
        })),
    )
    .await;

    let (status, _) = call(&app, Method::DELETE, "/api/items/i1", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::DELETE, "/api/items/i1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn custom_prefix() {
    let config = Config {
        api_prefix: "/v1".to_string(),
        ..Config::default()
    };
    let app = app(AppState::new(Arc::new(MemoryRepository::new()), config));

    let (status, _) = call(&app, Method::GET, "/v1/containers", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::GET, "/api/containers", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
