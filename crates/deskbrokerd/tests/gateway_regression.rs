//! Gateway regression tests.
//!
//! Drives the full router (scheduler + redb store + tracker) over HTTP
//! requests: assignment, stickiness, capacity exhaustion, release, and
//! restart durability.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use deskbroker_api::build_router;
use deskbroker_core::{Node, NodeRegistry};
use deskbroker_scheduler::Scheduler;
use deskbroker_state::{NodeHealthTracker, StateStore};

fn two_node_scheduler(store: StateStore) -> Arc<Scheduler> {
    let registry = Arc::new(
        NodeRegistry::new(vec![Node::new("A", 177, 2), Node::new("B", 177, 2)]).unwrap(),
    );
    let tracker = Arc::new(NodeHealthTracker::new(&registry));
    Arc::new(Scheduler::new(registry, tracker, Arc::new(store)))
}

fn test_router() -> Router {
    build_router(two_node_scheduler(StateStore::open_in_memory().unwrap()))
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn assign(router: &Router, user: &str) -> (StatusCode, Value) {
    send(router, "POST", "/assign", Some(json!({ "userId": user }))).await
}

#[tokio::test]
async fn health_endpoint() {
    let router = test_router();
    let (status, body) = send(&router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn two_nodes_fill_up_and_free_a_slot() {
    let router = test_router();

    for (user, server) in [("u1", "A"), ("u2", "B"), ("u3", "A"), ("u4", "B")] {
        let (status, body) = assign(&router, user).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["server"], server, "{user}");
    }

    let (status, body) = assign(&router, "u5").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "No available desktop servers");

    let (status, body) = send(&router, "POST", "/release", Some(json!({ "userId": "u1" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = assign(&router, "u5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["server"], "A");

    let (_, metrics) = send(&router, "GET", "/metrics", None).await;
    assert_eq!(metrics["A"]["activeSessions"], 2);
    assert_eq!(metrics["B"]["activeSessions"], 2);

    let (_, sessions) = send(&router, "GET", "/sessions", None).await;
    assert_eq!(sessions["count"], 4);
}

#[tokio::test]
async fn assignment_is_sticky_across_preferred_desktop() {
    let router = test_router();

    let (_, first) = send(
        &router,
        "POST",
        "/assign",
        Some(json!({ "userId": "alice", "deviceId": "laptop", "preferredDesktop": "gnome" })),
    )
    .await;
    assert_eq!(first["desktop"], "gnome");
    assert_eq!(first["protocol"], "xdmcp");

    let (status, second) = send(
        &router,
        "POST",
        "/assign",
        Some(json!({ "userId": "alice", "preferredDesktop": "kde" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, first);
}

#[tokio::test]
async fn missing_or_malformed_user_id_is_rejected() {
    let router = test_router();

    for body in [json!({}), json!({ "userId": "" }), json!({ "deviceId": "x" })] {
        let (status, resp) = send(&router, "POST", "/assign", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["error"], "userId required");
    }

    // Not JSON at all.
    let req = Request::builder()
        .method("POST")
        .uri("/assign")
        .header("content-type", "application/json")
        .body(Body::from("not json"))
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, "POST", "/release", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn release_of_unknown_user_succeeds() {
    let router = test_router();
    let (status, body) = send(&router, "POST", "/release", Some(json!({ "userId": "ghost" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn sessions_lists_assigned_users() {
    let router = test_router();
    assign(&router, "alice").await;

    let (status, body) = send(&router, "GET", "/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    let entry = &body["sessions"][0];
    assert_eq!(entry["userId"], "alice");
    assert_eq!(entry["server"], "A");
    assert_eq!(entry["port"], 177);
    assert!(entry["assignedAt"].is_string());
}

#[tokio::test]
async fn prometheus_exposition() {
    let router = test_router();
    assign(&router, "alice").await;

    let req = Request::builder()
        .uri("/metrics/prometheus")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("deskbroker_active_sessions{server=\"A\"} 1"));
    assert!(text.contains("deskbroker_assignments 1"));
}

#[tokio::test]
async fn assignments_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assignments.redb");

    let first = {
        let router = build_router(two_node_scheduler(StateStore::open(&path).unwrap()));
        let (_, body) = assign(&router, "alice").await;
        body
    };

    let scheduler = two_node_scheduler(StateStore::open(&path).unwrap());
    assert_eq!(scheduler.rehydrate().unwrap(), 1);
    let router = build_router(scheduler);

    let (_, again) = assign(&router, "alice").await;
    assert_eq!(again, first);

    let (_, metrics) = send(&router, "GET", "/metrics", None).await;
    assert_eq!(metrics["A"]["activeSessions"], 1);
}
