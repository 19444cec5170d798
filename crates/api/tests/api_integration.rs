//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> Router {
    let state = api::create_state(InMemoryStore::new(), dispatch::DEFAULT_SPEED_MPS);
    api::create_app(state, get_metrics_handle())
}

fn origin() -> Value {
    json!({"lat": 24.7136, "lng": 46.6753})
}

fn destination() -> Value {
    json!({"lat": 24.7743, "lng": 46.7386})
}

/// Sends one request as `actor` (`(id, role)`) and returns status and JSON body.
async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    actor: Option<(&str, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = actor {
        builder = builder
            .header("x-actor-id", id)
            .header("x-actor-role", role);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn submit(app: &Router, user: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/orders",
        Some((user, "enduser")),
        Some(json!({"origin": origin(), "destination": destination()})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let (status, body) = send(&app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    submit(&app, "user-1").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_identity_is_required() {
    let app = setup();

    let (status, body) = send(&app, "POST", "/drone/jobs/reserve", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app,
        "POST",
        "/drone/jobs/reserve",
        Some(("drone-1", "pilot")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_routes_enforce_roles() {
    let app = setup();

    let (status, _) = send(
        &app,
        "POST",
        "/drone/jobs/reserve",
        Some(("user-1", "enduser")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "GET", "/admin/orders", Some(("drone-1", "drone")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "POST",
        "/orders",
        Some(("admin-1", "admin")),
        Some(json!({"origin": origin(), "destination": destination()})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_submit_order() {
    let app = setup();

    let (status, body) = send(
        &app,
        "POST",
        "/orders",
        Some(("user-1", "enduser")),
        Some(json!({"origin": origin(), "destination": destination()})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "CREATED");
    assert_eq!(body["user_id"], "user-1");
    assert!(body["assigned_drone_id"].is_null());
}

#[tokio::test]
async fn test_submit_rejects_bad_input() {
    let app = setup();
    let user = Some(("user-1", "enduser"));

    let (status, body) = send(
        &app,
        "POST",
        "/orders",
        user,
        Some(json!({"origin": {"lat": 91.0, "lng": 0.0}, "destination": destination()})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("origin"));

    let (status, _) = send(&app, "POST", "/orders", user, Some(json!({"origin": origin()}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reserve_without_orders_is_no_content() {
    let app = setup();

    let (status, body) = send(
        &app,
        "POST",
        "/drone/jobs/reserve",
        Some(("drone-1", "drone")),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());
}

#[tokio::test]
async fn test_delivery_flow() {
    let app = setup();
    let drone = Some(("drone-1", "drone"));
    let order_id = submit(&app, "user-1").await;

    let (status, body) = send(&app, "POST", "/drone/jobs/reserve", drone, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], order_id.as_str());
    assert_eq!(body["status"], "RESERVED");
    assert_eq!(body["assigned_drone_id"], "drone-1");

    let (status, _) = send(&app, "POST", "/drone/jobs/reserve", drone, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/drone/orders/{order_id}/pickup"),
        drone,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PICKED_UP");

    let (status, body) = send(&app, "POST", "/drone/heartbeat", drone, Some(origin())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["drone"]["last_location"], origin());
    assert_eq!(body["current_order"]["order"]["id"], order_id.as_str());

    let (status, body) = send(
        &app,
        "GET",
        &format!("/orders/{order_id}"),
        Some(("user-1", "enduser")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_location"], origin());
    assert!(body["eta_seconds"].as_i64().unwrap() > 0);

    let (status, body) = send(&app, "GET", "/drone/orders/current", drone, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["id"], order_id.as_str());

    let (status, body) = send(
        &app,
        "POST",
        &format!("/drone/orders/{order_id}/deliver"),
        drone,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "DELIVERED");
    assert!(body["assigned_drone_id"].is_null());

    let (status, _) = send(&app, "GET", "/drone/orders/current", drone, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Terminal orders reject further changes.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/drone/orders/{order_id}/fail"),
        drone,
        Some(json!({"reason": "late"})),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);

    let (status, body) = send(
        &app,
        "GET",
        &format!("/orders/{order_id}"),
        Some(("user-1", "enduser")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["eta_seconds"].is_null());
}

#[tokio::test]
async fn test_only_assigned_drone_may_act() {
    let app = setup();
    let order_id = submit(&app, "user-1").await;
    send(&app, "POST", "/drone/jobs/reserve", Some(("drone-1", "drone")), None).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/drone/orders/{order_id}/pickup"),
        Some(("drone-2", "drone")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_fail_requires_reason() {
    let app = setup();
    let drone = Some(("drone-1", "drone"));
    let order_id = submit(&app, "user-1").await;
    send(&app, "POST", "/drone/jobs/reserve", drone, None).await;
    send(
        &app,
        "POST",
        &format!("/drone/orders/{order_id}/pickup"),
        drone,
        None,
    )
    .await;

    let uri = format!("/drone/orders/{order_id}/fail");
    let (status, _) = send(&app, "POST", &uri, drone, Some(json!({"reason": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        &uri,
        drone,
        Some(json!({"reason": "recipient absent"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "FAILED");
    assert_eq!(body["failure_reason"], "recipient absent");
}

#[tokio::test]
async fn test_order_visibility() {
    let app = setup();
    let order_id = submit(&app, "user-1").await;
    let uri = format!("/orders/{order_id}");

    let (status, _) = send(&app, "GET", &uri, Some(("user-2", "enduser")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "GET", &uri, Some(("admin-1", "admin")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["user_id"], "user-1");
    assert_eq!(body["current_location"], origin());

    let (status, _) = send(&app, "GET", "/orders/not-a-uuid", Some(("user-1", "enduser")), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = format!("/orders/{}", common::OrderId::new());
    let (status, _) = send(&app, "GET", &missing, Some(("user-1", "enduser")), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_withdraw() {
    let app = setup();
    let order_id = submit(&app, "user-1").await;
    let uri = format!("/orders/{order_id}/withdraw");

    let (status, _) = send(&app, "POST", &uri, Some(("user-2", "enduser")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "POST", &uri, Some(("user-1", "enduser")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "WITHDRAWN");

    let (status, _) = send(&app, "POST", &uri, Some(("user-1", "enduser")), None).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_broken_drone_hands_off_order() {
    let app = setup();
    let first = Some(("drone-1", "drone"));
    let order_id = submit(&app, "user-1").await;
    send(&app, "POST", "/drone/jobs/reserve", first, None).await;
    send(
        &app,
        "POST",
        &format!("/drone/orders/{order_id}/pickup"),
        first,
        None,
    )
    .await;
    let drop_point = json!({"lat": 24.74, "lng": 46.70});
    send(&app, "POST", "/drone/heartbeat", first, Some(drop_point.clone())).await;

    let (status, body) = send(&app, "POST", "/drone/broken", first, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "BROKEN");

    let admin = Some(("admin-1", "admin"));
    let (status, body) = send(
        &app,
        "GET",
        "/admin/orders?status=HANDOFF_REQUESTED",
        admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let orders = body.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["order"]["handoff_origin"], drop_point);

    let (status, body) = send(
        &app,
        "POST",
        "/drone/jobs/reserve",
        Some(("drone-2", "drone")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], order_id.as_str());
    assert_eq!(body["origin"], drop_point);
}

#[tokio::test]
async fn test_admin_orders() {
    let app = setup();
    let admin = Some(("admin-1", "admin"));
    let order_id = submit(&app, "user-1").await;
    submit(&app, "user-2").await;

    let (status, body) = send(&app, "GET", "/admin/orders?limit=1", admin, None).await;
    assert_eq!(status, StatusCode::OK);
    let orders = body.as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["order"]["id"], order_id.as_str());

    let (status, _) = send(&app, "GET", "/admin/orders?status=LOST", admin, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/admin/orders/{order_id}");
    let new_destination = json!({"lat": 24.80, "lng": 46.80});
    let (status, body) = send(
        &app,
        "PATCH",
        &uri,
        admin,
        Some(json!({"destination": new_destination})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["destination"], new_destination);
    assert_eq!(body["origin"], origin());

    let (status, _) = send(&app, "PATCH", &uri, admin, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_drones() {
    let app = setup();
    let admin = Some(("admin-1", "admin"));
    send(&app, "POST", "/drone/heartbeat", Some(("drone-b", "drone")), Some(origin())).await;
    send(&app, "POST", "/drone/heartbeat", Some(("drone-a", "drone")), Some(origin())).await;

    let (status, body) = send(&app, "GET", "/admin/drones", admin, None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["drone-a", "drone-b"]);

    let (status, body) = send(&app, "POST", "/admin/drones/drone-a/broken", admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "BROKEN");

    submit(&app, "user-1").await;
    let (status, _) = send(
        &app,
        "POST",
        "/drone/jobs/reserve",
        Some(("drone-a", "drone")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);

    let (status, body) = send(&app, "POST", "/admin/drones/drone-a/fixed", admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ACTIVE");
}
