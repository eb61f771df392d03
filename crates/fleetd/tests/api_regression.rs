//! API regression tests.
//!
//! Drives the full axum router with `oneshot`: health, model listing,
//! metrics, request validation, provisioning failures, and proxying to a
//! live worker.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use http_body_util::BodyExt;
use tower::ServiceExt;

use fleet_api::{ApiState, build_router};
use fleet_autoscale::ScalingStatus;
use fleet_metrics::DemandTracker;
use fleet_router::RequestRouter;
use fleet_runtime::MockRuntime;
use fleet_state::WorkerRegistry;

const BODY_LIMIT: usize = 16 * 1024 * 1024;

fn test_app(base_port: u16, runtime: MockRuntime) -> (Router, RequestRouter) {
    let router = RequestRouter::new(
        WorkerRegistry::new(base_port, "127.0.0.1"),
        DemandTracker::new(),
        Arc::new(runtime),
    );
    let app = build_router(
        ApiState {
            router: router.clone(),
            scaling: ScalingStatus::default(),
        },
        BODY_LIMIT,
    );
    (app, router)
}

fn generate_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/generate")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Serve a stand-in worker `/api/generate` on an ephemeral port.
async fn spawn_fake_worker() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let app = Router::new().route(
        "/api/generate",
        post(|body: String| async move {
            let req: serde_json::Value = serde_json::from_str(&body).unwrap();
            axum::Json(serde_json::json!({
                "model": req["model"],
                "response": format!("echo: {}", req["prompt"].as_str().unwrap_or_default()),
                "done": true,
            }))
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

#[tokio::test]
async fn health_is_healthy() {
    let (app, _) = test_app(11434, MockRuntime::new());

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "healthy");
}

#[tokio::test]
async fn models_empty_then_populated() {
    let (app, router) = test_app(11434, MockRuntime::new());

    let req = Request::builder().uri("/models").body(Body::empty()).unwrap();
    let json = body_json(app.clone().oneshot(req).await.unwrap()).await;
    assert_eq!(json["count"], 0);

    router.registry().add_worker("llama", 20000).unwrap();

    let req = Request::builder().uri("/models").body(Body::empty()).unwrap();
    let json = body_json(app.oneshot(req).await.unwrap()).await;
    assert_eq!(json["models"], serde_json::json!(["llama"]));
    assert_eq!(json["count"], 1);
    assert_eq!(json["workers"]["llama"], 1);
}

#[tokio::test]
async fn metrics_endpoint_returns_text() {
    let (app, router) = test_app(11434, MockRuntime::new());
    router.registry().add_worker("llama", 20000).unwrap();

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("ollama_fleet_workers{model=\"llama\"} 1"));
}

#[tokio::test]
async fn invalid_body_is_rejected_without_side_effects() {
    let runtime = MockRuntime::new();
    let (app, router) = test_app(11434, runtime.clone());

    let resp = app.oneshot(generate_request("not json")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(runtime.calls().is_empty());
    assert!(router.demand().pending_all().is_empty());
}

#[tokio::test]
async fn provisioning_failure_is_503_and_retried_next_request() {
    let runtime = MockRuntime::new();
    runtime.fail_starts(true);
    // Low ports so the forward below hits nothing.
    let (app, router) = test_app(1, runtime.clone());

    let resp = app
        .clone()
        .oneshot(generate_request(r#"{"model":"llama","prompt":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(router.list_active_models().is_empty());

    // Nothing listens on the fresh port, so this one fails at the forward.
    runtime.fail_starts(false);
    let resp = app
        .oneshot(generate_request(r#"{"model":"llama","prompt":"hi"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["error"], "Model service unavailable");
    assert_eq!(runtime.start_count("llama"), 2);
    assert_eq!(router.registry().worker_count("llama"), 1);
}

#[tokio::test]
async fn generate_provisions_and_proxies_to_worker() {
    let worker_port = spawn_fake_worker().await;
    let runtime = MockRuntime::new();
    let (app, router) = test_app(worker_port, runtime.clone());

    let resp = app
        .clone()
        .oneshot(generate_request(
            r#"{"model":"llama","prompt":"hello","stream":false}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["model"], "llama");
    assert_eq!(json["response"], "echo: hello");
    assert_eq!(runtime.start_count("llama"), 1);

    // A second request reuses the worker.
    let resp = app
        .oneshot(generate_request(r#"{"model":"llama","prompt":"again"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(runtime.start_count("llama"), 1);
    assert_eq!(router.demand().pending("llama"), 2);
}
