//! HTTP handlers.
//!
//! `/v1/generate` routes through the `RequestRouter` and proxies to the
//! chosen worker; the rest read shared state and answer with JSON or
//! Prometheus text.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use fleet_metrics::Exposition;
use fleet_router::RouterError;

use crate::ApiState;
use crate::proxy;

/// Path of the worker inference endpoint.
const WORKER_GENERATE_PATH: &str = "/api/generate";

/// Body of `POST /v1/generate`. Unknown fields pass through to the
/// worker untouched.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub context: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
    pub count: usize,
    pub workers: BTreeMap<String, usize>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ErrorBody {
            error: msg.to_string(),
        }),
    )
        .into_response()
}

/// POST /v1/generate
pub async fn generate(State(state): State<ApiState>, body: Bytes) -> Response {
    let req: GenerateRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            debug!(error = %e, "rejecting malformed generate request");
            return error_response("Invalid request format", StatusCode::BAD_REQUEST);
        }
    };

    let worker = match state.router.route(&req.model).await {
        Ok(worker) => worker,
        Err(RouterError::InvalidModel(_)) => {
            return error_response("Invalid request format", StatusCode::BAD_REQUEST);
        }
        Err(e) => {
            return error_response(
                &format!("Failed to start model: {e}"),
                StatusCode::SERVICE_UNAVAILABLE,
            );
        }
    };

    match proxy::forward_json(&worker.endpoint(), WORKER_GENERATE_PATH, body).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(model = %req.model, endpoint = %worker.endpoint(), error = %e, "forwarding failed");
            error_response("Model service unavailable", StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// GET /models
pub async fn list_models(State(state): State<ApiState>) -> Json<ModelsResponse> {
    let workers = state.router.registry().worker_counts();
    let models: Vec<String> = workers.keys().cloned().collect();
    Json(ModelsResponse {
        count: models.len(),
        models,
        workers,
    })
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let exposition = Exposition {
        workers: state.router.registry().worker_counts(),
        pending_requests: state.router.demand().pending_all(),
        last_reading: state.scaling.last_report().map(|r| r.metrics),
        cycles: state.scaling.cycles(),
    };

    let body = fleet_metrics::render_prometheus(&exposition);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
