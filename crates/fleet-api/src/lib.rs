//! fleet-api — HTTP surface of the ollama-fleet daemon.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/v1/generate` | Route to a worker of `model` and proxy to its `/api/generate` |
//! | GET | `/models` | Models with at least one worker |
//! | GET | `/health` | Liveness |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;
pub mod proxy;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};

use fleet_autoscale::ScalingStatus;
use fleet_router::RequestRouter;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub router: RequestRouter,
    pub scaling: ScalingStatus,
}

/// Build the complete HTTP router.
pub fn build_router(state: ApiState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/v1/generate", post(handlers::generate))
        .route("/models", get(handlers::list_models))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::prometheus_metrics))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
