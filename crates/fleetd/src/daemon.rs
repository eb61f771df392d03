//! Daemon wiring — builds every subsystem from a `FleetConfig` and runs
//! the scaling loop next to the HTTP server until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use fleet_api::{ApiState, build_router};
use fleet_autoscale::{ScalingEngine, ScalingPolicy};
use fleet_core::{FleetConfig, ProbeKind};
use fleet_metrics::{DemandTracker, MetricsProbe, NvidiaSmiProbe, StaticProbe};
use fleet_router::RequestRouter;
use fleet_runtime::{ContainerRuntime, DockerRuntime};
use fleet_state::WorkerRegistry;

fn build_probe(config: &FleetConfig) -> Arc<dyn MetricsProbe> {
    match config.metrics.probe {
        ProbeKind::NvidiaSmi => Arc::new(NvidiaSmiProbe::new()),
        ProbeKind::Static => Arc::new(StaticProbe::new(
            config.metrics.static_gpu_pct,
            config.metrics.static_vram_mb,
        )),
    }
}

pub async fn run(config: FleetConfig) -> anyhow::Result<()> {
    info!("ollama-fleet daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let registry = WorkerRegistry::new(config.workers.base_port, config.workers.host.clone());
    let demand = DemandTracker::new();
    info!(base_port = config.workers.base_port, host = %config.workers.host, "worker registry initialized");

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::new(&config.workers));
    info!(image = %config.workers.image, "docker runtime initialized");

    let probe = build_probe(&config);
    info!(probe = ?config.metrics.probe, "metrics probe initialized");

    let engine = ScalingEngine::new(registry.clone(), demand.clone(), probe, runtime.clone())
        .with_policy(ScalingPolicy::from(&config.scaling));
    let scaling = engine.status();
    info!(interval_secs = config.scaling.interval_secs, "scaling engine initialized");

    let router = RequestRouter::new(registry, demand, runtime);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let interval = config.scaling.interval();
    let engine_handle = tokio::spawn(async move {
        engine.run(interval, shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let app = build_router(ApiState { router, scaling }, config.server.max_body_bytes);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = engine_handle.await;

    info!("ollama-fleet daemon stopped");
    Ok(())
}
