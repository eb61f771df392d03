//! Request router — maps a model name to a live worker.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use fleet_metrics::DemandTracker;
use fleet_runtime::ContainerRuntime;
use fleet_state::{Worker, WorkerRegistry};

use crate::error::{RouterError, RouterResult};

/// Routes requests to workers, provisioning the first worker of a model
/// on demand.
#[derive(Clone)]
pub struct RequestRouter {
    registry: WorkerRegistry,
    demand: DemandTracker,
    runtime: Arc<dyn ContainerRuntime>,
}

impl RequestRouter {
    pub fn new(
        registry: WorkerRegistry,
        demand: DemandTracker,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            registry,
            demand,
            runtime,
        }
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn demand(&self) -> &DemandTracker {
        &self.demand
    }

    /// Return a worker for `model`, starting one if the model has none.
    ///
    /// The request is counted towards demand whether or not a worker
    /// could be found. A failed start is returned to the caller and not
    /// retried here.
    pub async fn route(&self, model: &str) -> RouterResult<Worker> {
        if model.trim().is_empty() || model.chars().any(char::is_control) {
            return Err(RouterError::InvalidModel(model.to_string()));
        }

        self.demand.record(model);

        if let Some(worker) = self.registry.next_worker(model) {
            debug!(%model, port = worker.port, "routed to existing worker");
            return Ok(worker);
        }

        let _guard = self.registry.lock_model(model).await;

        // Another request or the scaling engine may have provisioned
        // while this one waited for the guard.
        if let Some(worker) = self.registry.next_worker(model) {
            debug!(%model, port = worker.port, "routed to worker provisioned concurrently");
            return Ok(worker);
        }

        let port = self.registry.allocate_port()?;
        info!(%model, port, "no worker for model, provisioning");

        if let Err(source) = self.runtime.start(model, port).await {
            warn!(%model, port, error = %source, "provisioning failed");
            return Err(RouterError::Provisioning {
                model: model.to_string(),
                source,
            });
        }

        match self.registry.add_worker(model, port) {
            Ok(worker) => Ok(worker),
            Err(e) => {
                error!(%model, port, error = %e, "started worker could not be registered, stopping it");
                if let Err(stop_err) = self.runtime.stop(model, port).await {
                    warn!(%model, port, error = %stop_err, "failed to stop unregistered worker");
                }
                Err(e.into())
            }
        }
    }

    /// Models that currently have at least one worker, sorted.
    pub fn list_active_models(&self) -> Vec<String> {
        self.registry.list_models()
    }
}
