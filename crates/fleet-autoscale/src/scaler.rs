//! Scaling engine — the periodic reconcile loop.
//!
//! Each cycle drains the demand tracker, takes one GPU reading, and for
//! every model in the registry moves the worker count towards the
//! policy's target. A model's reconciliation holds that model's
//! provisioning guard, so it never races the router's lazy provisioning.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use fleet_metrics::{DemandTracker, MetricsProbe, ScalingMetrics};
use fleet_runtime::ContainerRuntime;
use fleet_state::WorkerRegistry;

use crate::policy::ScalingPolicy;

/// What one cycle did for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelOutcome {
    pub model: String,
    pub requests: u64,
    pub workers_before: usize,
    /// Raw policy result, before the one-worker floor.
    pub desired: usize,
    pub target: usize,
    pub started: Vec<u16>,
    pub stopped: Vec<u16>,
    pub failures: usize,
}

impl ModelOutcome {
    pub fn workers_after(&self) -> usize {
        self.workers_before + self.started.len() - self.stopped.len()
    }
}

/// Result of one scaling cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub metrics: ScalingMetrics,
    pub models: Vec<ModelOutcome>,
}

impl CycleReport {
    pub fn outcome(&self, model: &str) -> Option<&ModelOutcome> {
        self.models.iter().find(|o| o.model == model)
    }
}

#[derive(Default)]
struct StatusInner {
    cycles: u64,
    last: Option<CycleReport>,
}

/// Read-only view of the engine's progress, shared with the API.
#[derive(Clone, Default)]
pub struct ScalingStatus {
    inner: Arc<Mutex<StatusInner>>,
}

impl ScalingStatus {
    /// Completed cycles since startup.
    pub fn cycles(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cycles
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last
            .clone()
    }

    fn record(&self, report: CycleReport) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.cycles += 1;
        inner.last = Some(report);
    }
}

/// Periodically resizes every model's worker pool.
pub struct ScalingEngine {
    registry: WorkerRegistry,
    demand: DemandTracker,
    probe: Arc<dyn MetricsProbe>,
    runtime: Arc<dyn ContainerRuntime>,
    policy: ScalingPolicy,
    status: ScalingStatus,
}

impl ScalingEngine {
    pub fn new(
        registry: WorkerRegistry,
        demand: DemandTracker,
        probe: Arc<dyn MetricsProbe>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            registry,
            demand,
            probe,
            runtime,
            policy: ScalingPolicy::default(),
            status: ScalingStatus::default(),
        }
    }

    pub fn with_policy(mut self, policy: ScalingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    /// Handle for observing cycles from elsewhere.
    pub fn status(&self) -> ScalingStatus {
        self.status.clone()
    }

    /// Run one scaling cycle.
    ///
    /// Only models present in the registry are considered. Demand for
    /// any other model is discarded with the drain.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut demand = self.demand.drain();
        let metrics = self.probe.read().await;
        let models = self.registry.list_models();

        debug!(
            models = models.len(),
            gpu_pct = metrics.gpu_utilization_pct,
            vram_mb = metrics.vram_used_mb,
            "scaling cycle started"
        );

        let mut outcomes = Vec::with_capacity(models.len());
        for model in models {
            let requests = demand.remove(&model).unwrap_or(0);
            outcomes.push(self.reconcile(&model, requests, &metrics).await);
        }

        if !demand.is_empty() {
            debug!(
                unregistered = demand.len(),
                "discarded demand for models without workers"
            );
        }

        let report = CycleReport {
            metrics,
            models: outcomes,
        };
        self.status.record(report.clone());
        report
    }

    async fn reconcile(
        &self,
        model: &str,
        requests: u64,
        metrics: &ScalingMetrics,
    ) -> ModelOutcome {
        let _guard = self.registry.lock_model(model).await;

        let workers = self.registry.worker_count(model);
        let desired = self.policy.desired_worker_count(requests, metrics);
        let target = desired.max(1);

        let mut outcome = ModelOutcome {
            model: model.to_string(),
            requests,
            workers_before: workers,
            desired,
            target,
            started: Vec::new(),
            stopped: Vec::new(),
            failures: 0,
        };

        // The last worker was removed between listing and locking.
        if workers == 0 {
            return outcome;
        }

        if target > workers {
            self.scale_up(model, target - workers, &mut outcome).await;
        } else if target < workers {
            self.scale_down(model, workers - target, &mut outcome).await;
        } else {
            debug!(%model, workers, requests, "already at target");
        }

        outcome
    }

    async fn scale_up(&self, model: &str, count: usize, outcome: &mut ModelOutcome) {
        for _ in 0..count {
            let port = match self.registry.allocate_port() {
                Ok(port) => port,
                Err(e) => {
                    error!(%model, error = %e, "cannot allocate port for scale-up");
                    outcome.failures += 1;
                    return;
                }
            };

            if let Err(e) = self.runtime.start(model, port).await {
                warn!(%model, port, error = %e, "failed to scale up");
                outcome.failures += 1;
                return;
            }

            match self.registry.add_worker(model, port) {
                Ok(_) => outcome.started.push(port),
                Err(e) => {
                    error!(%model, port, error = %e, "started worker could not be registered");
                    outcome.failures += 1;
                    return;
                }
            }
        }

        info!(
            %model,
            from = outcome.workers_before,
            to = outcome.workers_after(),
            requests = outcome.requests,
            "scaled up"
        );
    }

    async fn scale_down(&self, model: &str, count: usize, outcome: &mut ModelOutcome) {
        // Most recently added first.
        let victims: Vec<u16> = self
            .registry
            .workers(model)
            .iter()
            .rev()
            .take(count)
            .map(|w| w.port)
            .collect();

        for port in victims {
            if self.registry.worker_count(model) <= 1 {
                break;
            }

            self.registry.mark_draining(model, port);
            match self.runtime.stop(model, port).await {
                Ok(()) => {
                    self.registry.remove_worker(model, port);
                    outcome.stopped.push(port);
                }
                Err(e) => {
                    self.registry.mark_running(model, port);
                    warn!(%model, port, error = %e, "failed to scale down");
                    outcome.failures += 1;
                }
            }
        }

        info!(
            %model,
            from = outcome.workers_before,
            to = outcome.workers_after(),
            requests = outcome.requests,
            "scaled down"
        );
    }

    /// Run cycles every `interval` until shutdown.
    ///
    /// Cycles run one at a time on this task; a tick that comes due while
    /// a cycle is still running is skipped rather than queued.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "scaling engine started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the first cycle waits a
        // full interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    let failures: usize = report.models.iter().map(|o| o.failures).sum();
                    if failures > 0 {
                        warn!(failures, "scaling cycle finished with failures");
                    }
                }
                _ = shutdown.changed() => {
                    info!("scaling engine shutting down");
                    break;
                }
            }
        }
    }
}
