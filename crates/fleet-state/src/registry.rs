//! Worker registry — per-model worker pools and port allocation.
//!
//! Holds every registered worker grouped by model, hands out ports from a
//! monotonic allocator, and owns the per-model provisioning guards that
//! serialize "check pool, then start or stop a worker" sequences.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::balancer::RoundRobinBalancer;
use crate::error::{StateError, StateResult};
use crate::types::{Worker, WorkerState};

/// Workers of a single model, in registration order.
#[derive(Default)]
struct ModelPool {
    workers: Vec<Worker>,
    balancer: RoundRobinBalancer,
}

impl ModelPool {
    fn position(&self, port: u16) -> Option<usize> {
        self.workers.iter().position(|w| w.port == port)
    }
}

type GuardMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

struct Shared {
    host: String,
    next_port: AtomicU32,
    pools: Mutex<BTreeMap<String, ModelPool>>,
    /// Only models whose guard is held or awaited have an entry.
    guards: Mutex<GuardMap>,
}

impl Shared {
    fn guards(&self) -> MutexGuard<'_, GuardMap> {
        self.guards.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive provisioning rights for one model.
///
/// While held, no other router call or scaling cycle can add or remove
/// workers for the same model. Dropping the guard releases it.
pub struct ModelGuard {
    model: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    shared: Arc<Shared>,
}

impl ModelGuard {
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Drop for ModelGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Entries are cloned out under this same lock, so a count of two
        // (map + self) means nobody else holds or waits on the guard.
        let mut guards = self.shared.guards();
        let unused = guards
            .get(&self.model)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) == 2);
        if unused {
            guards.remove(&self.model);
        }
    }
}

/// Shared registry of inference workers.
#[derive(Clone)]
pub struct WorkerRegistry {
    shared: Arc<Shared>,
}

impl WorkerRegistry {
    /// Create an empty registry. Ports are handed out starting at
    /// `base_port`; `host` is used in every worker endpoint.
    pub fn new(base_port: u16, host: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                host: host.into(),
                next_port: AtomicU32::new(u32::from(base_port)),
                pools: Mutex::new(BTreeMap::new()),
                guards: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.shared.host
    }

    /// Hand out the next port. Values strictly increase and are never
    /// reclaimed, so a port is never shared by two live workers.
    pub fn allocate_port(&self) -> StateResult<u16> {
        let next = self.shared.next_port.fetch_add(1, Ordering::Relaxed);
        u16::try_from(next).map_err(|_| StateError::PortsExhausted(u16::MAX))
    }

    /// Register a worker that the runtime has successfully started.
    pub fn add_worker(&self, model: &str, port: u16) -> StateResult<Worker> {
        let mut pools = self.pools();
        if let Some((owner, _)) = pools.iter().find(|(_, p)| p.position(port).is_some()) {
            return Err(StateError::PortInUse {
                port,
                model: owner.clone(),
            });
        }

        let worker = Worker {
            model: model.to_string(),
            host: self.shared.host.clone(),
            port,
            state: WorkerState::Running,
            started_at: epoch_secs(),
        };
        let pool = pools.entry(model.to_string()).or_default();
        pool.workers.push(worker.clone());

        info!(%model, port, workers = pool.workers.len(), "worker registered");
        Ok(worker)
    }

    /// Unregister a worker. Unknown workers are ignored.
    ///
    /// Removing the last worker of a model drops the model from
    /// `list_models()`.
    pub fn remove_worker(&self, model: &str, port: u16) -> Option<Worker> {
        let mut pools = self.pools();
        let pool = pools.get_mut(model)?;
        let idx = pool.position(port)?;
        let worker = pool.workers.remove(idx);
        let remaining = pool.workers.len();
        if remaining == 0 {
            pools.remove(model);
        }

        info!(%model, port, remaining, "worker unregistered");
        Some(worker)
    }

    /// Models with at least one worker, sorted by name.
    pub fn list_models(&self) -> Vec<String> {
        self.pools().keys().cloned().collect()
    }

    /// Workers of a model in registration order.
    pub fn workers(&self, model: &str) -> Vec<Worker> {
        self.pools()
            .get(model)
            .map(|p| p.workers.clone())
            .unwrap_or_default()
    }

    /// Registered workers of a model, draining ones included.
    pub fn worker_count(&self, model: &str) -> usize {
        self.pools().get(model).map_or(0, |p| p.workers.len())
    }

    /// Worker count for every model with at least one worker.
    pub fn worker_counts(&self) -> BTreeMap<String, usize> {
        self.pools()
            .iter()
            .map(|(model, pool)| (model.clone(), pool.workers.len()))
            .collect()
    }

    /// Pick a running worker of a model, round-robin.
    pub fn next_worker(&self, model: &str) -> Option<Worker> {
        let pools = self.pools();
        let pool = pools.get(model)?;
        let running: Vec<&Worker> = pool.workers.iter().filter(|w| w.is_running()).collect();
        pool.balancer.pick(&running).map(|w| (*w).clone())
    }

    /// Exclude a worker from routing while its stop call is in flight.
    pub fn mark_draining(&self, model: &str, port: u16) -> bool {
        self.set_state(model, port, WorkerState::Draining)
    }

    /// Return a worker to routing, e.g. after a failed stop.
    pub fn mark_running(&self, model: &str, port: u16) -> bool {
        self.set_state(model, port, WorkerState::Running)
    }

    /// Acquire the provisioning guard for a model.
    ///
    /// Waits while another task holds it. Guards for different models
    /// are independent.
    pub async fn lock_model(&self, model: &str) -> ModelGuard {
        let lock = Arc::clone(self.shared.guards().entry(model.to_string()).or_default());
        let guard = Arc::clone(&lock).lock_owned().await;
        debug!(%model, "model guard acquired");
        ModelGuard {
            model: model.to_string(),
            lock,
            guard: Some(guard),
            shared: Arc::clone(&self.shared),
        }
    }

    fn set_state(&self, model: &str, port: u16, state: WorkerState) -> bool {
        let mut pools = self.pools();
        let Some(worker) = pools
            .get_mut(model)
            .and_then(|p| p.workers.iter_mut().find(|w| w.port == port))
        else {
            return false;
        };
        worker.state = state;
        debug!(%model, port, ?state, "worker state changed");
        true
    }

    fn pools(&self) -> MutexGuard<'_, BTreeMap<String, ModelPool>> {
        self.shared
            .pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry() -> WorkerRegistry {
        WorkerRegistry::new(11434, "127.0.0.1")
    }

    #[test]
    fn ports_strictly_increase_from_base() {
        let reg = registry();
        let a = reg.allocate_port().unwrap();
        let b = reg.allocate_port().unwrap();
        let c = reg.allocate_port().unwrap();
        assert_eq!(a, 11434);
        assert!(a < b && b < c);
    }

    #[test]
    fn ports_are_not_reclaimed_after_removal() {
        let reg = registry();
        let port = reg.allocate_port().unwrap();
        reg.add_worker("llama", port).unwrap();
        reg.remove_worker("llama", port);

        assert_eq!(reg.allocate_port().unwrap(), port + 1);
    }

    #[test]
    fn port_space_exhaustion_is_an_error() {
        let reg = WorkerRegistry::new(u16::MAX, "127.0.0.1");
        assert_eq!(reg.allocate_port(), Ok(u16::MAX));
        assert_eq!(
            reg.allocate_port(),
            Err(StateError::PortsExhausted(u16::MAX))
        );
    }

    #[test]
    fn workers_keep_registration_order() {
        let reg = registry();
        reg.add_worker("llama", 11436).unwrap();
        reg.add_worker("llama", 11434).unwrap();
        reg.add_worker("llama", 11435).unwrap();

        let ports: Vec<u16> = reg.workers("llama").iter().map(|w| w.port).collect();
        assert_eq!(ports, vec![11436, 11434, 11435]);
        assert_eq!(reg.worker_count("llama"), 3);
    }

    #[test]
    fn duplicate_port_is_rejected() {
        let reg = registry();
        reg.add_worker("llama", 11434).unwrap();

        let err = reg.add_worker("mistral", 11434).unwrap_err();
        assert_eq!(
            err,
            StateError::PortInUse {
                port: 11434,
                model: "llama".to_string()
            }
        );
        assert_eq!(reg.worker_count("mistral"), 0);
    }

    #[test]
    fn list_models_is_sorted_and_only_non_empty() {
        let reg = registry();
        reg.add_worker("qwen", 1).unwrap();
        reg.add_worker("llama", 2).unwrap();
        reg.add_worker("mistral", 3).unwrap();
        reg.remove_worker("mistral", 3);

        assert_eq!(reg.list_models(), vec!["llama", "qwen"]);
    }

    #[test]
    fn remove_unknown_worker_is_noop() {
        let reg = registry();
        reg.add_worker("llama", 11434).unwrap();

        assert!(reg.remove_worker("llama", 9999).is_none());
        assert!(reg.remove_worker("mistral", 11434).is_none());
        assert_eq!(reg.worker_count("llama"), 1);
    }

    #[test]
    fn next_worker_round_robins_running_workers() {
        let reg = registry();
        reg.add_worker("llama", 1).unwrap();
        reg.add_worker("llama", 2).unwrap();
        reg.add_worker("llama", 3).unwrap();
        assert!(reg.mark_draining("llama", 3));

        let picked: Vec<u16> = (0..4)
            .map(|_| reg.next_worker("llama").unwrap().port)
            .collect();
        assert_eq!(picked, vec![1, 2, 1, 2]);

        assert!(reg.mark_running("llama", 3));
        assert_eq!(reg.worker_count("llama"), 3);
    }

    #[test]
    fn next_worker_none_when_all_draining() {
        let reg = registry();
        reg.add_worker("llama", 1).unwrap();
        reg.mark_draining("llama", 1);

        assert!(reg.next_worker("llama").is_none());
        assert!(reg.next_worker("unknown").is_none());
        assert!(!reg.mark_draining("unknown", 1));
    }

    #[test]
    fn worker_counts_snapshot() {
        let reg = registry();
        reg.add_worker("llama", 1).unwrap();
        reg.add_worker("llama", 2).unwrap();
        reg.add_worker("qwen", 3).unwrap();

        let counts = reg.worker_counts();
        assert_eq!(counts.get("llama"), Some(&2));
        assert_eq!(counts.get("qwen"), Some(&1));
    }

    #[tokio::test]
    async fn model_guard_is_exclusive_per_model() {
        let reg = registry();
        let held = reg.lock_model("llama").await;
        assert_eq!(held.model(), "llama");

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), reg.lock_model("llama")).await;
        assert!(blocked.is_err(), "second guard must wait");

        let other =
            tokio::time::timeout(Duration::from_millis(50), reg.lock_model("mistral")).await;
        assert!(other.is_ok(), "other models are independent");

        drop(held);
        let reacquired =
            tokio::time::timeout(Duration::from_millis(50), reg.lock_model("llama")).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn released_guards_leave_no_entries() {
        let reg = registry();
        for i in 0..1000 {
            let guard = reg.lock_model(&format!("m{i}")).await;
            drop(guard);
        }

        assert!(reg.list_models().is_empty());
        assert!(reg.shared.guards().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn guard_entry_survives_while_awaited() {
        let reg = registry();
        let held = reg.lock_model("llama").await;

        let waiter = tokio::spawn({
            let reg = reg.clone();
            async move {
                let _g = reg.lock_model("llama").await;
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The waiter still needs the same mutex, so the entry stays.
        drop(held);
        waiter.await.unwrap();

        assert!(reg.shared.guards().is_empty());
        let _again = reg.lock_model("llama").await;
        assert_eq!(reg.shared.guards().len(), 1);
    }
}
