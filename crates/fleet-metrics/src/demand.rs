//! Demand tracker — per-model request counts between scaling cycles.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Counts routed requests per model since the last `drain()`.
///
/// Cloning shares the underlying counters.
#[derive(Clone, Default)]
pub struct DemandTracker {
    counts: Arc<Mutex<HashMap<String, u64>>>,
}

impl DemandTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request for `model`.
    pub fn record(&self, model: &str) {
        let mut counts = self.counts();
        match counts.get_mut(model) {
            Some(n) => *n += 1,
            None => {
                counts.insert(model.to_string(), 1);
            }
        }
    }

    /// Take every counter and reset them to zero in one step.
    ///
    /// Models without requests since the previous drain are omitted.
    pub fn drain(&self) -> HashMap<String, u64> {
        let drained = std::mem::take(&mut *self.counts());
        debug!(models = drained.len(), "demand drained");
        drained
    }

    /// Requests recorded for `model` since the last drain.
    pub fn pending(&self, model: &str) -> u64 {
        self.counts().get(model).copied().unwrap_or(0)
    }

    /// All pending counts, sorted by model.
    pub fn pending_all(&self) -> BTreeMap<String, u64> {
        self.counts()
            .iter()
            .map(|(model, n)| (model.clone(), *n))
            .collect()
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
