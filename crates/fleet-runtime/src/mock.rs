//! In-memory runtime for tests and dry runs.
//!
//! Records every call in order and can be told to fail starts or stops,
//! or to delay starts so concurrent callers overlap.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{ContainerRuntime, RuntimeError, RuntimeResult};

/// One recorded runtime invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Start { model: String, port: u16 },
    Stop { model: String, port: u16 },
}

#[derive(Default)]
struct MockState {
    calls: Mutex<Vec<RuntimeCall>>,
    fail_starts: AtomicBool,
    fail_stops: AtomicBool,
    /// Starts allowed to succeed before every later start fails.
    start_budget: AtomicUsize,
    budgeted: AtomicBool,
    start_delay: Mutex<Option<Duration>>,
}

/// Cloneable fake runtime; clones share the call log.
#[derive(Clone, Default)]
pub struct MockRuntime {
    state: Arc<MockState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `start` before succeeding.
    pub fn with_start_delay(self, delay: Duration) -> Self {
        *self
            .state
            .start_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(delay);
        self
    }

    pub fn fail_starts(&self, fail: bool) {
        self.state.fail_starts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_stops(&self, fail: bool) {
        self.state.fail_stops.store(fail, Ordering::SeqCst);
    }

    /// Let the next `n` starts succeed, then fail every later one.
    pub fn fail_starts_after(&self, n: usize) {
        self.state.start_budget.store(n, Ordering::SeqCst);
        self.state.budgeted.store(true, Ordering::SeqCst);
    }

    /// Every call so far, in order. Failed calls are included.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.log().clone()
    }

    pub fn start_count(&self, model: &str) -> usize {
        self.log()
            .iter()
            .filter(|c| matches!(c, RuntimeCall::Start { model: m, .. } if m == model))
            .count()
    }

    pub fn stop_count(&self, model: &str) -> usize {
        self.log()
            .iter()
            .filter(|c| matches!(c, RuntimeCall::Stop { model: m, .. } if m == model))
            .count()
    }

    /// Ports passed to `stop`, in call order.
    pub fn stopped_ports(&self, model: &str) -> Vec<u16> {
        self.log()
            .iter()
            .filter_map(|c| match c {
                RuntimeCall::Stop { model: m, port } if m == model => Some(*port),
                _ => None,
            })
            .collect()
    }

    fn log(&self) -> MutexGuard<'_, Vec<RuntimeCall>> {
        self.state
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn start_allowed(&self) -> bool {
        if self.state.fail_starts.load(Ordering::SeqCst) {
            return false;
        }
        if !self.state.budgeted.load(Ordering::SeqCst) {
            return true;
        }
        self.state
            .start_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn start(&self, model: &str, port: u16) -> RuntimeResult<()> {
        self.log().push(RuntimeCall::Start {
            model: model.to_string(),
            port,
        });

        let delay = *self
            .state
            .start_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !self.start_allowed() {
            debug!(%model, port, "mock start failing");
            return Err(RuntimeError::Rejected {
                model: model.to_string(),
                port,
                reason: "start failure injected".to_string(),
            });
        }
        Ok(())
    }

    async fn stop(&self, model: &str, port: u16) -> RuntimeResult<()> {
        self.log().push(RuntimeCall::Stop {
            model: model.to_string(),
            port,
        });

        if self.state.fail_stops.load(Ordering::SeqCst) {
            return Err(RuntimeError::Rejected {
                model: model.to_string(),
                port,
                reason: "stop failure injected".to_string(),
            });
        }
        Ok(())
    }
}
