//! Domain types for the worker registry.

use serde::{Deserialize, Serialize};

/// Identifier for an inference workload (e.g. `llama3:8b`).
pub type ModelName = String;

/// Lifecycle state of a registered worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Serving traffic.
    Running,
    /// A stop call is in flight; not handed out to new requests.
    Draining,
}

/// One running inference worker, addressable by port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Worker {
    pub model: ModelName,
    pub host: String,
    pub port: u16,
    pub state: WorkerState,
    /// Unix timestamp (seconds) when the worker was registered.
    pub started_at: u64,
}

impl Worker {
    /// `host:port` address for proxying.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running
    }
}
