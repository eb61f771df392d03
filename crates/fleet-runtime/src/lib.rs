//! fleet-runtime — the capability that starts and stops workers.
//!
//! The control plane never shells out directly; it talks to a
//! [`ContainerRuntime`]. Calls are slow, fallible and not idempotent: a
//! failed `start` may still have left a container behind. Callers log
//! failures and retry on the next request or scaling cycle.
//!
//! # Implementations
//!
//! ```text
//! ContainerRuntime
//!   ├── DockerRuntime  docker run / docker stop, detached model pull
//!   └── MockRuntime    in-memory call log with injectable failures
//! ```

pub mod docker;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

pub use docker::DockerRuntime;
pub use mock::{MockRuntime, RuntimeCall};

/// Result type alias for runtime calls.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// A start or stop call that did not succeed.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("`{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("runtime rejected {model}:{port}: {reason}")]
    Rejected {
        model: String,
        port: u16,
        reason: String,
    },
}

/// Starts and stops inference workers bound to a model and host port.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Launch a worker for `model` listening on `port`.
    async fn start(&self, model: &str, port: u16) -> RuntimeResult<()>;

    /// Stop the worker for `model` on `port`.
    async fn stop(&self, model: &str, port: u16) -> RuntimeResult<()>;
}
