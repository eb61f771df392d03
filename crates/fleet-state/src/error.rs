//! Error types for the worker registry.

use thiserror::Error;

/// Result type alias for registry operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("port space exhausted (last allocated: {0})")]
    PortsExhausted(u16),

    #[error("port {port} is already held by a worker of {model}")]
    PortInUse { port: u16, model: String },
}
