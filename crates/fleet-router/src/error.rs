//! Router error types.

use thiserror::Error;

/// Errors surfaced to the caller of `route`.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid model name: {0:?}")]
    InvalidModel(String),

    #[error("failed to start model {model}: {source}")]
    Provisioning {
        model: String,
        #[source]
        source: fleet_runtime::RuntimeError,
    },

    #[error("registry error: {0}")]
    Registry(#[from] fleet_state::StateError),
}

pub type RouterResult<T> = Result<T, RouterError>;
