//! Position error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Position not found: {0}")]
    NotFound(String),

    #[error("Position limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Invalid position state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Core(#[from] fra_core::error::CoreError),

    #[error(transparent)]
    Adapter(#[from] fra_adapter::AdapterError),
}

pub type PositionResult<T> = Result<T, PositionError>;
