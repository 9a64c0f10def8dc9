//! Executor error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Order submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("position {0} already has a close in flight")]
    CloseInProgress(fra_core::ids::PositionId),

    #[error(transparent)]
    Core(#[from] fra_core::error::CoreError),

    #[error(transparent)]
    Adapter(#[from] fra_adapter::AdapterError),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
