//! Dashboard error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("failed to bind dashboard listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("dashboard server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error(transparent)]
    Core(#[from] fra_core::error::CoreError),
}

pub type DashboardResult<T> = Result<T, DashboardError>;
