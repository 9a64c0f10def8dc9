//! Top-level application error, composing every component's error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Covers `fra_core`, `fra_adapter`, `fra_datasource`, `fra_feed` and
    /// `fra_notifier` errors: those crates' error types are all aliases of
    /// `fra_core::error::CoreError`, so a single `From` impl covers them.
    #[error(transparent)]
    Core(#[from] fra_core::error::CoreError),

    #[error(transparent)]
    Detector(#[from] fra_detector::DetectorError),

    #[error(transparent)]
    Position(#[from] fra_position::PositionError),

    #[error(transparent)]
    Executor(#[from] fra_executor::ExecutorError),

    #[error(transparent)]
    Telemetry(#[from] fra_telemetry::TelemetryError),

    #[error(transparent)]
    Persistence(#[from] fra_persistence::PersistenceError),

    #[error(transparent)]
    Dashboard(#[from] fra_dashboard::DashboardError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("preflight check failed: {0}")]
    Preflight(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("shutdown requested")]
    Shutdown,
}

pub type AppResult<T> = Result<T, AppError>;
