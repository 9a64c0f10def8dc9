//! Prometheus metrics and structured logging for the funding-rate
//! arbitrage engine.
//!
//! Provides observability from Day 1:
//! - Prometheus metrics for rate updates, opportunity lifecycle, triggers,
//!   position closes, and webhook delivery
//! - Structured JSON logging with tracing

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
