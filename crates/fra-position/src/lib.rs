//! Position Exit Monitor (spec §4.7): watches OPEN hedge positions for
//! funding-rate erosion or lockable profit and raises/clears exit
//! suggestions accordingly.

pub mod config;
pub mod error;
pub mod exit_monitor;

pub use config::ExitMonitorConfig;
pub use error::{PositionError, PositionResult};
pub use exit_monitor::{PositionExitMonitor, PositionMonitorEvent};
