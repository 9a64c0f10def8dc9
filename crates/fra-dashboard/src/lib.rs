//! fra-dashboard - JSON/WebSocket monitoring surface for fra-bot (spec §6).
//!
//! Exposes the engine's current state and live event stream over HTTP:
//!
//! - `GET /healthz` - liveness probe
//! - `GET /api/snapshot` - current rate/opportunity/position snapshot
//! - `GET /ws` - WebSocket upgrade, pushing a periodic full snapshot plus
//!   every component's domain events as they happen
//!
//! # Usage
//!
//! ```ignore
//! use fra_dashboard::{broadcast::run_event_relay, run_server, DashboardConfig, DashboardState};
//! use tokio::sync::broadcast;
//!
//! let (tx, _rx) = broadcast::channel(1024);
//! let dashboard_state = DashboardState::new(aggregator.clone(), repository.clone());
//!
//! tokio::spawn(run_event_relay(
//!     aggregator.events(),
//!     detector.events(),
//!     exit_monitor.events(),
//!     trigger_detector.events(),
//!     closer.events(),
//!     tx.clone(),
//! ));
//! tokio::spawn(run_server(dashboard_state, tx, DashboardConfig::default()));
//! ```

pub mod broadcast;
mod config;
mod error;
mod server;
mod state;
mod types;

pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use server::run_server;
pub use state::DashboardState;
pub use types::{DashboardEvent, DashboardMessage, DashboardSnapshot};
