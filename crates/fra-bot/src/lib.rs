//! Real-time cross-exchange funding-rate arbitrage engine.
//!
//! Orchestrates every `fra-*` component into one running process:
//! - WebSocket ingestion of each registered venue's funding/mark-price
//!   pushes, with REST polling running alongside as a fallback
//! - Rate aggregation/normalization and opportunity detection
//! - Position exit suggestions and conditional-order trigger handling
//! - Webhook notification fan-out
//! - A JSON/WebSocket dashboard surface

pub mod app;
pub mod config;
pub mod error;
pub mod keystore;

pub use app::{build, Application, DefaultApplication};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
