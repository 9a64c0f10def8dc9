//! Opportunity Detector (spec §4.6).
//!
//! Consumes `rate-updated` aggregator snapshots and maintains
//! `ArbitrageOpportunity` lifecycle transitions (ACTIVE → EXPIRED/CLOSED)
//! through the shared `Repository` contract.

pub mod config;
pub mod detector;
pub mod error;

pub use config::DetectorConfig;
pub use detector::{DetectorEvent, OpportunityDetector};
pub use error::{DetectorError, DetectorResult};
