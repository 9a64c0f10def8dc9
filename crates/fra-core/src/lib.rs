//! Core domain types for the funding-rate arbitrage engine.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Price`, `Size`, `Money`, `Rate`: precision-safe decimal newtypes.
//! - `Venue`, `Symbol`, `StreamKey`: identifiers.
//! - `FundingRate`, `RateSnapshot`, `ArbitrageOpportunity`,
//!   `OpportunityHistory`, `Position`, `Trade`, `DataSourceState`: the
//!   domain model (spec §3).
//! - `Repository`, `Keystore`: external contracts (spec §6).

pub mod decimal;
pub mod error;
pub mod ids;
pub mod model;
pub mod repository;

pub use decimal::{Money, Price, Rate, Size};
pub use error::{CoreError, Result};
pub use ids::{OpportunityId, PositionId, StreamKey, Symbol, TradeId, Venue};
pub use model::{
    ArbitrageOpportunity, BestPair, CloseReason, ConditionalOrderStatus, DataSourceState,
    DataType, DisappearReason, ExitSuggestReason, FundingRate, OpportunityHistory,
    OpportunityStatus, Position, PositionLeg, PositionStatus, RateSnapshot, SourceMode,
    SourceTag, Trade, DEFAULT_FUNDING_INTERVAL_HOURS,
};
pub use repository::{
    ApiCredential, AuditEvent, Keystore, NotificationWebhook, PositionPatch, Repository,
    TradingSettings,
};
