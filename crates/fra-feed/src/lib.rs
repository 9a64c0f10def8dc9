//! Rate Normalizer and Rate Aggregator/Cache (spec §4.4, §4.5).
//!
//! Converts a venue's funding rate to an equivalent rate at a target
//! settlement basis, and maintains the in-memory per-symbol
//! `venue -> FundingRate` cache that derives each symbol's `bestPair`.

pub mod aggregator;
pub mod error;
pub mod normalizer;

pub use aggregator::{
    AggregatedSnapshot, AggregatorEvent, RateAggregator, SpreadBand, DEFAULT_TARGET_BASIS_HOURS,
    STANDARD_BASES,
};
pub use error::{FeedError, FeedResult};
pub use normalizer::{interval_or_default, is_allowed_basis, normalize, ALLOWED_BASES};
