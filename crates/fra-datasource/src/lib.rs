//! Data-Source Manager (spec §4.3): per-`(venue, dataType)` transport
//! mode tracking, staleness detection, and WebSocket/REST failover.

pub mod error;
pub mod manager;

pub use error::{DataSourceError, DataSourceResult};
pub use manager::{
    DataSourceEvent, DataSourceManager, StreamKey, DEFAULT_STALE_THRESHOLD, STALE_CHECK_INTERVAL,
};
