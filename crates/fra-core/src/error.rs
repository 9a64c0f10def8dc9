//! Shared error kind for fra-core and the adapter/transport boundary.
//!
//! Every variant corresponds to one error kind from spec §7 so call sites
//! can match on kind rather than inspect message text.

use thiserror::Error;

/// Core error kinds shared across adapter, transport, and validation
/// boundaries (spec §7).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Network/connection failure talking to a venue (WS or REST).
    #[error("transport error: {0}")]
    Transport(String),

    /// Venue rejected the request due to rate limiting.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// Venue returned a well-formed error response.
    #[error("venue API error: {0}")]
    ApiError(String),

    /// No credential is configured for a venue that requires one.
    #[error("credential missing for venue: {0}")]
    CredentialMissing(String),

    /// A configured credential was rejected by the venue.
    #[error("credential invalid for venue: {0}")]
    CredentialInvalid(String),

    /// A channel subscription did not confirm within the configured timeout.
    #[error("subscribe timeout: {0}")]
    SubscribeTimeout(String),

    /// Data for a stream has exceeded its staleness threshold.
    #[error("data stale: {0}")]
    DataStale(String),

    /// Input failed a structural or semantic validation check.
    #[error("validation error: {0}")]
    Validation(String),

    /// The outcome of an operation could not be determined (e.g. a close
    /// order whose ack was never observed).
    #[error("uncertain outcome: {0}")]
    Uncertain(String),

    /// The operation conflicts with the current state of its target.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
