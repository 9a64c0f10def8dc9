//! WebSocket transport layer shared by every exchange adapter.
//!
//! Provides robust WebSocket connectivity with:
//! - Automatic reconnection with exponential backoff and jitter
//! - Subscription management and READY state tracking
//! - Heartbeat monitoring
//! - Rate limiting (per-venue message-rate and inflight-request caps)
//! - Channel-based message routing, venue-agnostic (raw JSON payloads)

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod pool;
pub mod rate_limiter;
pub mod subscription;
pub mod ws_write_handle;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, SubscriptionTarget};
pub use error::{WsError, WsResult};
pub use message::{WsMessage, WsRequest};
pub use pool::{ConnectionPool, PoolConfig, PoolEvent};
pub use rate_limiter::RateLimiter;
pub use subscription::{ReadyState, SubscriptionManager};
pub use ws_write_handle::{PostError, WsOutbound, WsWriteHandle};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider. Must be called before any
/// WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
