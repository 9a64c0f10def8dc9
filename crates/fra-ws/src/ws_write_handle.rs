//! WebSocket write handle for sending messages.
//!
//! Provides a fire-and-forget sending API decoupled from the connection's
//! read loop, so callers don't need direct access to the split sink.

use crate::connection::ConnectionState;
use crate::rate_limiter::RateLimiter;
use crate::subscription::SubscriptionManager;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound message to be sent via WebSocket.
#[derive(Debug)]
pub enum WsOutbound {
    /// Plain text message (subscriptions, ping, etc.).
    Text(String),
    /// Order-related request with tracking ID, subject to the inflight cap.
    Post {
        /// Request ID for response correlation.
        post_id: u64,
        /// JSON payload to send.
        payload: String,
    },
}

/// Error type for post operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostError {
    /// Rate limit exceeded.
    RateLimited,
    /// Channel closed (WebSocket disconnected or shutting down).
    ChannelClosed,
    /// Connection is not open.
    NotReady,
}

impl std::fmt::Display for PostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::ChannelClosed => write!(f, "channel closed"),
            Self::NotReady => write!(f, "not ready"),
        }
    }
}

impl std::error::Error for PostError {}

/// Write handle for sending messages to WebSocket.
///
/// Channel-based, reconnect-safe, and avoids lifetime issues with direct
/// access to the split sink owned by the connection's read loop.
#[derive(Clone)]
pub struct WsWriteHandle {
    tx: mpsc::Sender<WsOutbound>,
    rate_limiter: Arc<RateLimiter>,
    state: Arc<RwLock<ConnectionState>>,
    subscriptions: Arc<SubscriptionManager>,
}

impl WsWriteHandle {
    pub fn new(
        tx: mpsc::Sender<WsOutbound>,
        rate_limiter: Arc<RateLimiter>,
        state: Arc<RwLock<ConnectionState>>,
        subscriptions: Arc<SubscriptionManager>,
    ) -> Self {
        Self {
            tx,
            rate_limiter,
            state,
            subscriptions,
        }
    }

    /// Send an order-related request (fire-and-forget).
    ///
    /// Does NOT wait for a response; the response arrives via the message
    /// stream and is matched by the caller using `post_id`.
    pub async fn post(&self, post_id: u64, payload: String) -> Result<(), PostError> {
        if !self.is_connected() {
            return Err(PostError::NotReady);
        }

        if !self.rate_limiter.can_send_post() {
            return Err(PostError::RateLimited);
        }

        self.tx
            .send(WsOutbound::Post { post_id, payload })
            .await
            .map_err(|_| PostError::ChannelClosed)?;

        self.rate_limiter.record_post_send();
        debug!(post_id, "post queued for sending");

        Ok(())
    }

    /// Send a raw text message (subscriptions, ping, etc.). Not subject to
    /// the inflight-post cap since subscription traffic is low frequency.
    pub async fn send_text(&self, text: String) -> Result<(), PostError> {
        if !self.is_connected() {
            return Err(PostError::NotReady);
        }

        self.tx
            .send(WsOutbound::Text(text))
            .await
            .map_err(|_| PostError::ChannelClosed)?;

        Ok(())
    }

    /// True once the connection is open and every requested subscription
    /// has been acknowledged by the venue.
    pub fn is_ready(&self) -> bool {
        let state = *self.state.read();
        state == ConnectionState::Connected && self.subscriptions.is_ready() && !self.tx.is_closed()
    }

    /// True once the connection is open, regardless of subscription state.
    pub fn is_connected(&self) -> bool {
        let state = *self.state.read();
        state == ConnectionState::Connected && !self.tx.is_closed()
    }

    pub fn inflight_count(&self) -> u32 {
        self.rate_limiter.inflight_count()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;

    fn create_test_handle() -> (WsWriteHandle, mpsc::Receiver<WsOutbound>) {
        let (tx, rx) = mpsc::channel(100);
        let rate_limiter = Arc::new(RateLimiter::new(2000, 60, 100));
        let state = Arc::new(RwLock::new(ConnectionState::Connected));
        let subscriptions = Arc::new(SubscriptionManager::new());

        subscriptions.add_subscription("fundingRate:BTC-USDT");
        subscriptions.handle_message("fundingRate:BTC-USDT");

        let handle = WsWriteHandle::new(tx, rate_limiter, state, subscriptions);
        (handle, rx)
    }

    #[tokio::test]
    async fn test_post_success() {
        let (handle, mut rx) = create_test_handle();

        let result = handle.post(1, "test payload".to_string()).await;
        assert!(result.is_ok());

        let msg = rx.recv().await.unwrap();
        match msg {
            WsOutbound::Post { post_id, payload } => {
                assert_eq!(post_id, 1);
                assert_eq!(payload, "test payload");
            }
            _ => panic!("expected Post message"),
        }

        assert_eq!(handle.inflight_count(), 1);
    }

    #[tokio::test]
    async fn test_post_not_ready_disconnected() {
        let (tx, _rx) = mpsc::channel(100);
        let rate_limiter = Arc::new(RateLimiter::new(2000, 60, 100));
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let subscriptions = Arc::new(SubscriptionManager::new());

        let handle = WsWriteHandle::new(tx, rate_limiter, state, subscriptions);

        let result = handle.post(1, "test".to_string()).await;
        assert_eq!(result, Err(PostError::NotReady));
    }

    #[tokio::test]
    async fn test_send_text_success() {
        let (handle, mut rx) = create_test_handle();

        let result = handle.send_text("subscription msg".to_string()).await;
        assert!(result.is_ok());

        let msg = rx.recv().await.unwrap();
        match msg {
            WsOutbound::Text(text) => {
                assert_eq!(text, "subscription msg");
            }
            _ => panic!("expected Text message"),
        }
    }

    #[tokio::test]
    async fn test_is_ready() {
        let (handle, _rx) = create_test_handle();
        assert!(handle.is_ready());
        assert!(handle.is_connected());
    }

    #[tokio::test]
    async fn test_is_connected_without_acks() {
        let (tx, _rx) = mpsc::channel(100);
        let rate_limiter = Arc::new(RateLimiter::new(2000, 60, 100));
        let state = Arc::new(RwLock::new(ConnectionState::Connected));
        let subscriptions = Arc::new(SubscriptionManager::new());

        subscriptions.add_subscription("fundingRate:BTC-USDT");

        let handle = WsWriteHandle::new(tx, rate_limiter, state, subscriptions);

        assert!(handle.is_connected());
        assert!(!handle.is_ready());
    }
}
