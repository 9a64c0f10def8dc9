//! WebSocket connection manager.
//!
//! Handles connection lifecycle, automatic reconnection with exponential
//! backoff and jitter, heartbeat monitoring, and subscription restoration
//! after reconnection (spec §4.1 "Reconnection").

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::message::WsMessage;
use crate::subscription::{ReadyState, SubscriptionManager};

/// One symbol subscription: a stable tag (used for ack matching) plus the
/// venue-specific JSON payload to send.
#[derive(Debug, Clone)]
pub struct SubscriptionTarget {
    pub tag: String,
    pub payload: Value,
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub ping_payload: Value,
    pub subscriptions: Vec<SubscriptionTarget>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60_000,
            heartbeat_interval_ms: 45_000,
            heartbeat_timeout_ms: 10_000,
            ping_payload: serde_json::json!({ "op": "ping" }),
            subscriptions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Manages one physical WebSocket connection's lifecycle.
///
/// This is the unit of capacity the Connection Pool (§4.2) places symbols
/// onto; one `ConnectionManager` per connection slot.
pub struct ConnectionManager {
    config: RwLock<ConnectionConfig>,
    state: Arc<RwLock<ConnectionState>>,
    subscriptions: Arc<SubscriptionManager>,
    rate_limiter: Arc<crate::rate_limiter::RateLimiter>,
    heartbeat: Arc<HeartbeatManager>,
    message_tx: mpsc::Sender<WsMessage>,
    reconnect_count: AtomicU32,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, message_tx: mpsc::Sender<WsMessage>) -> Self {
        let heartbeat = Arc::new(HeartbeatManager::new(
            config.heartbeat_interval_ms,
            config.heartbeat_timeout_ms,
        ));
        Self {
            config: RwLock::new(config),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            subscriptions: Arc::new(SubscriptionManager::new()),
            rate_limiter: Arc::new(crate::rate_limiter::RateLimiter::new(2000, 60, 100)),
            heartbeat,
            message_tx,
            reconnect_count: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.subscriptions.ready_state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Connected && self.subscriptions.is_ready()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.count()
    }

    /// Add a subscription target to be sent on the next (re)connect, and
    /// immediately if already connected. The pool calls this when placing
    /// a symbol on this connection.
    pub fn add_subscription(&self, target: SubscriptionTarget) {
        self.config.write().subscriptions.push(target);
    }

    pub fn remove_subscription_tag(&self, tag: &str) {
        self.config.write().subscriptions.retain(|t| t.tag != tag);
        self.subscriptions.remove_subscription(tag);
    }

    /// Connect and run the read/heartbeat loop until the connection drops,
    /// then reconnect with exponential backoff + jitter, forever (or until
    /// `max_reconnect_attempts` is reached).
    pub async fn run(&self) -> WsResult<()> {
        let mut attempt = 0u32;

        loop {
            *self.state.write() = ConnectionState::Connecting;

            match self.try_connect().await {
                Ok(()) => info!("websocket connection closed"),
                Err(e) => error!(error = %e, "websocket connection error"),
            }

            attempt += 1;
            self.reconnect_count.store(attempt, Ordering::Release);

            let max_attempts = self.config.read().max_reconnect_attempts;
            if max_attempts > 0 && attempt >= max_attempts {
                error!(attempt, "max reconnection attempts reached");
                return Err(WsError::ConnectionFailed(
                    "max reconnection attempts reached".to_string(),
                ));
            }

            *self.state.write() = ConnectionState::Reconnecting;

            let delay = self.calculate_backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis(), "reconnecting");
            tokio::time::sleep(delay).await;

            self.subscriptions.reset_ready_state();
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        let url = self.config.read().url.clone();
        info!(url = %url, "connecting to websocket");

        let (ws_stream, _response) = connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        *self.state.write() = ConnectionState::Connected;
        self.reconnect_count.store(0, Ordering::Release);
        info!("websocket connected");

        self.restore_subscriptions(&mut write).await?;
        self.heartbeat.reset();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "normal close".to_string()));
                            warn!(code, %reason, "websocket closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "websocket read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("websocket stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                _ = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        error!("heartbeat timeout");
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_send_heartbeat() {
                        let ping = self.config.read().ping_payload.clone();
                        let text = serde_json::to_string(&ping)?;
                        write.send(Message::Text(text)).await?;
                        self.heartbeat.record_ping();
                        debug!("sent heartbeat ping");
                    }
                }
            }
        }
    }

    async fn handle_text_message(&self, text: &str) -> WsResult<()> {
        self.heartbeat.record_message();
        self.rate_limiter.record_send();

        let value: Value = serde_json::from_str(text)?;

        // Let the subscription manager try to ack against every requested
        // tag; fra-adapter's payload shape determines what a "this tag is
        // now live" message looks like, so this is a best-effort heuristic
        // keyed off of a `"channel"`-or-`"tag"` field when present.
        if let Some(tag) = value
            .get("channel")
            .or_else(|| value.get("tag"))
            .and_then(|v| v.as_str())
        {
            self.subscriptions.handle_message(tag);
        }

        if self.message_tx.send(WsMessage::Payload(value)).await.is_err() {
            warn!("message receiver dropped");
        }

        Ok(())
    }

    async fn restore_subscriptions(
        &self,
        write: &mut futures_util::stream::SplitSink<
            tokio_tungstenite::WebSocketStream<
                tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
            >,
            Message,
        >,
    ) -> WsResult<()> {
        let targets = self.config.read().subscriptions.clone();
        info!(count = targets.len(), "restoring subscriptions");

        for target in &targets {
            let text = serde_json::to_string(&target.payload)?;
            write.send(Message::Text(text)).await?;
            self.subscriptions.add_subscription(target.tag.clone());
            // Small pacing delay so a bulk re-subscribe doesn't trip a
            // venue's burst rate limit.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        Ok(())
    }

    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let (base, max) = {
            let cfg = self.config.read();
            (cfg.reconnect_base_delay_ms, cfg.reconnect_max_delay_ms)
        };

        // Exponential backoff: base * 2^(attempt-1), capped at max.
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent).min(max);

        Duration::from_millis(delay + jitter_ms())
    }
}

/// Jitter in [0, 1000) ms, sampled from the wall clock's nanosecond field.
fn jitter_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    (nanos % 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_infinite_reconnect() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0);
        assert_eq!(config.heartbeat_interval_ms, 45_000);
    }
}
