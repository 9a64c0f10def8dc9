//! Shared glue between an adapter's `events_tx` and a per-venue
//! [`fra_ws::ConnectionPool`] (spec §4.1 "WebSocket adapters additionally
//! expose an event channel"; §4.2 Connection Pool).
//!
//! Every concrete adapter owns one `WsIngest`: it places symbol
//! subscriptions on the pool under the venue's per-connection cap, and
//! relays whatever raw JSON payloads arrive back out as typed
//! [`AdapterEvent`]s via a venue-supplied parse function.

use std::sync::Arc;

use fra_ws::{ConnectionPool, PoolConfig, PoolEvent};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

use crate::adapter::AdapterEvent;
use crate::error::{AdapterError, AdapterResult};

pub struct WsIngest {
    pool: Arc<ConnectionPool>,
}

impl WsIngest {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            pool: Arc::new(ConnectionPool::new(config)),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.pool.connection_count()
    }

    pub async fn subscribe(&self, tag: String, payload: Value) -> AdapterResult<()> {
        self.pool
            .subscribe(tag, payload)
            .await
            .map_err(|e| AdapterError::SubscribeTimeout(e.to_string()))
    }

    pub async fn unsubscribe(&self, tag: &str) -> AdapterResult<()> {
        self.pool
            .unsubscribe(tag)
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))
    }

    /// Tear down every connection in this venue's pool (adapter
    /// `disconnect()`).
    pub fn shutdown(&self) {
        self.pool.unsubscribe_all();
    }

    /// Spawn the relay task: every raw payload the pool emits is handed
    /// to `parse`; a `Some(event)` is forwarded onto `events_tx`.
    /// Connection-count changes are logged but not forwarded (the
    /// adapter's `Connected`/`Disconnected` events come from the pool's
    /// underlying per-connection state, not from slot count).
    pub fn spawn_relay<F>(self: &Arc<Self>, events_tx: broadcast::Sender<AdapterEvent>, parse: F)
    where
        F: Fn(Value) -> Option<AdapterEvent> + Send + Sync + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::spawn(async move {
            let mut events = pool.events();
            loop {
                match events.recv().await {
                    Ok(PoolEvent::Message { payload, .. }) => {
                        if let Some(event) = parse(payload) {
                            let _ = events_tx.send(event);
                        }
                    }
                    Ok(PoolEvent::ConnectionCountChanged { count }) => {
                        tracing::debug!(count, "ws pool connection count changed");
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "ws ingest relay lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
