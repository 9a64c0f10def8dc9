//! Connection Pool (spec §4.2).
//!
//! A venue may cap the number of symbols a single WebSocket connection may
//! subscribe to (e.g. OKX 100, Gate.io 20, BingX 50). The pool spreads
//! symbol subscriptions across as many `ConnectionManager`s as needed to
//! stay under that cap, adds connections on demand, and prunes connections
//! that have gone empty once more than one connection exists.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::connection::{ConnectionConfig, ConnectionManager, SubscriptionTarget};
use crate::error::{WsError, WsResult};
use crate::message::WsMessage;

/// An event re-emitted from the pool, tagged with which connection slot it
/// arrived on (useful for diagnostics and for per-connection health views
/// in the dashboard).
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A raw payload arrived on connection `connection_index`.
    Message {
        connection_index: usize,
        payload: Value,
    },
    /// The number of live connections in the pool changed.
    ConnectionCountChanged { count: usize },
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub url: String,
    /// Maximum symbols per physical connection. Venue-specific.
    pub max_symbols_per_connection: usize,
    pub connection: ConnectionConfig,
}

struct Slot {
    manager: Arc<ConnectionManager>,
    handle: JoinHandle<()>,
    tags: RwLock<Vec<String>>,
}

/// Spreads a venue's symbol subscriptions across multiple connections.
pub struct ConnectionPool {
    config: PoolConfig,
    slots: RwLock<Vec<Slot>>,
    events_tx: broadcast::Sender<PoolEvent>,
    destroyed: Arc<std::sync::atomic::AtomicBool>,
    next_index: AtomicUsize,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            config,
            slots: RwLock::new(Vec::new()),
            events_tx,
            destroyed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            next_index: AtomicUsize::new(0),
        }
    }

    pub fn events(&self) -> broadcast::Receiver<PoolEvent> {
        self.events_tx.subscribe()
    }

    pub fn connection_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Subscribe one symbol, placing it on an existing connection with
    /// spare capacity or opening a new connection if none has room.
    pub async fn subscribe(&self, tag: String, payload: Value) -> WsResult<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(WsError::PoolDestroyed);
        }

        let target_index = {
            let slots = self.slots.read();
            slots
                .iter()
                .position(|s| s.tags.read().len() < self.config.max_symbols_per_connection)
        };

        let index = match target_index {
            Some(i) => i,
            None => self.add_connection().await?,
        };

        let slots = self.slots.read();
        let slot = &slots[index];
        slot.manager.add_subscription(SubscriptionTarget {
            tag: tag.clone(),
            payload: payload.clone(),
        });
        slot.tags.write().push(tag);

        Ok(())
    }

    /// Subscribe many symbols at once, filling existing connections before
    /// opening new ones. Symbols that subscribe successfully remain
    /// subscribed even if a later one fails; the failed `(tag, error)`
    /// pairs are returned rather than aborting the whole batch.
    pub async fn subscribe_all(&self, targets: Vec<(String, Value)>) -> Vec<(String, WsError)> {
        let mut failures = Vec::new();
        for (tag, payload) in targets {
            if let Err(e) = self.subscribe(tag.clone(), payload).await {
                failures.push((tag, e));
            }
        }
        failures
    }

    /// Remove a symbol from whichever connection holds it. If that
    /// connection becomes empty and more than one connection remains, it
    /// is pruned.
    pub async fn unsubscribe(&self, tag: &str) -> WsResult<()> {
        let mut prune_index = None;
        {
            let slots = self.slots.read();
            for (i, slot) in slots.iter().enumerate() {
                let mut tags = slot.tags.write();
                if let Some(pos) = tags.iter().position(|t| t == tag) {
                    tags.remove(pos);
                    slot.manager.remove_subscription_tag(tag);
                    if tags.is_empty() && slots.len() > 1 {
                        prune_index = Some(i);
                    }
                    break;
                }
            }
        }

        if let Some(i) = prune_index {
            self.prune_connection(i);
        }

        Ok(())
    }

    /// Tear down every connection and mark the pool destroyed. Further
    /// calls to `subscribe`/`subscribe_all` fail with `PoolDestroyed`.
    pub fn unsubscribe_all(&self) {
        self.destroyed.store(true, Ordering::Release);
        let mut slots = self.slots.write();
        for slot in slots.drain(..) {
            slot.handle.abort();
        }
        let _ = self.events_tx.send(PoolEvent::ConnectionCountChanged { count: 0 });
    }

    /// Opens a new connection and returns its *positional* index in
    /// `slots` at the moment it was pushed. Callers must use this index
    /// immediately (no `.await` in between) since a concurrent prune can
    /// shift later positions. The pool-wide `connection_index` used to tag
    /// `PoolEvent`s is a separate, never-reused counter so diagnostics stay
    /// stable across pruning.
    async fn add_connection(&self) -> WsResult<usize> {
        let (tx, mut rx) = mpsc::channel::<WsMessage>(256);

        let mut config = self.config.connection.clone();
        config.url = self.config.url.clone();
        let manager = Arc::new(ConnectionManager::new(config, tx));

        let connection_index = self.next_index.fetch_add(1, Ordering::AcqRel);
        let events_tx = self.events_tx.clone();
        let run_manager = Arc::clone(&manager);

        let handle = tokio::spawn(async move {
            if let Err(e) = run_manager.run().await {
                warn!(connection_index, error = %e, "connection pool slot terminated");
            }
        });

        let forward_events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let WsMessage::Payload(payload) = msg {
                    let _ = forward_events_tx.send(PoolEvent::Message {
                        connection_index,
                        payload,
                    });
                }
            }
        });

        let index = {
            let mut slots = self.slots.write();
            slots.push(Slot {
                manager,
                handle,
                tags: RwLock::new(Vec::new()),
            });
            slots.len() - 1
        };

        let count = self.connection_count();
        info!(count, "connection pool opened new slot");
        let _ = events_tx.send(PoolEvent::ConnectionCountChanged { count });

        Ok(index)
    }

    fn prune_connection(&self, index: usize) {
        let removed = {
            let mut slots = self.slots.write();
            if index < slots.len() {
                Some(slots.remove(index))
            } else {
                None
            }
        };

        if let Some(slot) = removed {
            slot.handle.abort();
            let count = self.connection_count();
            info!(count, "connection pool pruned empty slot");
            let _ = self
                .events_tx
                .send(PoolEvent::ConnectionCountChanged { count });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PoolConfig {
        PoolConfig {
            url: "wss://example.invalid/ws".to_string(),
            max_symbols_per_connection: 2,
            connection: ConnectionConfig::default(),
        }
    }

    #[test]
    fn pool_starts_with_no_connections() {
        let pool = ConnectionPool::new(test_config());
        assert_eq!(pool.connection_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_all_destroys_pool() {
        let pool = ConnectionPool::new(test_config());
        pool.unsubscribe_all();
        let result = pool.subscribe("x".to_string(), serde_json::json!({})).await;
        assert!(matches!(result, Err(WsError::PoolDestroyed)));
    }

    /// subscribe A, subscribe B (opens a second connection), unsubscribe A
    /// (prunes slot 0, shifting B down to slot 0), then subscribe C. C must
    /// land in a valid slot rather than indexing past `slots` using the
    /// monotonic connection counter.
    #[tokio::test]
    async fn subscribe_after_prune_does_not_panic() {
        let mut config = test_config();
        config.max_symbols_per_connection = 1;
        let pool = ConnectionPool::new(config);

        pool.subscribe("a".to_string(), serde_json::json!({})).await.unwrap();
        pool.subscribe("b".to_string(), serde_json::json!({})).await.unwrap();
        assert_eq!(pool.connection_count(), 2);

        pool.unsubscribe("a").await.unwrap();
        assert_eq!(pool.connection_count(), 1);

        pool.subscribe("c".to_string(), serde_json::json!({})).await.unwrap();
        assert_eq!(pool.connection_count(), 2);
    }

    #[tokio::test]
    async fn subscribe_all_collects_failures_without_aborting_batch() {
        let pool = ConnectionPool::new(test_config());
        pool.unsubscribe_all();

        let failures = pool
            .subscribe_all(vec![
                ("a".to_string(), serde_json::json!({})),
                ("b".to_string(), serde_json::json!({})),
            ])
            .await;

        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|(_, e)| matches!(e, WsError::PoolDestroyed)));
    }
}
