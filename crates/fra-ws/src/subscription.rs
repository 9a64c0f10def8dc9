//! Subscription state tracking for one WebSocket connection.
//!
//! Tracks which symbols are subscribed on this connection and whether all
//! of them have been acknowledged by the venue (READY state), tracking
//! each symbol by an opaque subscription tag string.

use std::collections::HashSet;

use parking_lot::RwLock;

/// Readiness of a connection's full subscription set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// No subscriptions requested yet.
    Empty,
    /// Subscriptions requested but not all acknowledged.
    Pending,
    /// Every requested subscription has been acknowledged.
    Ready,
}

/// Tracks subscribed tags and which have been acknowledged by the venue.
pub struct SubscriptionManager {
    requested: RwLock<HashSet<String>>,
    acknowledged: RwLock<HashSet<String>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            requested: RwLock::new(HashSet::new()),
            acknowledged: RwLock::new(HashSet::new()),
        }
    }

    /// Record that a subscription tag was requested (sent to the venue).
    pub fn add_subscription(&self, tag: impl Into<String>) {
        self.requested.write().insert(tag.into());
    }

    /// Record that a subscription tag was removed.
    pub fn remove_subscription(&self, tag: &str) {
        self.requested.write().remove(tag);
        self.acknowledged.write().remove(tag);
    }

    /// Record that the venue acknowledged a subscription tag (e.g. a
    /// channel-subscribed confirmation message arrived).
    pub fn handle_message(&self, tag: &str) {
        if self.requested.read().contains(tag) {
            self.acknowledged.write().insert(tag.to_string());
        }
    }

    /// Reset acknowledgement state, keeping the requested set intact, so
    /// reconnection re-establishes subscriptions from the adapter's own
    /// subscribed-set (spec §4.1 "Reconnection").
    pub fn reset_ready_state(&self) {
        self.acknowledged.write().clear();
    }

    pub fn is_ready(&self) -> bool {
        self.ready_state() == ReadyState::Ready
    }

    pub fn ready_state(&self) -> ReadyState {
        let requested = self.requested.read();
        if requested.is_empty() {
            return ReadyState::Empty;
        }
        let acknowledged = self.acknowledged.read();
        if requested.iter().all(|t| acknowledged.contains(t)) {
            ReadyState::Ready
        } else {
            ReadyState::Pending
        }
    }

    pub fn subscribed_tags(&self) -> Vec<String> {
        self.requested.read().iter().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.requested.read().len()
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_transitions() {
        let mgr = SubscriptionManager::new();
        assert_eq!(mgr.ready_state(), ReadyState::Empty);

        mgr.add_subscription("fundingRate:BTC-USDT");
        assert_eq!(mgr.ready_state(), ReadyState::Pending);

        mgr.handle_message("fundingRate:BTC-USDT");
        assert_eq!(mgr.ready_state(), ReadyState::Ready);
    }

    #[test]
    fn reset_clears_only_acks() {
        let mgr = SubscriptionManager::new();
        mgr.add_subscription("a");
        mgr.handle_message("a");
        assert!(mgr.is_ready());

        mgr.reset_ready_state();
        assert_eq!(mgr.ready_state(), ReadyState::Pending);
        assert_eq!(mgr.count(), 1);
    }
}
