//! Data-Source Manager (spec §4.3).
//!
//! Tracks, per `(venue, dataType)`, whether the engine is currently
//! streaming over WebSocket, polling over REST, or running both
//! (`Hybrid`, used while probing WebSocket recovery). Detects staleness
//! and emits a `stale` event on a fixed interval so downstream consumers
//! (dashboard, notifier) can surface it without polling state themselves.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use fra_core::ids::Venue;
use fra_core::model::{DataSourceState, DataType, SourceMode};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Data is considered stale after this much time without an update,
/// unless overridden per call site.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(90);
/// How often the staleness sweep re-checks every tracked stream.
pub const STALE_CHECK_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub venue: Venue,
    pub data_type: DataType,
}

/// Emitted when a stream's state changes in a way other components care
/// about.
#[derive(Debug, Clone)]
pub enum DataSourceEvent {
    ModeChanged {
        venue: Venue,
        data_type: DataType,
        mode: SourceMode,
        reason: String,
    },
    Stale {
        venue: Venue,
        data_type: DataType,
    },
    Recovered {
        venue: Venue,
        data_type: DataType,
    },
}

/// Owns every `(venue, dataType)` stream's `DataSourceState` and the
/// staleness sweep.
pub struct DataSourceManager {
    states: DashMap<StreamKey, DataSourceState>,
    stale_threshold: chrono::Duration,
    events_tx: broadcast::Sender<DataSourceEvent>,
}

impl DataSourceManager {
    pub fn new(stale_threshold: Duration) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            states: DashMap::new(),
            stale_threshold: chrono::Duration::from_std(stale_threshold)
                .unwrap_or_else(|_| chrono::Duration::seconds(90)),
            events_tx,
        })
    }

    pub fn events(&self) -> broadcast::Receiver<DataSourceEvent> {
        self.events_tx.subscribe()
    }

    fn key(venue: &Venue, data_type: DataType) -> StreamKey {
        StreamKey {
            venue: venue.clone(),
            data_type,
        }
    }

    /// Register a stream, defaulting to WebSocket mode, if not already
    /// tracked.
    pub fn ensure_tracked(&self, venue: &Venue, data_type: DataType) {
        self.states
            .entry(Self::key(venue, data_type))
            .or_insert_with(|| DataSourceState::new(venue.clone(), data_type));
    }

    pub fn state(&self, venue: &Venue, data_type: DataType) -> Option<DataSourceState> {
        self.states.get(&Self::key(venue, data_type)).map(|s| s.clone())
    }

    pub fn switch_mode(&self, venue: &Venue, data_type: DataType, mode: SourceMode, reason: &str) {
        self.ensure_tracked(venue, data_type);
        if let Some(mut entry) = self.states.get_mut(&Self::key(venue, data_type)) {
            if entry.mode != mode {
                info!(%venue, ?data_type, ?mode, reason, "data source mode switched");
                entry.mode = mode;
                entry.last_switch_reason = Some(reason.to_string());
                let _ = self.events_tx.send(DataSourceEvent::ModeChanged {
                    venue: venue.clone(),
                    data_type,
                    mode,
                    reason: reason.to_string(),
                });
            }
        }
    }

    pub fn disable_websocket(&self, venue: &Venue, data_type: DataType, reason: &str) {
        self.ensure_tracked(venue, data_type);
        if let Some(mut entry) = self.states.get_mut(&Self::key(venue, data_type)) {
            entry.websocket_available = false;
        }
        self.switch_mode(venue, data_type, SourceMode::Rest, reason);
    }

    pub fn enable_websocket(&self, venue: &Venue, data_type: DataType) {
        self.ensure_tracked(venue, data_type);
        if let Some(mut entry) = self.states.get_mut(&Self::key(venue, data_type)) {
            entry.websocket_available = true;
        }
        self.switch_mode(venue, data_type, SourceMode::Websocket, "websocket available");
    }

    /// Probe WebSocket recovery by running both transports (`Hybrid`)
    /// until the caller confirms the WebSocket leg is healthy again, at
    /// which point it should call `enable_websocket`.
    pub fn try_recover_websocket(&self, venue: &Venue, data_type: DataType) {
        self.ensure_tracked(venue, data_type);
        self.switch_mode(venue, data_type, SourceMode::Hybrid, "probing websocket recovery");
    }

    pub fn update_last_data_received(&self, venue: &Venue, data_type: DataType, latency_ms: Option<u64>) {
        self.ensure_tracked(venue, data_type);
        let was_stale = self
            .state(venue, data_type)
            .map(|s| s.is_stale(Utc::now(), self.stale_threshold))
            .unwrap_or(false);

        if let Some(mut entry) = self.states.get_mut(&Self::key(venue, data_type)) {
            entry.last_data_received_at = Some(Utc::now());
            entry.current_latency_ms = latency_ms;
        }

        if was_stale {
            let _ = self.events_tx.send(DataSourceEvent::Recovered {
                venue: venue.clone(),
                data_type,
            });
        }
    }

    /// One pass of the staleness sweep: emits `Stale` for every tracked
    /// stream whose last update exceeds the configured threshold.
    pub fn check_staleness(&self) {
        let now = Utc::now();
        for entry in self.states.iter() {
            if entry.is_stale(now, self.stale_threshold) {
                warn!(venue = %entry.venue, data_type = ?entry.data_type, "data source stale");
                let _ = self.events_tx.send(DataSourceEvent::Stale {
                    venue: entry.venue.clone(),
                    data_type: entry.data_type,
                });
            }
        }
    }

    /// Spawn the periodic staleness sweep. Returns the task handle so the
    /// caller can abort it on shutdown.
    pub fn spawn_staleness_sweep(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STALE_CHECK_INTERVAL);
            loop {
                ticker.tick().await;
                manager.check_staleness();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stream_defaults_to_websocket() {
        let manager = DataSourceManager::new(Duration::from_secs(90));
        let venue = Venue::new("okx");
        manager.ensure_tracked(&venue, DataType::FundingRate);
        let state = manager.state(&venue, DataType::FundingRate).unwrap();
        assert_eq!(state.mode, SourceMode::Websocket);
    }

    #[test]
    fn disable_websocket_switches_to_rest() {
        let manager = DataSourceManager::new(Duration::from_secs(90));
        let venue = Venue::new("okx");
        manager.disable_websocket(&venue, DataType::FundingRate, "heartbeat timeout");
        let state = manager.state(&venue, DataType::FundingRate).unwrap();
        assert_eq!(state.mode, SourceMode::Rest);
        assert!(!state.websocket_available);
    }

    #[test]
    fn check_staleness_emits_event_for_old_data() {
        let manager = DataSourceManager::new(Duration::from_millis(10));
        let venue = Venue::new("okx");
        manager.ensure_tracked(&venue, DataType::FundingRate);
        manager.update_last_data_received(&venue, DataType::FundingRate, Some(5));

        std::thread::sleep(Duration::from_millis(20));

        let mut rx = manager.events();
        manager.check_staleness();

        let event = rx.try_recv().expect("expected a stale event");
        assert!(matches!(event, DataSourceEvent::Stale { .. }));
    }
}
