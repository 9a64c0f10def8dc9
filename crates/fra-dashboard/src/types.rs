//! Dashboard API types: the JSON shapes served over REST and WebSocket.

use std::collections::HashMap;

use fra_core::model::{ArbitrageOpportunity, Position};
use fra_detector::DetectorEvent;
use fra_executor::{CloserEvent, TriggerEvent};
use fra_feed::AggregatorEvent;
use fra_position::PositionMonitorEvent;
use serde::Serialize;

/// Full state snapshot, sent on WebSocket connect and from `/api/snapshot`.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub timestamp_ms: i64,
    /// Per-symbol rate snapshots (spec §3 `RateSnapshot`), keyed by symbol.
    pub rate_snapshots: HashMap<String, fra_core::model::RateSnapshot>,
    pub active_opportunities: Vec<ArbitrageOpportunity>,
    pub open_positions: Vec<Position>,
}

/// Domain events relayed onto connected WebSocket clients as they occur,
/// in addition to the periodic full snapshot (spec §6 Event channel).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source")]
pub enum DashboardEvent {
    Aggregator(AggregatorEvent),
    Detector(DetectorEvent),
    PositionMonitor(PositionMonitorEvent),
    Trigger(TriggerEvent),
    Closer(CloserEvent),
}

/// WebSocket message envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMessage {
    Snapshot(DashboardSnapshot),
    Event(DashboardEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes_with_empty_collections() {
        let snapshot = DashboardSnapshot {
            timestamp_ms: 1_706_400_000_000,
            rate_snapshots: HashMap::new(),
            active_opportunities: Vec::new(),
            open_positions: Vec::new(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"timestamp_ms\":1706400000000"));
    }

    #[test]
    fn message_is_tagged_by_variant() {
        let msg = DashboardMessage::Snapshot(DashboardSnapshot {
            timestamp_ms: 0,
            rate_snapshots: HashMap::new(),
            active_opportunities: Vec::new(),
            open_positions: Vec::new(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"snapshot\""));
    }
}
