//! Broadcast plumbing: a periodic full-snapshot pump plus a relay that
//! forwards each component's domain events onto connected WebSocket
//! clients as they happen (spec §6 Event channel).

use std::time::Duration;

use fra_core::repository::Repository;
use fra_detector::DetectorEvent;
use fra_executor::{CloserEvent, TriggerEvent};
use fra_feed::AggregatorEvent;
use fra_position::PositionMonitorEvent;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::state::DashboardState;
use crate::types::{DashboardEvent, DashboardMessage};

/// Periodically collect and broadcast a full state snapshot.
pub async fn run_snapshot_broadcaster<R: Repository>(
    state: DashboardState<R>,
    tx: broadcast::Sender<String>,
    interval_ms: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        interval.tick().await;
        match state.collect_snapshot().await {
            Ok(snapshot) => {
                let msg = DashboardMessage::Snapshot(snapshot);
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if tx.send(json).is_err() {
                            trace!("no WebSocket receivers connected");
                        }
                    }
                    Err(e) => debug!(error = %e, "failed to serialize dashboard snapshot"),
                }
            }
            Err(e) => warn!(error = %e, "failed to collect dashboard snapshot"),
        }
    }
}

/// Forward every component's events onto the broadcast channel as they
/// arrive, independent of the periodic snapshot cadence.
#[allow(clippy::too_many_arguments)]
pub async fn run_event_relay(
    mut aggregator_rx: broadcast::Receiver<AggregatorEvent>,
    mut detector_rx: broadcast::Receiver<DetectorEvent>,
    mut position_rx: broadcast::Receiver<PositionMonitorEvent>,
    mut trigger_rx: broadcast::Receiver<TriggerEvent>,
    mut closer_rx: broadcast::Receiver<CloserEvent>,
    tx: broadcast::Sender<String>,
) {
    loop {
        let event = tokio::select! {
            e = aggregator_rx.recv() => match e {
                Ok(e) => DashboardEvent::Aggregator(e),
                Err(broadcast::error::RecvError::Lagged(n)) => { warn!(skipped = n, "dashboard relay lagged on aggregator events"); continue; }
                Err(broadcast::error::RecvError::Closed) => { debug!("aggregator event channel closed, ending relay"); break; }
            },
            e = detector_rx.recv() => match e {
                Ok(e) => DashboardEvent::Detector(e),
                Err(broadcast::error::RecvError::Lagged(n)) => { warn!(skipped = n, "dashboard relay lagged on detector events"); continue; }
                Err(broadcast::error::RecvError::Closed) => { debug!("detector event channel closed, ending relay"); break; }
            },
            e = position_rx.recv() => match e {
                Ok(e) => DashboardEvent::PositionMonitor(e),
                Err(broadcast::error::RecvError::Lagged(n)) => { warn!(skipped = n, "dashboard relay lagged on position-monitor events"); continue; }
                Err(broadcast::error::RecvError::Closed) => { debug!("position-monitor event channel closed, ending relay"); break; }
            },
            e = trigger_rx.recv() => match e {
                Ok(e) => DashboardEvent::Trigger(e),
                Err(broadcast::error::RecvError::Lagged(n)) => { warn!(skipped = n, "dashboard relay lagged on trigger events"); continue; }
                Err(broadcast::error::RecvError::Closed) => { debug!("trigger event channel closed, ending relay"); break; }
            },
            e = closer_rx.recv() => match e {
                Ok(e) => DashboardEvent::Closer(e),
                Err(broadcast::error::RecvError::Lagged(n)) => { warn!(skipped = n, "dashboard relay lagged on closer events"); continue; }
                Err(broadcast::error::RecvError::Closed) => { debug!("closer event channel closed, ending relay"); break; }
            },
        };

        let msg = DashboardMessage::Event(event);
        match serde_json::to_string(&msg) {
            Ok(json) => {
                let _ = tx.send(json);
            }
            Err(e) => debug!(error = %e, "failed to serialize dashboard event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_channel_delivers_to_subscribers() {
        let (tx, _rx) = broadcast::channel::<String>(16);
        let mut rx2 = tx.subscribe();
        tx.send("test".to_string()).unwrap();
        assert_eq!(rx2.recv().await.unwrap(), "test");
    }
}
