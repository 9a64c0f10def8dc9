//! Dashboard state aggregation.
//!
//! `DashboardState` pulls together the Rate Aggregator's per-symbol cache
//! and the `Repository`'s opportunity/position records into one snapshot
//! for the REST and WebSocket surfaces.

use std::sync::Arc;

use chrono::Utc;
use fra_core::repository::Repository;
use fra_feed::RateAggregator;

use crate::types::DashboardSnapshot;

const ACTIVE_OPPORTUNITIES_LIMIT: usize = 500;

#[derive(Clone)]
pub struct DashboardState<R: Repository> {
    aggregator: Arc<RateAggregator>,
    repository: Arc<R>,
}

impl<R: Repository> DashboardState<R> {
    pub fn new(aggregator: Arc<RateAggregator>, repository: Arc<R>) -> Self {
        Self { aggregator, repository }
    }

    pub fn aggregator(&self) -> &Arc<RateAggregator> {
        &self.aggregator
    }

    /// Collect a full snapshot of the current engine state.
    pub async fn collect_snapshot(&self) -> fra_core::error::Result<DashboardSnapshot> {
        let timestamp_ms = Utc::now().timestamp_millis();

        let symbols = self.aggregator.symbols();
        let mut rate_snapshots = std::collections::HashMap::with_capacity(symbols.len());
        let mut open_positions = Vec::new();
        for symbol in &symbols {
            if let Some(snapshot) = self.aggregator.snapshot(symbol) {
                rate_snapshots.insert(symbol.as_str().to_string(), snapshot);
            }
            open_positions.extend(self.repository.find_open_positions_by_symbol(symbol.as_str()).await?);
        }

        let active_opportunities = self.repository.find_all_active_opportunities(ACTIVE_OPPORTUNITIES_LIMIT).await?;

        Ok(DashboardSnapshot { timestamp_ms, rate_snapshots, active_opportunities, open_positions })
    }
}

impl<R: Repository> std::fmt::Debug for DashboardState<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardState")
            .field("tracked_symbols", &self.aggregator.symbols().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fra_core::ids::Symbol;
    use fra_core::model::{FundingRate, SourceTag};
    use fra_persistence::InMemoryRepository;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn snapshot_reflects_tracked_symbols_and_repository_state() {
        let aggregator = Arc::new(RateAggregator::new(8));
        let repository = Arc::new(InMemoryRepository::new());
        let state = DashboardState::new(aggregator.clone(), repository);

        let symbol = Symbol::new("BTCUSDT");
        aggregator
            .update(
                &symbol,
                FundingRate {
                    venue: fra_core::ids::Venue::new("okx"),
                    rate: fra_core::decimal::Rate::new(dec!(0.0001)),
                    mark_price: fra_core::decimal::Price::new(dec!(100)),
                    index_price: None,
                    next_funding_time: Utc::now(),
                    funding_interval_hours: 8,
                    received_at: Utc::now(),
                    source: SourceTag::Websocket,
                },
            )
            .unwrap();

        let snapshot = state.collect_snapshot().await.unwrap();
        assert!(snapshot.rate_snapshots.contains_key("BTCUSDT"));
        assert!(snapshot.open_positions.is_empty());
    }
}
