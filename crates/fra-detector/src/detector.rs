//! Opportunity Detector (spec §4.6).
//!
//! Consumes `rate-updated` snapshots from the Rate Aggregator, enumerates
//! all unordered venue pairs per symbol on the normalized basis, and
//! creates/updates/expires `ArbitrageOpportunity` records through the
//! `Repository` contract.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fra_core::decimal::Rate;
use fra_core::ids::{Symbol, Venue};
use fra_core::model::{ArbitrageOpportunity, DisappearReason, OpportunityHistory};
use fra_core::repository::Repository;
use fra_feed::{normalizer, AggregatedSnapshot};
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::DetectorConfig;
use crate::error::DetectorResult;

/// Lifecycle events the detector publishes as opportunities transition.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectorEvent {
    OpportunityDetected(ArbitrageOpportunity),
    OpportunityUpdated(ArbitrageOpportunity),
    OpportunityExpired {
        opportunity: ArbitrageOpportunity,
        history: OpportunityHistory,
    },
    OpportunityClosed {
        opportunity: ArbitrageOpportunity,
        history: OpportunityHistory,
    },
}

pub struct OpportunityDetector<R: Repository> {
    config: DetectorConfig,
    repository: Arc<R>,
    events_tx: broadcast::Sender<DetectorEvent>,
}

impl<R: Repository> OpportunityDetector<R> {
    pub fn new(config: DetectorConfig, repository: Arc<R>) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            config,
            repository,
            events_tx,
        }
    }

    pub fn events(&self) -> broadcast::Receiver<DetectorEvent> {
        self.events_tx.subscribe()
    }

    /// Process one aggregator snapshot (spec §4.6 algorithm).
    pub async fn process_snapshot(
        &self,
        symbol: &Symbol,
        snapshot: &AggregatedSnapshot,
        now: DateTime<Utc>,
    ) -> DetectorResult<()> {
        if !self.config.is_eligible(symbol.as_str()) {
            return Ok(());
        }

        self.close_opportunities_missing_data(symbol, snapshot, now).await?;

        let normalized = self.normalized_rates(snapshot)?;
        for i in 0..normalized.len() {
            for j in (i + 1)..normalized.len() {
                let (venue_a, rate_a) = &normalized[i];
                let (venue_b, rate_b) = &normalized[j];
                self.process_pair(symbol, venue_a, *rate_a, venue_b, *rate_b, now)
                    .await?;
            }
        }
        Ok(())
    }

    fn normalized_rates(&self, snapshot: &AggregatedSnapshot) -> DetectorResult<Vec<(Venue, Rate)>> {
        let mut out = Vec::with_capacity(snapshot.snapshot.rates.len());
        for (venue, funding_rate) in &snapshot.snapshot.rates {
            let from_hours = normalizer::interval_or_default(Some(funding_rate.funding_interval_hours));
            let normalized =
                normalizer::normalize(funding_rate.rate, from_hours, self.config.target_basis_hours)?;
            out.push((venue.clone(), normalized));
        }
        Ok(out)
    }

    /// Close any ACTIVE opportunity for `symbol` whose long or short venue
    /// no longer reports data in this snapshot (spec §4.6 DATA_UNAVAILABLE).
    async fn close_opportunities_missing_data(
        &self,
        symbol: &Symbol,
        snapshot: &AggregatedSnapshot,
        now: DateTime<Utc>,
    ) -> DetectorResult<()> {
        let current_venues: HashSet<&Venue> = snapshot.snapshot.rates.keys().collect();
        let actives = self.repository.find_all_active_opportunities(usize::MAX).await?;

        for mut opportunity in actives.into_iter().filter(|o| o.symbol == symbol.as_str()) {
            if !current_venues.contains(&opportunity.long_venue)
                || !current_venues.contains(&opportunity.short_venue)
            {
                let reason = opportunity.close(DisappearReason::DataUnavailable, now)?;
                self.repository.update_opportunity(opportunity.clone()).await?;
                let history = OpportunityHistory::from_opportunity(&opportunity, reason);
                self.repository.create_opportunity_history(history.clone()).await?;
                debug!(%symbol, opportunity_id = %opportunity.id, "opportunity closed: data unavailable");
                let _ = self.events_tx.send(DetectorEvent::OpportunityClosed { opportunity, history });
            }
        }
        Ok(())
    }

    async fn process_pair(
        &self,
        symbol: &Symbol,
        venue_a: &Venue,
        rate_a: Rate,
        venue_b: &Venue,
        rate_b: Rate,
        now: DateTime<Utc>,
    ) -> DetectorResult<()> {
        // Tie-break: equal rates never create (or sustain) an opportunity.
        if rate_a.inner() == rate_b.inner() {
            self.expire_if_active(symbol, venue_a, venue_b, now).await?;
            self.expire_if_active(symbol, venue_b, venue_a, now).await?;
            return Ok(());
        }

        let (long_venue, short_venue) = if rate_a.inner() < rate_b.inner() {
            (venue_a, venue_b)
        } else {
            (venue_b, venue_a)
        };
        let difference = Rate::new((rate_a.inner() - rate_b.inner()).abs());

        if difference.inner() >= self.config.rate_difference_threshold.inner() {
            // A prior observation may have tracked this pair in the
            // opposite direction; roles flipping closes it out.
            self.expire_if_active(symbol, short_venue, long_venue, now).await?;

            match self
                .repository
                .find_active_opportunity(symbol.as_str(), long_venue, short_venue)
                .await?
            {
                Some(mut opportunity) => {
                    opportunity.observe(difference, now)?;
                    self.repository.update_opportunity(opportunity.clone()).await?;
                    let _ = self.events_tx.send(DetectorEvent::OpportunityUpdated(opportunity));
                }
                None => {
                    let opportunity = ArbitrageOpportunity::new(
                        symbol.as_str(),
                        long_venue.clone(),
                        short_venue.clone(),
                        difference,
                        now,
                    );
                    self.repository.create_opportunity(opportunity.clone()).await?;
                    debug!(%symbol, %long_venue, %short_venue, "opportunity detected");
                    let _ = self.events_tx.send(DetectorEvent::OpportunityDetected(opportunity));
                }
            }
        } else {
            self.expire_if_active(symbol, long_venue, short_venue, now).await?;
            self.expire_if_active(symbol, short_venue, long_venue, now).await?;
        }
        Ok(())
    }

    async fn expire_if_active(
        &self,
        symbol: &Symbol,
        long_venue: &Venue,
        short_venue: &Venue,
        now: DateTime<Utc>,
    ) -> DetectorResult<()> {
        if let Some(mut opportunity) = self
            .repository
            .find_active_opportunity(symbol.as_str(), long_venue, short_venue)
            .await?
        {
            let reason = opportunity.expire(now)?;
            self.repository.update_opportunity(opportunity.clone()).await?;
            let history = OpportunityHistory::from_opportunity(&opportunity, reason);
            self.repository.create_opportunity_history(history.clone()).await?;
            let _ = self.events_tx.send(DetectorEvent::OpportunityExpired { opportunity, history });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fra_core::decimal::Price;
    use fra_core::model::{FundingRate, RateSnapshot, SourceTag};
    use fra_persistence::InMemoryRepository;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn rate(venue: &str, r: rust_decimal::Decimal) -> FundingRate {
        FundingRate {
            venue: Venue::new(venue),
            rate: Rate::new(r),
            mark_price: Price::new(dec!(100)),
            index_price: None,
            next_funding_time: Utc::now(),
            funding_interval_hours: 8,
            received_at: Utc::now(),
            source: SourceTag::Websocket,
        }
    }

    fn snapshot_with(rates: Vec<(&str, rust_decimal::Decimal)>) -> AggregatedSnapshot {
        let mut map = BTreeMap::new();
        for (venue, r) in rates {
            map.insert(Venue::new(venue), rate(venue, r));
        }
        AggregatedSnapshot {
            snapshot: RateSnapshot { rates: map, best_pair: None },
            normalized_variants: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn crossing_threshold_creates_opportunity() {
        let repo = Arc::new(InMemoryRepository::new());
        let detector = OpportunityDetector::new(DetectorConfig::default(), repo.clone());
        let symbol = Symbol::new("BTCUSDT");
        let snapshot = snapshot_with(vec![("a", dec!(0.0)), ("b", dec!(0.006))]);

        detector.process_snapshot(&symbol, &snapshot, Utc::now()).await.unwrap();

        let actives = repo.find_all_active_opportunities(10).await.unwrap();
        assert_eq!(actives.len(), 1);
        assert_eq!(actives[0].long_venue, Venue::new("a"));
        assert_eq!(actives[0].short_venue, Venue::new("b"));
    }

    #[tokio::test]
    async fn dropping_below_threshold_expires_without_flapping() {
        let repo = Arc::new(InMemoryRepository::new());
        let detector = OpportunityDetector::new(DetectorConfig::default(), repo.clone());
        let symbol = Symbol::new("BTCUSDT");
        let now = Utc::now();

        let crossed = snapshot_with(vec![("a", dec!(0.0)), ("b", dec!(0.006))]);
        detector.process_snapshot(&symbol, &crossed, now).await.unwrap();
        assert_eq!(repo.find_all_active_opportunities(10).await.unwrap().len(), 1);

        let dropped = snapshot_with(vec![("a", dec!(0.0)), ("b", dec!(0.001))]);
        detector.process_snapshot(&symbol, &dropped, now + chrono::Duration::milliseconds(1)).await.unwrap();

        assert_eq!(repo.find_all_active_opportunities(10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn equal_rates_create_no_opportunity() {
        let repo = Arc::new(InMemoryRepository::new());
        let detector = OpportunityDetector::new(DetectorConfig::default(), repo.clone());
        let symbol = Symbol::new("BTCUSDT");
        let snapshot = snapshot_with(vec![("a", dec!(0.002)), ("b", dec!(0.002))]);

        detector.process_snapshot(&symbol, &snapshot, Utc::now()).await.unwrap();
        assert!(repo.find_all_active_opportunities(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_venue_data_closes_with_data_unavailable() {
        let repo = Arc::new(InMemoryRepository::new());
        let detector = OpportunityDetector::new(DetectorConfig::default(), repo.clone());
        let symbol = Symbol::new("BTCUSDT");
        let now = Utc::now();

        let crossed = snapshot_with(vec![("a", dec!(0.0)), ("b", dec!(0.006))]);
        detector.process_snapshot(&symbol, &crossed, now).await.unwrap();

        let missing_b = snapshot_with(vec![("a", dec!(0.0))]);
        detector.process_snapshot(&symbol, &missing_b, now).await.unwrap();

        assert!(repo.find_all_active_opportunities(10).await.unwrap().is_empty());
    }
}
