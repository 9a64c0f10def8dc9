//! Rate Aggregator / Cache (spec §4.5).
//!
//! In-memory per-symbol map of `venue -> FundingRate`, sharded by a
//! per-symbol lock (one `Arc<RwLock<_>>` entry per symbol in a
//! `DashMap`) so updates to different symbols never contend.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use fra_core::decimal::{Price, Rate};
use fra_core::ids::{Symbol, Venue};
use fra_core::model::{BestPair, FundingRate, RateSnapshot};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::FeedResult;
use crate::normalizer;

/// The four standard funding bases every snapshot carries a normalized
/// `bestPair` variant for.
pub const STANDARD_BASES: [u32; 4] = normalizer::ALLOWED_BASES;

/// Spread band an opportunity event crosses into, per spec §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadBand {
    Green,
    Yellow,
    Normal,
}

fn classify_band(spread_percent: rust_decimal::Decimal) -> SpreadBand {
    use rust_decimal_macros::dec;
    if spread_percent >= dec!(0.5) {
        SpreadBand::Green
    } else if spread_percent >= dec!(0.4) {
        SpreadBand::Yellow
    } else {
        SpreadBand::Normal
    }
}

/// A symbol's snapshot plus the normalized `bestPair` computed at each of
/// the four standard bases (spec §4.5 step 3).
#[derive(Debug, Clone, serde::Serialize)]
pub struct AggregatedSnapshot {
    pub snapshot: RateSnapshot,
    pub normalized_variants: BTreeMap<u32, BestPair>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregatorEvent {
    RateUpdated {
        symbol: Symbol,
        snapshot: AggregatedSnapshot,
    },
    Opportunity {
        symbol: Symbol,
        band: SpreadBand,
        spread_percent: rust_decimal::Decimal,
    },
}

struct DebounceState {
    last_band: SpreadBand,
    last_emitted_at: Instant,
}

/// Default target basis used to derive `RateSnapshot.best_pair` (§9 Open
/// Question 1: the engine always compares normalized rates).
pub const DEFAULT_TARGET_BASIS_HOURS: u32 = 8;
const OPPORTUNITY_DEBOUNCE: Duration = Duration::from_secs(5);

pub struct RateAggregator {
    target_basis_hours: u32,
    snapshots: DashMap<Symbol, Arc<RwLock<RateSnapshot>>>,
    debounce: DashMap<Symbol, DebounceState>,
    events_tx: broadcast::Sender<AggregatorEvent>,
}

impl RateAggregator {
    pub fn new(target_basis_hours: u32) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            target_basis_hours,
            snapshots: DashMap::new(),
            debounce: DashMap::new(),
            events_tx,
        }
    }

    pub fn events(&self) -> broadcast::Receiver<AggregatorEvent> {
        self.events_tx.subscribe()
    }

    pub fn snapshot(&self, symbol: &Symbol) -> Option<RateSnapshot> {
        self.snapshots.get(symbol).map(|entry| entry.read().clone())
    }

    /// Every symbol currently tracked, in no particular order.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.snapshots.iter().map(|entry| entry.key().clone()).collect()
    }

    fn entry_for(&self, symbol: &Symbol) -> Arc<RwLock<RateSnapshot>> {
        self.snapshots
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(RwLock::new(RateSnapshot::new())))
            .clone()
    }

    /// Apply one venue's new `FundingRate` observation for `symbol`
    /// (spec §4.5 update algorithm, steps 1-4).
    pub fn update(&self, symbol: &Symbol, rate: FundingRate) -> FeedResult<()> {
        let entry = self.entry_for(symbol);
        let variants;
        {
            let mut snapshot = entry.write();

            // Step 1: drop if a newer observation for this venue already landed.
            if let Some(existing) = snapshot.rates.get(&rate.venue) {
                if !existing.superseded_by(&rate) {
                    debug!(%symbol, venue = %rate.venue, "dropping stale funding-rate observation");
                    return Ok(());
                }
            }

            // Step 2: replace the per-venue entry.
            snapshot.rates.insert(rate.venue.clone(), rate);

            // Step 3: recompute bestPair (at the configured target basis)
            // and the four standard-basis variants.
            snapshot.best_pair = compute_best_pair(&snapshot.rates, self.target_basis_hours)?;
            variants = compute_all_variants(&snapshot.rates)?;
        }

        // Step 4: emit rate-updated exactly once per update.
        let aggregated = AggregatedSnapshot {
            snapshot: entry.read().clone(),
            normalized_variants: variants,
        };
        let spread_percent = aggregated.snapshot.best_pair.as_ref().map(|p| p.spread_percent);
        let _ = self.events_tx.send(AggregatorEvent::RateUpdated {
            symbol: symbol.clone(),
            snapshot: aggregated,
        });

        if let Some(spread_percent) = spread_percent {
            self.maybe_emit_opportunity(symbol, spread_percent);
        }

        Ok(())
    }

    fn maybe_emit_opportunity(&self, symbol: &Symbol, spread_percent: rust_decimal::Decimal) {
        let band = classify_band(spread_percent);
        let now = Instant::now();

        let should_emit = match self.debounce.get(symbol) {
            Some(state) => {
                state.last_band != band || now.duration_since(state.last_emitted_at) >= OPPORTUNITY_DEBOUNCE
            }
            None => true,
        };

        if !should_emit {
            return;
        }

        self.debounce.insert(
            symbol.clone(),
            DebounceState {
                last_band: band,
                last_emitted_at: now,
            },
        );

        let _ = self.events_tx.send(AggregatorEvent::Opportunity {
            symbol: symbol.clone(),
            band,
            spread_percent,
        });
    }
}

/// Compute `bestPair` at `target_basis_hours`: long = min normalized
/// rate, short = max normalized rate, `null` if fewer than two venues.
pub fn compute_best_pair(
    rates: &BTreeMap<Venue, FundingRate>,
    target_basis_hours: u32,
) -> FeedResult<Option<BestPair>> {
    if rates.len() < 2 {
        return Ok(None);
    }

    let mut normalized: Vec<(&Venue, Rate, Price)> = Vec::with_capacity(rates.len());
    for (venue, fr) in rates {
        let interval = normalizer::interval_or_default(Some(fr.funding_interval_hours));
        let normalized_rate = normalizer::normalize(fr.rate, interval, target_basis_hours)?;
        normalized.push((venue, normalized_rate, fr.mark_price));
    }

    let (long_venue, long_rate, long_price) = normalized
        .iter()
        .min_by(|a, b| a.1.inner().cmp(&b.1.inner()))
        .expect("checked non-empty above");
    let (short_venue, short_rate, short_price) = normalized
        .iter()
        .max_by(|a, b| a.1.inner().cmp(&b.1.inner()))
        .expect("checked non-empty above");

    if long_rate.inner() == short_rate.inner() {
        // Tie: per spec §4.6 "equal rates -> no opportunity", so the
        // snapshot still reports a bestPair (for display) with zero spread.
        warn!("bestPair has equal long/short rates, zero spread");
    }

    let spread_percent = (short_rate.inner() - long_rate.inner()) * rust_decimal::Decimal::from(100);
    let periods_per_year =
        rust_decimal::Decimal::from(24 * 365) / rust_decimal::Decimal::from(target_basis_hours);
    let spread_annualized = spread_percent * periods_per_year;
    let price_diff_percent = short_price.pct_from(*long_price).unwrap_or_default().abs();

    Ok(Some(BestPair {
        long_venue: (*long_venue).clone(),
        short_venue: (*short_venue).clone(),
        spread_percent,
        spread_annualized,
        price_diff_percent,
    }))
}

fn compute_all_variants(rates: &BTreeMap<Venue, FundingRate>) -> FeedResult<BTreeMap<u32, BestPair>> {
    let mut variants = BTreeMap::new();
    for basis in STANDARD_BASES {
        if let Some(pair) = compute_best_pair(rates, basis)? {
            variants.insert(basis, pair);
        }
    }
    Ok(variants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fra_core::model::SourceTag;
    use rust_decimal_macros::dec;

    fn rate(venue: &str, r: rust_decimal::Decimal, interval_hours: u32) -> FundingRate {
        FundingRate {
            venue: Venue::new(venue),
            rate: Rate::new(r),
            mark_price: Price::new(dec!(100)),
            index_price: None,
            next_funding_time: Utc::now(),
            funding_interval_hours: interval_hours,
            received_at: Utc::now(),
            source: SourceTag::Websocket,
        }
    }

    #[test]
    fn best_pair_is_none_below_two_venues() {
        let aggregator = RateAggregator::new(8);
        let symbol = Symbol::new("BTCUSDT");
        aggregator.update(&symbol, rate("okx", dec!(0.001), 8)).unwrap();
        assert!(aggregator.snapshot(&symbol).unwrap().best_pair.is_none());
    }

    #[test]
    fn best_pair_picks_min_and_max_regardless_of_insertion_order() {
        let mut rates = BTreeMap::new();
        rates.insert(Venue::new("a"), rate("a", dec!(0.001), 8));
        rates.insert(Venue::new("b"), rate("b", dec!(0.0005), 8));
        rates.insert(Venue::new("c"), rate("c", dec!(-0.0002), 8));

        let pair = compute_best_pair(&rates, 8).unwrap().unwrap();
        assert_eq!(pair.long_venue, Venue::new("c"));
        assert_eq!(pair.short_venue, Venue::new("a"));
        assert_eq!(pair.spread_percent, dec!(0.12));
    }

    #[test]
    fn stale_observation_is_dropped() {
        let aggregator = RateAggregator::new(8);
        let symbol = Symbol::new("BTCUSDT");

        let mut newer = rate("okx", dec!(0.001), 8);
        newer.received_at = Utc::now();
        aggregator.update(&symbol, newer.clone()).unwrap();

        let mut older = newer.clone();
        older.rate = Rate::new(dec!(0.002));
        older.received_at = newer.received_at - chrono::Duration::seconds(5);
        aggregator.update(&symbol, older).unwrap();

        let snapshot = aggregator.snapshot(&symbol).unwrap();
        assert_eq!(snapshot.rates.get(&Venue::new("okx")).unwrap().rate, newer.rate);
    }
}
