//! Position Exit Monitor (spec §4.7).
//!
//! Subscribes to aggregator `rate-updated` snapshots. For each OPEN
//! position whose symbol changed, recomputes `currentAPY`, the cumulative
//! funding PnL, and the unrealized price-diff loss, then decides whether
//! to raise or clear an exit suggestion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fra_adapter::{AdapterRegistry, ExchangeAdapter};
use fra_core::decimal::{Money, Rate};
use fra_core::ids::{PositionId, Symbol};
use fra_core::model::{ExitSuggestReason, Position};
use fra_core::repository::{AuditEvent, Keystore, PositionPatch, Repository};
use fra_feed::{normalizer, AggregatedSnapshot};
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::ExitMonitorConfig;
use crate::error::PositionResult;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PositionMonitorEvent {
    ExitSuggested {
        position: Position,
        reason: ExitSuggestReason,
        at: DateTime<Utc>,
    },
    ExitCanceled {
        position: Position,
        at: DateTime<Utc>,
    },
}

pub struct PositionExitMonitor<R: Repository, K: Keystore, A: ExchangeAdapter> {
    config: ExitMonitorConfig,
    repository: Arc<R>,
    keystore: Arc<K>,
    adapters: Arc<AdapterRegistry<A>>,
    /// Timestamp of the last suggestion-state transition per position,
    /// enforcing the 60s debounce (spec §4.7 step 5).
    last_transition: DashMap<PositionId, DateTime<Utc>>,
    events_tx: broadcast::Sender<PositionMonitorEvent>,
}

impl<R: Repository, K: Keystore, A: ExchangeAdapter> PositionExitMonitor<R, K, A> {
    pub fn new(
        config: ExitMonitorConfig,
        repository: Arc<R>,
        keystore: Arc<K>,
        adapters: Arc<AdapterRegistry<A>>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            config,
            repository,
            keystore,
            adapters,
            last_transition: DashMap::new(),
            events_tx,
        }
    }

    pub fn events(&self) -> broadcast::Receiver<PositionMonitorEvent> {
        self.events_tx.subscribe()
    }

    /// Re-evaluate every OPEN position on `symbol` against `aggregated`.
    pub async fn process_snapshot(
        &self,
        symbol: &Symbol,
        aggregated: &AggregatedSnapshot,
        now: DateTime<Utc>,
    ) -> PositionResult<()> {
        let positions = self.repository.find_open_positions_by_symbol(symbol.as_str()).await?;
        for position in positions {
            self.process_position(position, aggregated, now).await?;
        }
        Ok(())
    }

    async fn process_position(
        &self,
        position: Position,
        aggregated: &AggregatedSnapshot,
        now: DateTime<Utc>,
    ) -> PositionResult<()> {
        let settings = match self.repository.find_trading_settings_by_user(&position.user_id).await? {
            Some(s) if s.exit_suggestions_enabled => s,
            _ => return Ok(()),
        };

        let current_apy = match self.current_apy(&position, aggregated)? {
            Some(apy) => apy,
            None => return Ok(()),
        };
        let funding_pnl = self.funding_pnl(&position, now).await;
        let price_diff_loss = self.price_diff_loss(&position, aggregated);
        let reason = should_suggest_close(current_apy, settings.apy_threshold, funding_pnl, price_diff_loss);

        match (position.exit_suggested, reason) {
            (false, Some(reason)) => {
                if !self.debounce_elapsed(position.id, now) {
                    return Ok(());
                }
                self.last_transition.insert(position.id, now);
                let patch = PositionPatch {
                    exit_suggested: Some(true),
                    exit_suggest_reason: Some(Some(reason)),
                    exit_suggested_at: Some(Some(now)),
                    ..Default::default()
                };
                let updated = self.repository.update_position(position.id, patch).await?;
                debug!(position_id = %updated.id, ?reason, "exit suggested");
                let _ = self.events_tx.send(PositionMonitorEvent::ExitSuggested { position: updated, reason, at: now });
            }
            (true, None) => {
                if !self.debounce_elapsed(position.id, now) {
                    return Ok(());
                }
                self.last_transition.remove(&position.id);
                let patch = PositionPatch {
                    exit_suggested: Some(false),
                    exit_suggest_reason: Some(None),
                    exit_suggested_at: Some(None),
                    ..Default::default()
                };
                let updated = self.repository.update_position(position.id, patch).await?;
                debug!(position_id = %updated.id, "exit suggestion canceled");
                let _ = self.events_tx.send(PositionMonitorEvent::ExitCanceled { position: updated, at: now });
            }
            _ => {}
        }
        Ok(())
    }

    fn debounce_elapsed(&self, id: PositionId, now: DateTime<Utc>) -> bool {
        match self.last_transition.get(&id) {
            Some(last) => (now - *last).num_seconds() >= self.config.debounce_secs,
            None => true,
        }
    }

    fn current_apy(&self, position: &Position, aggregated: &AggregatedSnapshot) -> PositionResult<Option<Rate>> {
        let long_rate = match aggregated.snapshot.rates.get(&position.long.venue) {
            Some(r) => r,
            None => return Ok(None),
        };
        let short_rate = match aggregated.snapshot.rates.get(&position.short.venue) {
            Some(r) => r,
            None => return Ok(None),
        };
        let basis = self.config.target_basis_hours;
        let long_norm = normalizer::normalize(
            long_rate.rate,
            normalizer::interval_or_default(Some(long_rate.funding_interval_hours)),
            basis,
        )?;
        let short_norm = normalizer::normalize(
            short_rate.rate,
            normalizer::interval_or_default(Some(short_rate.funding_interval_hours)),
            basis,
        )?;
        let diff = Rate::new(short_norm.inner() - long_norm.inner());
        Ok(Some(diff.annualized(basis)))
    }

    fn price_diff_loss(&self, position: &Position, aggregated: &AggregatedSnapshot) -> Money {
        let mut loss = Decimal::ZERO;
        if let Some(long_rate) = aggregated.snapshot.rates.get(&position.long.venue) {
            let diff = position.long.entry_price.inner() - long_rate.mark_price.inner();
            if diff > Decimal::ZERO {
                loss += diff * position.long.size.inner();
            }
        }
        if let Some(short_rate) = aggregated.snapshot.rates.get(&position.short.venue) {
            let diff = short_rate.mark_price.inner() - position.short.entry_price.inner();
            if diff > Decimal::ZERO {
                loss += diff * position.short.size.inner();
            }
        }
        Money::new(loss)
    }

    /// Cumulative funding PnL for both legs since the position opened.
    /// Falls back to the position's cached value when credentials for
    /// either leg are unavailable (spec §4.7 step 2).
    async fn funding_pnl(&self, position: &Position, _now: DateTime<Utc>) -> Money {
        let long_cred = self
            .keystore
            .decrypt_credential(&position.user_id, &position.long.venue, "funding_history_query")
            .await;
        let short_cred = self
            .keystore
            .decrypt_credential(&position.user_id, &position.short.venue, "funding_history_query")
            .await;

        let (Ok(Some(_)), Ok(Some(_))) = (&long_cred, &short_cred) else {
            return position.cached_cumulative_funding_pnl;
        };

        let _ = self
            .repository
            .record_audit_event(
                AuditEvent::new("funding_history_query", format!("position {}", position.id))
                    .for_user(position.user_id.clone()),
            )
            .await;

        let (Some(long_adapter), Some(short_adapter)) = (
            self.adapters.get(&position.long.venue),
            self.adapters.get(&position.short.venue),
        ) else {
            return position.cached_cumulative_funding_pnl;
        };

        let symbol = Symbol::new(position.symbol.clone());
        let long_payments = long_adapter
            .get_funding_payments(&symbol, position.opened_at)
            .await
            .unwrap_or_default();
        let short_payments = short_adapter
            .get_funding_payments(&symbol, position.opened_at)
            .await
            .unwrap_or_default();

        let total: Decimal = long_payments
            .iter()
            .chain(short_payments.iter())
            .map(|p| p.amount.inner())
            .sum();
        Money::new(total)
    }
}

/// Evaluate spec §4.7 step 4's two exit-suggestion conditions.
fn should_suggest_close(
    current_apy: Rate,
    threshold: Decimal,
    funding_pnl: Money,
    price_diff_loss: Money,
) -> Option<ExitSuggestReason> {
    if current_apy.inner() < Decimal::ZERO {
        return Some(ExitSuggestReason::ApyNegative);
    }
    if current_apy.inner() < threshold && funding_pnl.inner() > price_diff_loss.inner() {
        return Some(ExitSuggestReason::ProfitLockable);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_apy_always_suggests_exit() {
        let reason = should_suggest_close(Rate::new(dec!(-0.01)), dec!(0.05), Money::ZERO, Money::ZERO);
        assert_eq!(reason, Some(ExitSuggestReason::ApyNegative));
    }

    #[test]
    fn profit_lockable_requires_funding_pnl_exceeding_loss() {
        let reason = should_suggest_close(Rate::new(dec!(0.01)), dec!(0.05), Money::new(dec!(10)), Money::new(dec!(5)));
        assert_eq!(reason, Some(ExitSuggestReason::ProfitLockable));
    }

    #[test]
    fn profit_lockable_rejected_when_loss_exceeds_funding_pnl() {
        let reason = should_suggest_close(Rate::new(dec!(0.01)), dec!(0.05), Money::new(dec!(5)), Money::new(dec!(10)));
        assert_eq!(reason, None);
    }

    #[test]
    fn healthy_apy_above_threshold_suggests_nothing() {
        let reason = should_suggest_close(Rate::new(dec!(0.1)), dec!(0.05), Money::new(dec!(10)), Money::new(dec!(5)));
        assert_eq!(reason, None);
    }
}
