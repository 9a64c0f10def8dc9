//! Position Closer (spec §4.9).
//!
//! Closes hedge-position legs in a controlled sequence with a
//! per-position mutex guarding against overlapping close attempts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fra_adapter::{AdapterRegistry, ExchangeAdapter};
use fra_core::decimal::{Money, Price};
use fra_core::ids::{PositionId, Symbol, TradeId, Venue};
use fra_core::model::{CloseReason, Position, PositionStatus, Trade};
use fra_core::repository::{PositionPatch, Repository};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::{ExecutorError, ExecutorResult};
use fra_adapter::{OrderRequest, OrderSide, OrderType};

/// Taker fee rate assumed for both open and close legs (spec §4.9 PnL
/// formula: "taker assumed"). No venue in this deployment exposes a
/// per-account maker/taker schedule through the adapter contract yet.
const DEFAULT_TAKER_FEE_RATE: Decimal = dec!(0.0004);

/// Which side of a hedge position an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    Long,
    Short,
}

impl Leg {
    pub fn opposite(self) -> Leg {
        match self {
            Leg::Long => Leg::Short,
            Leg::Short => Leg::Long,
        }
    }
}

struct LegClose {
    leg: Leg,
    exit_price: Price,
    fee: Money,
    reason: CloseReason,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloserEvent {
    /// Both legs finalized; the Trade is written.
    Closed { position_id: PositionId, trade: Trade },
    /// One leg closed; waiting on the other (via a subsequent
    /// `close_single_side` call or a trigger fill).
    Pending { position_id: PositionId, leg_closed: Leg },
    /// `close_both` closed exactly one leg; the other remains open and
    /// needs manual attention.
    RequiresManualIntervention {
        position_id: PositionId,
        open_leg: Leg,
        open_venue: Venue,
    },
    Failed { position_id: PositionId },
}

pub struct PositionCloser<R: Repository, A: ExchangeAdapter> {
    repository: Arc<R>,
    adapters: Arc<AdapterRegistry<A>>,
    in_flight: DashMap<PositionId, ()>,
    pending: DashMap<PositionId, LegClose>,
    events_tx: broadcast::Sender<CloserEvent>,
}

impl<R: Repository, A: ExchangeAdapter> PositionCloser<R, A> {
    pub fn new(repository: Arc<R>, adapters: Arc<AdapterRegistry<A>>) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            repository,
            adapters,
            in_flight: DashMap::new(),
            pending: DashMap::new(),
            events_tx,
        }
    }

    pub fn events(&self) -> broadcast::Receiver<CloserEvent> {
        self.events_tx.subscribe()
    }

    fn acquire_lock(&self, position_id: PositionId) -> bool {
        self.in_flight.insert(position_id, ()).is_none()
    }

    fn release_lock(&self, position_id: PositionId) {
        self.in_flight.remove(&position_id);
    }

    /// Issue a market close order on `leg` and finalize the position if
    /// the opposite leg is already recorded closed (spec §4.9
    /// `closeSingleSide`).
    pub async fn close_single_side(
        &self,
        position_id: PositionId,
        leg: Leg,
        reason: CloseReason,
    ) -> ExecutorResult<()> {
        if !self.acquire_lock(position_id) {
            return Err(ExecutorError::CloseInProgress(position_id));
        }
        let result = self.close_single_side_inner(position_id, leg, reason).await;
        self.release_lock(position_id);
        result
    }

    async fn close_single_side_inner(
        &self,
        position_id: PositionId,
        leg: Leg,
        reason: CloseReason,
    ) -> ExecutorResult<()> {
        let position = self.load_position(position_id).await?;
        let leg_ref = self.leg_of(&position, leg);
        let adapter = self
            .adapters
            .get(&leg_ref.venue)
            .ok_or_else(|| ExecutorError::SubmissionFailed(format!("no adapter for venue {}", leg_ref.venue)))?;

        let request = OrderRequest {
            symbol: Symbol::new(position.symbol.clone()),
            side: close_side(leg),
            order_type: OrderType::Market,
            size: leg_ref.size,
            price: None,
            reduce_only: true,
            client_order_id: format!("close-{position_id}-{leg:?}"),
        };
        let result = adapter.create_order(request).await?;
        let exit_price = result.avg_fill_price.unwrap_or(leg_ref.entry_price);
        let fee = Money::new(result.filled_size.notional(exit_price).inner() * DEFAULT_TAKER_FEE_RATE);

        self.repository
            .update_position(position_id, PositionPatch { status: Some(PositionStatus::Closing), ..Default::default() })
            .await?;

        self.finalize_leg(&position, leg, exit_price, fee, reason, Utc::now()).await
    }

    /// Record that `leg` was already closed by a venue-side conditional
    /// order fill (spec §4.8's "opposite leg already closed via trigger"),
    /// without issuing an order ourselves.
    pub async fn record_trigger_fill(
        &self,
        position_id: PositionId,
        leg: Leg,
        exit_price: Price,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> ExecutorResult<()> {
        let position = self.load_position(position_id).await?;
        let leg_ref = self.leg_of(&position, leg);
        let fee = Money::new(leg_ref.size.notional(exit_price).inner() * DEFAULT_TAKER_FEE_RATE);
        self.finalize_leg(&position, leg, exit_price, fee, reason, now).await
    }

    async fn finalize_leg(
        &self,
        position: &Position,
        leg: Leg,
        exit_price: Price,
        fee: Money,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> ExecutorResult<()> {
        let position_id = position.id;
        match self.pending.remove(&position_id) {
            Some((_, other)) if other.leg == leg.opposite() => {
                let (long_exit, short_exit, long_fee, short_fee) = match leg {
                    Leg::Long => (exit_price, other.exit_price, fee, other.fee),
                    Leg::Short => (other.exit_price, exit_price, other.fee, fee),
                };
                let trade = self
                    .compute_trade(position, long_exit, short_exit, long_fee, short_fee, reason, now)
                    .await?;
                self.repository.create_trade(trade.clone()).await?;
                self.repository
                    .update_position(position_id, PositionPatch { status: Some(PositionStatus::Closed), ..Default::default() })
                    .await?;
                let _ = self.events_tx.send(CloserEvent::Closed { position_id, trade });
                Ok(())
            }
            Some((_, stale)) => {
                // Same leg recorded twice (retry); keep the newer value.
                self.pending.insert(position_id, stale);
                self.pending.insert(position_id, LegClose { leg, exit_price, fee, reason });
                Ok(())
            }
            None => {
                self.pending.insert(position_id, LegClose { leg, exit_price, fee, reason });
                let _ = self.events_tx.send(CloserEvent::Pending { position_id, leg_closed: leg });
                Ok(())
            }
        }
    }

    /// Close both legs concurrently (spec §4.9 `closeBoth`).
    pub async fn close_both(&self, position_id: PositionId, reason: CloseReason) -> ExecutorResult<()> {
        if !self.acquire_lock(position_id) {
            return Err(ExecutorError::CloseInProgress(position_id));
        }
        let result = self.close_both_inner(position_id, reason).await;
        self.release_lock(position_id);
        result
    }

    async fn close_both_inner(&self, position_id: PositionId, reason: CloseReason) -> ExecutorResult<()> {
        let position = self.load_position(position_id).await?;
        let symbol = Symbol::new(position.symbol.clone());

        let long_order = self.submit_close(&symbol, &position, Leg::Long).await;
        let short_order = self.submit_close(&symbol, &position, Leg::Short).await;
        let now = Utc::now();

        match (long_order, short_order) {
            (Ok(long_order), Ok(short_order)) => {
                let long_exit = long_order.avg_fill_price.unwrap_or(position.long.entry_price);
                let short_exit = short_order.avg_fill_price.unwrap_or(position.short.entry_price);
                let long_fee = Money::new(long_order.filled_size.notional(long_exit).inner() * DEFAULT_TAKER_FEE_RATE);
                let short_fee = Money::new(short_order.filled_size.notional(short_exit).inner() * DEFAULT_TAKER_FEE_RATE);
                let trade = self
                    .compute_trade(&position, long_exit, short_exit, long_fee, short_fee, reason, now)
                    .await?;
                self.repository.create_trade(trade.clone()).await?;
                self.repository
                    .update_position(position_id, PositionPatch { status: Some(PositionStatus::Closed), ..Default::default() })
                    .await?;
                let _ = self.events_tx.send(CloserEvent::Closed { position_id, trade });
            }
            (Ok(_), Err(e)) => {
                warn!(%position_id, error = %e, "closeBoth: short leg failed, long leg closed");
                self.mark_partial(position_id, Leg::Short, position.short.venue.clone()).await?;
            }
            (Err(e), Ok(_)) => {
                warn!(%position_id, error = %e, "closeBoth: long leg failed, short leg closed");
                self.mark_partial(position_id, Leg::Long, position.long.venue.clone()).await?;
            }
            (Err(e1), Err(e2)) => {
                warn!(%position_id, %e1, %e2, "closeBoth: both legs failed");
                self.repository
                    .update_position(position_id, PositionPatch { status: Some(PositionStatus::Failed), ..Default::default() })
                    .await?;
                let _ = self.events_tx.send(CloserEvent::Failed { position_id });
            }
        }
        Ok(())
    }

    async fn submit_close(
        &self,
        symbol: &Symbol,
        position: &Position,
        leg: Leg,
    ) -> ExecutorResult<fra_adapter::OrderResult> {
        let leg_ref = self.leg_of(position, leg);
        let adapter = self
            .adapters
            .get(&leg_ref.venue)
            .ok_or_else(|| ExecutorError::SubmissionFailed(format!("no adapter for venue {}", leg_ref.venue)))?;
        let request = OrderRequest {
            symbol: symbol.clone(),
            side: close_side(leg),
            order_type: OrderType::Market,
            size: leg_ref.size,
            price: None,
            reduce_only: true,
            client_order_id: format!("close-{}-{:?}", position.id, leg),
        };
        Ok(adapter.create_order(request).await?)
    }

    async fn mark_partial(&self, position_id: PositionId, open_leg: Leg, open_venue: Venue) -> ExecutorResult<()> {
        self.repository
            .update_position(position_id, PositionPatch { status: Some(PositionStatus::Partial), ..Default::default() })
            .await?;
        let _ = self.events_tx.send(CloserEvent::RequiresManualIntervention { position_id, open_leg, open_venue });
        Ok(())
    }

    async fn load_position(&self, position_id: PositionId) -> ExecutorResult<Position> {
        self.repository
            .find_position_by_id(position_id)
            .await?
            .ok_or_else(|| ExecutorError::SubmissionFailed(format!("position {position_id} not found")))
    }

    fn leg_of<'a>(&self, position: &'a Position, leg: Leg) -> &'a fra_core::model::PositionLeg {
        match leg {
            Leg::Long => &position.long,
            Leg::Short => &position.short,
        }
    }

    async fn compute_trade(
        &self,
        position: &Position,
        long_exit: Price,
        short_exit: Price,
        long_close_fee: Money,
        short_close_fee: Money,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> ExecutorResult<Trade> {
        let price_diff_pnl = Money::new(price_diff_pnl(
            position.long.entry_price.inner(),
            long_exit.inner(),
            position.long.size.inner(),
            position.short.entry_price.inner(),
            short_exit.inner(),
            position.short.size.inner(),
        ));

        let symbol = Symbol::new(position.symbol.clone());
        let mut funding_total = Decimal::ZERO;
        for venue in [&position.long.venue, &position.short.venue] {
            if let Some(adapter) = self.adapters.get(venue) {
                if let Ok(payments) = adapter.get_funding_payments(&symbol, position.opened_at).await {
                    // [openedAt, closedAt): a settlement landing exactly at
                    // `now` belongs to the next query window, never this trade.
                    funding_total += payments
                        .iter()
                        .filter(|p| p.paid_at < now)
                        .map(|p| p.amount.inner())
                        .sum::<Decimal>();
                }
            }
        }
        let funding_rate_pnl = Money::new(funding_total);

        let open_fee = Money::new(
            position.long.size.notional(position.long.entry_price).inner() * DEFAULT_TAKER_FEE_RATE
                + position.short.size.notional(position.short.entry_price).inner() * DEFAULT_TAKER_FEE_RATE,
        );
        let total_fees = open_fee + long_close_fee + short_close_fee;
        let total_pnl = price_diff_pnl + funding_rate_pnl - total_fees;

        let notional_at_open = position.notional_at_open();
        let roi_percent = if notional_at_open.is_zero() {
            Decimal::ZERO
        } else {
            total_pnl.inner() / notional_at_open.inner() * Decimal::from(100)
        };

        Ok(Trade {
            id: TradeId::new(),
            position_id: position.id,
            long_exit_price: long_exit,
            short_exit_price: short_exit,
            price_diff_pnl,
            funding_rate_pnl,
            total_fees,
            total_pnl,
            roi_percent,
            holding_duration_secs: (now - position.opened_at).num_seconds(),
            close_reason: reason,
            closed_at: now,
        })
    }
}

fn close_side(leg: Leg) -> OrderSide {
    match leg {
        Leg::Long => OrderSide::Sell,
        Leg::Short => OrderSide::Buy,
    }
}

/// `priceDiffPnL = (longExit − longEntry) × longSize + (shortEntry − shortExit) × shortSize`
/// (spec §4.9).
fn price_diff_pnl(
    long_entry: Decimal,
    long_exit: Decimal,
    long_size: Decimal,
    short_entry: Decimal,
    short_exit: Decimal,
    short_size: Decimal,
) -> Decimal {
    (long_exit - long_entry) * long_size + (short_entry - short_exit) * short_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use fra_core::decimal::{Rate, Size};
    use fra_core::ids::PositionId;
    use fra_core::model::{ConditionalOrderStatus, PositionLeg};
    use fra_persistence::InMemoryRepository;
    use rust_decimal_macros::dec;

    fn leg(venue: &str, entry: Decimal, size: Decimal) -> fra_core::model::PositionLeg {
        PositionLeg {
            venue: Venue::new(venue),
            entry_price: Price::new(entry),
            size: Size::new(size),
            leverage: dec!(3),
            open_funding_rate: Rate::new(dec!(0.0001)),
            stop_loss_enabled: false,
            stop_loss_percent: None,
            stop_loss_trigger_price: None,
            take_profit_enabled: false,
            take_profit_percent: None,
            take_profit_trigger_price: None,
        }
    }

    fn position() -> Position {
        Position {
            id: PositionId::new(),
            user_id: "u1".into(),
            symbol: "BTCUSDT".into(),
            long: leg("okx", dec!(100), dec!(1)),
            short: leg("bingx", dec!(100), dec!(1)),
            conditional_order_status: ConditionalOrderStatus::Pending,
            status: PositionStatus::Open,
            exit_suggested: false,
            exit_suggest_reason: None,
            exit_suggested_at: None,
            cached_cumulative_funding_pnl: Money::ZERO,
            opened_at: Utc::now() - chrono::Duration::hours(8),
        }
    }

    #[tokio::test]
    async fn record_trigger_fill_then_close_single_side_finalizes_without_adapter() {
        let repo = Arc::new(InMemoryRepository::new());
        let adapters: Arc<AdapterRegistry<fra_adapter::BinanceAdapter>> = Arc::new(AdapterRegistry::new());
        let pos = position();
        let id = pos.id;
        repo.seed_position(pos);

        let closer = PositionCloser::new(repo.clone(), adapters);
        closer
            .record_trigger_fill(id, Leg::Long, Price::new(dec!(95)), CloseReason::LongSlTriggered, Utc::now())
            .await
            .unwrap();

        // No adapter registered for "bingx": close_single_side on the
        // hedge leg fails to submit, but the pending record persists.
        let result = closer.close_single_side(id, Leg::Short, CloseReason::LongSlTriggered).await;
        assert!(result.is_err());
    }

    #[test]
    fn leg_opposite_is_involutive() {
        assert_eq!(Leg::Long.opposite(), Leg::Short);
        assert_eq!(Leg::Short.opposite(), Leg::Long);
    }

    /// Spec §8 testable property 7, "Close PnL identity", with the exact
    /// literal inputs from the spec: priceDiffPnL = 5, totalPnL = 5.3.
    #[test]
    fn close_pnl_identity_matches_spec_literal_example() {
        let diff = price_diff_pnl(dec!(100), dec!(110), dec!(1), dec!(100), dec!(105), dec!(1));
        assert_eq!(diff, dec!(5));

        let funding_rate_pnl = dec!(0.5);
        let total_fees = dec!(0.2);
        let total_pnl = diff + funding_rate_pnl - total_fees;
        assert_eq!(total_pnl, dec!(5.3));
    }
}
