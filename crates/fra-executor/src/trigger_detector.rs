//! Trigger Detector (spec §4.8).
//!
//! Watches adapter order-status events for filled conditional (SL/TP)
//! orders on monitored positions, classifies which leg/kind fired, and
//! (when enabled) drives the [`PositionCloser`] to close the hedge leg.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fra_adapter::{AdapterEvent, ExchangeAdapter, OrderResult, OrderStatus, OrderType};
use fra_core::ids::{PositionId, Venue};
use fra_core::model::{CloseReason, Position};
use fra_core::repository::Repository;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::closer::{CloserEvent, Leg, PositionCloser};
use crate::error::ExecutorResult;

/// Window within which a repeated `(venue, orderId)` event is treated as a
/// duplicate delivery rather than a new fill (spec §4.8).
const DEDUP_WINDOW: Duration = Duration::from_secs(60);

/// Default tolerance between a filled conditional order's trigger price
/// and the position leg's expected trigger price (spec §4.8).
const DEFAULT_PRICE_TOLERANCE: Decimal = dec!(0.01);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    LongSl,
    LongTp,
    ShortSl,
    ShortTp,
}

impl TriggerKind {
    fn new(leg: Leg, is_stop_loss: bool) -> Self {
        match (leg, is_stop_loss) {
            (Leg::Long, true) => TriggerKind::LongSl,
            (Leg::Long, false) => TriggerKind::LongTp,
            (Leg::Short, true) => TriggerKind::ShortSl,
            (Leg::Short, false) => TriggerKind::ShortTp,
        }
    }

    fn close_reason(self) -> CloseReason {
        match self {
            TriggerKind::LongSl => CloseReason::LongSlTriggered,
            TriggerKind::LongTp => CloseReason::LongTpTriggered,
            TriggerKind::ShortSl => CloseReason::ShortSlTriggered,
            TriggerKind::ShortTp => CloseReason::ShortTpTriggered,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseStage {
    Detecting,
    ClosingHedgeLeg,
    Completed,
    Failed,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    Detected { position_id: PositionId, kind: TriggerKind },
    Progress { position_id: PositionId, stage: CloseStage },
    DuplicateSuppressed { venue: Venue, venue_order_id: String },
    PriceToleranceExceeded { position_id: PositionId, kind: TriggerKind },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TriggerDetectorConfig {
    /// Tolerance between a filled conditional order's trigger price and
    /// the position leg's expected trigger price (spec §4.8
    /// `triggerPriceTolerance`).
    #[serde(default = "default_price_tolerance")]
    pub price_tolerance: Decimal,
    /// Whether a detected trigger automatically drives the hedge leg's
    /// close, or only emits `TriggerEvent::Detected` for an operator to
    /// act on.
    #[serde(default = "default_auto_close_enabled")]
    pub auto_close_enabled: bool,
}

fn default_price_tolerance() -> Decimal {
    DEFAULT_PRICE_TOLERANCE
}

fn default_auto_close_enabled() -> bool {
    true
}

impl Default for TriggerDetectorConfig {
    fn default() -> Self {
        Self {
            price_tolerance: default_price_tolerance(),
            auto_close_enabled: default_auto_close_enabled(),
        }
    }
}

pub struct TriggerDetector<R: Repository, A: ExchangeAdapter> {
    config: TriggerDetectorConfig,
    closer: Arc<PositionCloser<R, A>>,
    monitored: DashMap<PositionId, Position>,
    dedup: DashMap<(Venue, String), Instant>,
    events_tx: broadcast::Sender<TriggerEvent>,
}

impl<R: Repository, A: ExchangeAdapter> TriggerDetector<R, A> {
    pub fn new(config: TriggerDetectorConfig, closer: Arc<PositionCloser<R, A>>) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self { config, closer, monitored: DashMap::new(), dedup: DashMap::new(), events_tx }
    }

    pub fn events(&self) -> broadcast::Receiver<TriggerEvent> {
        self.events_tx.subscribe()
    }

    /// Register a position whose conditional orders are now `SET` on the
    /// venues, so its fills are watched for.
    pub fn register(&self, position: Position) {
        self.monitored.insert(position.id, position);
    }

    pub fn unregister(&self, position_id: PositionId) {
        self.monitored.remove(&position_id);
    }

    pub async fn handle_adapter_event(&self, event: &AdapterEvent) -> ExecutorResult<()> {
        if let AdapterEvent::OrderStatusChanged(order) = event {
            self.handle_order_result(order).await?;
        }
        Ok(())
    }

    async fn handle_order_result(&self, order: &OrderResult) -> ExecutorResult<()> {
        let dedup_key = (order.venue.clone(), order.venue_order_id.clone());
        let now = Instant::now();
        if let Some(last) = self.dedup.get(&dedup_key) {
            if now.duration_since(*last) < DEDUP_WINDOW {
                let _ = self.events_tx.send(TriggerEvent::DuplicateSuppressed {
                    venue: order.venue.clone(),
                    venue_order_id: order.venue_order_id.clone(),
                });
                return Ok(());
            }
        }
        self.dedup.insert(dedup_key, now);

        if order.status != OrderStatus::Filled || order.order_type != OrderType::Conditional {
            return Ok(());
        }

        let Some(position) = self.find_monitored(order) else {
            return Ok(());
        };

        let leg = if position.long.venue == order.venue { Leg::Long } else { Leg::Short };
        let Some(is_stop_loss) = classify_sl_or_tp(order) else {
            warn!(order_id = %order.venue_order_id, "trigger detector: cannot classify SL vs TP, dropping");
            return Ok(());
        };
        let kind = TriggerKind::new(leg, is_stop_loss);

        let leg_ref = match leg {
            Leg::Long => &position.long,
            Leg::Short => &position.short,
        };
        let expected_price = if is_stop_loss { leg_ref.stop_loss_trigger_price } else { leg_ref.take_profit_trigger_price };
        if let (Some(expected), Some(observed)) = (expected_price, order.stop_price) {
            if !expected.is_zero() {
                let deviation = ((observed.inner() - expected.inner()) / expected.inner()).abs();
                if deviation > self.config.price_tolerance {
                    warn!(
                        position_id = %position.id,
                        %deviation,
                        "trigger detector: observed trigger price outside tolerance, dropping"
                    );
                    let _ = self.events_tx.send(TriggerEvent::PriceToleranceExceeded { position_id: position.id, kind });
                    return Ok(());
                }
            }
        }

        info!(position_id = %position.id, ?kind, "trigger detector: conditional order filled");
        let _ = self.events_tx.send(TriggerEvent::Detected { position_id: position.id, kind });
        let _ = self.events_tx.send(TriggerEvent::Progress { position_id: position.id, stage: CloseStage::Detecting });

        if !self.config.auto_close_enabled {
            return Ok(());
        }

        let exit_price = order.avg_fill_price.or(expected_price).unwrap_or(leg_ref.entry_price);
        self.closer
            .record_trigger_fill(position.id, leg, exit_price, kind.close_reason(), Utc::now())
            .await?;

        let _ = self.events_tx.send(TriggerEvent::Progress { position_id: position.id, stage: CloseStage::ClosingHedgeLeg });
        match self.closer.close_single_side(position.id, leg.opposite(), kind.close_reason()).await {
            Ok(()) => {
                let _ = self.events_tx.send(TriggerEvent::Progress { position_id: position.id, stage: CloseStage::Completed });
                self.unregister(position.id);
            }
            Err(e) => {
                warn!(position_id = %position.id, error = %e, "trigger detector: hedge-leg close failed");
                let _ = self.events_tx.send(TriggerEvent::Progress { position_id: position.id, stage: CloseStage::Failed });
            }
        }
        Ok(())
    }

    fn find_monitored(&self, order: &OrderResult) -> Option<Position> {
        self.monitored
            .iter()
            .find(|e| e.symbol == order.symbol.as_str() && (e.long.venue == order.venue || e.short.venue == order.venue))
            .map(|e| e.value().clone())
    }
}

/// `Some(true)` if the filled order is a stop-loss, `Some(false)` if a
/// take-profit, `None` if it can't be told apart from the data available.
fn classify_sl_or_tp(order: &OrderResult) -> Option<bool> {
    if let Some(kind) = &order.conditional_kind {
        let looks_stop = kind.contains("stop");
        let looks_tp = kind.contains("take_profit") || kind.contains("takeprofit") || kind.contains("tp");
        match (looks_stop, looks_tp) {
            (true, false) => return Some(true),
            (false, true) => return Some(false),
            _ => {}
        }
    }
    order.realized_pnl.map(|pnl| pnl.is_negative())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fra_adapter::{AdapterRegistry, OrderSide};
    use fra_core::decimal::{Money, Price, Rate, Size};
    use fra_core::ids::Symbol;
    use fra_core::model::{ConditionalOrderStatus, PositionLeg, PositionStatus};
    use fra_persistence::InMemoryRepository;

    fn leg(venue: &str, sl_trigger: Decimal) -> PositionLeg {
        PositionLeg {
            venue: Venue::new(venue),
            entry_price: Price::new(dec!(100)),
            size: Size::new(dec!(1)),
            leverage: dec!(3),
            open_funding_rate: Rate::new(dec!(0.0001)),
            stop_loss_enabled: true,
            stop_loss_percent: Some(dec!(5)),
            stop_loss_trigger_price: Some(Price::new(sl_trigger)),
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
            long: leg("okx", dec!(95)),
            short: leg("bingx", dec!(105)),
            conditional_order_status: ConditionalOrderStatus::Set,
            status: PositionStatus::Open,
            exit_suggested: false,
            exit_suggest_reason: None,
            exit_suggested_at: None,
            cached_cumulative_funding_pnl: Money::ZERO,
            opened_at: Utc::now() - chrono::Duration::hours(4),
        }
    }

    fn filled_stop_order(venue: &str, stop_price: Decimal) -> OrderResult {
        OrderResult {
            venue: Venue::new(venue),
            venue_order_id: "order-1".into(),
            client_order_id: "client-1".into(),
            symbol: Symbol::new("BTCUSDT"),
            side: OrderSide::Sell,
            status: OrderStatus::Filled,
            order_type: OrderType::Conditional,
            conditional_kind: Some("stop_market".into()),
            stop_price: Some(Price::new(stop_price)),
            filled_size: Size::new(dec!(1)),
            avg_fill_price: Some(Price::new(stop_price)),
            realized_pnl: Some(Money::new(dec!(-10))),
            updated_at: Utc::now(),
        }
    }

    fn detector() -> TriggerDetector<InMemoryRepository, fra_adapter::BinanceAdapter> {
        let repo = Arc::new(InMemoryRepository::new());
        let adapters: Arc<AdapterRegistry<fra_adapter::BinanceAdapter>> = Arc::new(AdapterRegistry::new());
        let closer = Arc::new(PositionCloser::new(repo, adapters));
        TriggerDetector::new(TriggerDetectorConfig { auto_close_enabled: false, ..Default::default() }, closer)
    }

    #[tokio::test]
    async fn classifies_long_stop_loss_within_tolerance() {
        let det = detector();
        let pos = position();
        let id = pos.id;
        det.register(pos);

        let mut events = det.events();
        let order = filled_stop_order("okx", dec!(95));
        det.handle_order_result(&order).await.unwrap();

        let evt = events.try_recv().unwrap();
        match evt {
            TriggerEvent::Detected { position_id, kind } => {
                assert_eq!(position_id, id);
                assert_eq!(kind, TriggerKind::LongSl);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_order_event_within_window_is_suppressed() {
        let det = detector();
        det.register(position());
        let order = filled_stop_order("okx", dec!(95));

        det.handle_order_result(&order).await.unwrap();
        let mut events = det.events();
        det.handle_order_result(&order).await.unwrap();

        assert!(matches!(events.try_recv().unwrap(), TriggerEvent::DuplicateSuppressed { .. }));
    }

    #[tokio::test]
    async fn price_outside_tolerance_is_dropped() {
        let det = detector();
        det.register(position());
        let mut events = det.events();
        // Expected trigger is 95; 80 deviates by ~16%, well past the 1% default.
        let order = filled_stop_order("okx", dec!(80));
        det.handle_order_result(&order).await.unwrap();

        assert!(matches!(events.try_recv().unwrap(), TriggerEvent::PriceToleranceExceeded { .. }));
    }

    #[tokio::test]
    async fn unmonitored_symbol_produces_no_event() {
        let det = detector();
        let mut events = det.events();
        let order = filled_stop_order("okx", dec!(95));
        det.handle_order_result(&order).await.unwrap();
        assert!(events.try_recv().is_err());
    }
}
