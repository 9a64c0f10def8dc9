//! Domain entities: FundingRate, RateSnapshot, ArbitrageOpportunity,
//! OpportunityHistory, Position, Trade, DataSourceState (spec §3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Price, Rate};
use crate::ids::{OpportunityId, PositionId, TradeId, Venue};

/// Where a `FundingRate` observation was sourced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Websocket,
    Rest,
}

/// A single observation of a venue's funding rate for one symbol.
///
/// Immutable once constructed; a newer observation for the same
/// (venue, symbol) supersedes an older one by `received_at`, never by
/// arrival order (spec §5 ordering guarantees).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRate {
    pub venue: Venue,
    pub rate: Rate,
    pub mark_price: Price,
    pub index_price: Option<Price>,
    pub next_funding_time: DateTime<Utc>,
    /// Hours between settlements; one of {1, 4, 8, 24}. Defaults to 8 when
    /// a venue omits it (spec §3/§4.4).
    pub funding_interval_hours: u32,
    pub received_at: DateTime<Utc>,
    pub source: SourceTag,
}

pub const DEFAULT_FUNDING_INTERVAL_HOURS: u32 = 8;

impl FundingRate {
    /// `true` if `other` should supersede `self` per received-at ordering.
    pub fn superseded_by(&self, other: &FundingRate) -> bool {
        other.received_at >= self.received_at
    }
}

/// Derived best long/short venue pair for one symbol's snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPair {
    pub long_venue: Venue,
    pub short_venue: Venue,
    pub spread_percent: Decimal,
    pub spread_annualized: Decimal,
    pub price_diff_percent: Decimal,
}

/// Per-symbol view across all reporting venues, keyed by venue (spec §3).
///
/// `BTreeMap` is used (not a hash map) so the invariant "changing
/// insertion order does not change the result" (testable property 3) is
/// trivially true of the underlying storage, not just of `best_pair`'s
/// derivation logic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub rates: BTreeMap<Venue, FundingRate>,
    pub best_pair: Option<BestPair>,
}

impl RateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Lifecycle of an `ArbitrageOpportunity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpportunityStatus {
    Active,
    Expired,
    Closed,
}

/// Reason an `ArbitrageOpportunity` left the ACTIVE state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisappearReason {
    RateDropped,
    DataUnavailable,
    ManualClose,
    SystemError,
}

/// A persistent record of a tradeable rate difference for one
/// (symbol, longVenue, shortVenue) triple (spec §3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub id: OpportunityId,
    pub symbol: String,
    pub long_venue: Venue,
    pub short_venue: Venue,
    pub status: OpportunityStatus,
    pub initial_rate_difference: Rate,
    pub current_rate_difference: Rate,
    pub max_rate_difference: Rate,
    pub max_rate_difference_at: DateTime<Utc>,
    pub notification_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Running sum/count used to compute the terminal average difference.
    pub observation_sum: Decimal,
    pub observation_count: u32,
}

impl ArbitrageOpportunity {
    pub fn new(
        symbol: impl Into<String>,
        long_venue: Venue,
        short_venue: Venue,
        difference: Rate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OpportunityId::new(),
            symbol: symbol.into(),
            long_venue,
            short_venue,
            status: OpportunityStatus::Active,
            initial_rate_difference: difference,
            current_rate_difference: difference,
            max_rate_difference: difference,
            max_rate_difference_at: now,
            notification_count: 0,
            created_at: now,
            updated_at: now,
            observation_sum: difference.inner(),
            observation_count: 1,
        }
    }

    /// Average of all observations contributing updates during the
    /// opportunity's lifetime (spec §4.6 terminal-transition requirement).
    pub fn average_rate_difference(&self) -> Rate {
        if self.observation_count == 0 {
            return Rate::ZERO;
        }
        Rate::new(self.observation_sum / Decimal::from(self.observation_count))
    }

    /// Record a new observation on an ACTIVE opportunity.
    ///
    /// Terminal states reject mutation (spec §3 invariant: "An
    /// ArbitrageOpportunity not in state ACTIVE rejects all mutating
    /// operations").
    pub fn observe(&mut self, difference: Rate, now: DateTime<Utc>) -> crate::error::Result<()> {
        if self.status != OpportunityStatus::Active {
            return Err(crate::error::CoreError::Conflict(format!(
                "opportunity {} is not ACTIVE",
                self.id
            )));
        }
        self.current_rate_difference = difference;
        if difference.inner() > self.max_rate_difference.inner() {
            self.max_rate_difference = difference;
            self.max_rate_difference_at = now;
        }
        self.observation_sum += difference.inner();
        self.observation_count += 1;
        self.updated_at = now;
        Ok(())
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> crate::error::Result<DisappearReason> {
        self.transition_to_terminal(OpportunityStatus::Expired, now)?;
        Ok(DisappearReason::RateDropped)
    }

    pub fn close(
        &mut self,
        reason: DisappearReason,
        now: DateTime<Utc>,
    ) -> crate::error::Result<DisappearReason> {
        self.transition_to_terminal(OpportunityStatus::Closed, now)?;
        Ok(reason)
    }

    fn transition_to_terminal(
        &mut self,
        target: OpportunityStatus,
        now: DateTime<Utc>,
    ) -> crate::error::Result<()> {
        if self.status != OpportunityStatus::Active {
            return Err(crate::error::CoreError::Conflict(format!(
                "opportunity {} already terminal ({:?})",
                self.id, self.status
            )));
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }
}

/// Terminal summary written when an `ArbitrageOpportunity` closes (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityHistory {
    pub opportunity_id: OpportunityId,
    pub symbol: String,
    pub long_venue: Venue,
    pub short_venue: Venue,
    pub initial_rate_difference: Rate,
    pub max_rate_difference: Rate,
    pub average_rate_difference: Rate,
    pub duration_secs: i64,
    pub total_notifications_sent: u32,
    pub disappearance_reason: DisappearReason,
    pub closed_at: DateTime<Utc>,
}

impl OpportunityHistory {
    pub fn from_opportunity(opp: &ArbitrageOpportunity, reason: DisappearReason) -> Self {
        Self {
            opportunity_id: opp.id,
            symbol: opp.symbol.clone(),
            long_venue: opp.long_venue.clone(),
            short_venue: opp.short_venue.clone(),
            initial_rate_difference: opp.initial_rate_difference,
            max_rate_difference: opp.max_rate_difference,
            average_rate_difference: opp.average_rate_difference(),
            duration_secs: (opp.updated_at - opp.created_at).num_seconds(),
            total_notifications_sent: opp.notification_count,
            disappearance_reason: reason,
            closed_at: opp.updated_at,
        }
    }
}

/// Conditional (SL/TP) order status for one `Position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConditionalOrderStatus {
    Pending,
    Setting,
    Set,
    Partial,
    Failed,
}

/// Lifecycle status of a `Position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Pending,
    Opening,
    Open,
    Closing,
    Closed,
    Failed,
    Partial,
}

/// One leg (long or short) of a hedged `Position`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLeg {
    pub venue: Venue,
    pub entry_price: Price,
    pub size: crate::decimal::Size,
    pub leverage: Decimal,
    pub open_funding_rate: Rate,
    pub stop_loss_enabled: bool,
    pub stop_loss_percent: Option<Decimal>,
    pub stop_loss_trigger_price: Option<Price>,
    pub take_profit_enabled: bool,
    pub take_profit_percent: Option<Decimal>,
    pub take_profit_trigger_price: Option<Price>,
}

/// Reason a position was suggested for exit (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitSuggestReason {
    ApyNegative,
    ProfitLockable,
}

/// A user-owned two-leg hedge position (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub user_id: String,
    pub symbol: String,
    pub long: PositionLeg,
    pub short: PositionLeg,
    pub conditional_order_status: ConditionalOrderStatus,
    pub status: PositionStatus,
    pub exit_suggested: bool,
    pub exit_suggest_reason: Option<ExitSuggestReason>,
    pub exit_suggested_at: Option<DateTime<Utc>>,
    pub cached_cumulative_funding_pnl: Money,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn notional_at_open(&self) -> Money {
        self.long.size.notional(self.long.entry_price) + self.short.size.notional(self.short.entry_price)
    }
}

/// Reason a `Position` was closed (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    Manual,
    LongSlTriggered,
    LongTpTriggered,
    ShortSlTriggered,
    ShortTpTriggered,
    AutoExit,
}

/// Terminal trade record for a closed `Position` (spec §3, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub position_id: PositionId,
    pub long_exit_price: Price,
    pub short_exit_price: Price,
    pub price_diff_pnl: Money,
    pub funding_rate_pnl: Money,
    pub total_fees: Money,
    pub total_pnl: Money,
    pub roi_percent: Decimal,
    pub holding_duration_secs: i64,
    pub close_reason: CloseReason,
    pub closed_at: DateTime<Utc>,
}

/// A venue's data category tracked by the Data-Source Manager (spec §3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    FundingRate,
    Position,
    Order,
    Balance,
}

/// Active transport mode for one (venue, dataType) stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Websocket,
    Rest,
    Hybrid,
}

/// Per (venue, dataType) transport state (spec §3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceState {
    pub venue: Venue,
    pub data_type: DataType,
    pub mode: SourceMode,
    pub websocket_available: bool,
    pub last_data_received_at: Option<DateTime<Utc>>,
    pub current_latency_ms: Option<u64>,
    pub last_switch_reason: Option<String>,
}

impl DataSourceState {
    pub fn new(venue: Venue, data_type: DataType) -> Self {
        Self {
            venue,
            data_type,
            mode: SourceMode::Websocket,
            websocket_available: true,
            last_data_received_at: None,
            current_latency_ms: None,
            last_switch_reason: None,
        }
    }

    /// `true` when `now - last_data_received_at > stale_threshold` (spec §4.3).
    pub fn is_stale(&self, now: DateTime<Utc>, stale_threshold: chrono::Duration) -> bool {
        match self.last_data_received_at {
            Some(t) => now - t > stale_threshold,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn venue(s: &str) -> Venue {
        Venue::new(s)
    }

    #[test]
    fn opportunity_average_is_arithmetic_mean() {
        let now = Utc::now();
        let mut opp = ArbitrageOpportunity::new(
            "BTCUSDT",
            venue("a"),
            venue("b"),
            Rate::new(dec!(0.005)),
            now,
        );
        opp.observe(Rate::new(dec!(0.007)), now).unwrap();
        opp.observe(Rate::new(dec!(0.003)), now).unwrap();
        // (0.005 + 0.007 + 0.003) / 3 = 0.005
        assert_eq!(opp.average_rate_difference().inner(), dec!(0.005));
    }

    #[test]
    fn terminal_opportunity_rejects_mutation() {
        let now = Utc::now();
        let mut opp =
            ArbitrageOpportunity::new("BTCUSDT", venue("a"), venue("b"), Rate::new(dec!(0.006)), now);
        opp.expire(now).unwrap();
        assert!(opp.observe(Rate::new(dec!(0.006)), now).is_err());
        assert!(opp.expire(now).is_err());
    }

    #[test]
    fn data_source_staleness() {
        let mut state = DataSourceState::new(venue("okx"), DataType::FundingRate);
        let now = Utc::now();
        state.last_data_received_at = Some(now - chrono::Duration::seconds(95));
        assert!(state.is_stale(now, chrono::Duration::milliseconds(90_000)));
    }
}
