//! The Exchange Adapter contract (spec §4.1).
//!
//! One implementation per venue translates that venue's REST/WebSocket
//! wire format into this shared trait, so every component above this
//! crate (feed, detector, position, executor) talks to exchanges through
//! a single uniform surface.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fra_core::decimal::Price;
use fra_core::ids::{Symbol, Venue};
use fra_core::model::FundingRate;
use tokio::sync::broadcast;

use crate::error::AdapterResult;
use crate::memo::TtlCache;
use crate::types::{Balance, FundingPayment, OpenInterest, OrderRequest, OrderResult, PositionInfo, SymbolInfo};

/// Default TTL for memoized per-symbol metadata (funding interval, symbol
/// info) that venues rarely change without notice.
pub const METADATA_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Events an adapter's WebSocket leg emits, spec §4.1's event channel
/// (`fundingRate`, `fundingRateBatch`, `markPrice`, `orderStatusChanged`,
/// `connected`, `disconnected`, `error`).
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    FundingRate { symbol: Symbol, rate: FundingRate },
    FundingRateBatch(Vec<(Symbol, FundingRate)>),
    MarkPrice { symbol: Symbol, price: Price, at: DateTime<Utc> },
    OrderStatusChanged(OrderResult),
    Connected,
    Disconnected { reason: String },
    Error { message: String },
}

/// Uniform interface every venue integration implements (spec §4.1).
///
/// Adapters are expected to memoize `get_funding_interval`/`get_symbol_info`
/// internally (see [`METADATA_CACHE_TTL`]) since both are effectively
/// static and REST round-trips would otherwise dominate the hot path.
#[allow(async_fn_in_trait)]
pub trait ExchangeAdapter: Send + Sync {
    fn venue(&self) -> &Venue;

    async fn connect(&self) -> AdapterResult<()>;
    async fn disconnect(&self) -> AdapterResult<()>;

    async fn get_funding_rate(&self, symbol: &Symbol) -> AdapterResult<FundingRate>;
    async fn get_funding_rates(&self, symbols: &[Symbol]) -> AdapterResult<Vec<(Symbol, FundingRate)>>;

    /// Funding interval hours for `symbol`; falls back to
    /// [`fra_core::model::DEFAULT_FUNDING_INTERVAL_HOURS`] when the venue
    /// doesn't expose one.
    async fn get_funding_interval(&self, symbol: &Symbol) -> AdapterResult<u32>;

    async fn get_price(&self, symbol: &Symbol) -> AdapterResult<Price>;
    async fn get_prices(&self, symbols: &[Symbol]) -> AdapterResult<Vec<(Symbol, Price)>>;
    async fn get_mark_prices(&self, symbols: &[Symbol]) -> AdapterResult<Vec<(Symbol, Price)>>;

    async fn get_symbol_info(&self, symbol: &Symbol) -> AdapterResult<SymbolInfo>;
    async fn get_usdt_perpetual_symbols(&self) -> AdapterResult<Vec<Symbol>>;
    async fn get_open_interest(&self, symbol: &Symbol) -> AdapterResult<OpenInterest>;

    async fn get_balance(&self, asset: &str) -> AdapterResult<Balance>;
    async fn get_positions(&self) -> AdapterResult<Vec<PositionInfo>>;

    async fn create_order(&self, request: OrderRequest) -> AdapterResult<OrderResult>;
    async fn cancel_order(&self, symbol: &Symbol, venue_order_id: &str) -> AdapterResult<()>;
    async fn get_order(&self, symbol: &Symbol, venue_order_id: &str) -> AdapterResult<OrderResult>;

    async fn get_funding_payments(
        &self,
        symbol: &Symbol,
        since: DateTime<Utc>,
    ) -> AdapterResult<Vec<FundingPayment>>;

    /// Add `symbol` to this adapter's WebSocket subscription set.
    async fn subscribe(&self, symbol: &Symbol) -> AdapterResult<()>;
    async fn unsubscribe(&self, symbol: &Symbol) -> AdapterResult<()>;

    /// Subscribe to the adapter's event stream (spec §4.1 event channel).
    fn events(&self) -> broadcast::Receiver<AdapterEvent>;
}

/// Shared memoization state an adapter implementation composes in, so
/// `get_funding_interval`/`get_symbol_info` are cheap after the first call.
pub struct AdapterMemo {
    pub funding_interval: TtlCache<Symbol, u32>,
    pub symbol_info: TtlCache<Symbol, SymbolInfo>,
}

impl AdapterMemo {
    pub fn new() -> Self {
        Self {
            funding_interval: TtlCache::new(METADATA_CACHE_TTL),
            symbol_info: TtlCache::new(METADATA_CACHE_TTL),
        }
    }
}

impl Default for AdapterMemo {
    fn default() -> Self {
        Self::new()
    }
}
