//! Static-dispatch union of every concrete adapter.
//!
//! [`ExchangeAdapter`] uses `async fn` directly rather than the
//! `async-trait` crate (spec §4.1 keeps the surface free of boxed
//! futures on the hot path), which means the trait isn't object-safe —
//! a bare `Vec<Box<dyn ExchangeAdapter>>` won't compile. [`AdapterRegistry`]
//! is generic over one concrete `A: ExchangeAdapter`, so a deployment
//! running more than one venue needs that `A` to itself be a closed
//! enum of every venue rather than a trait object. `AnyAdapter` is that
//! enum: each variant matches out to the concrete adapter and delegates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fra_core::decimal::Price;
use fra_core::ids::{Symbol, Venue};
use fra_core::model::FundingRate;
use tokio::sync::broadcast;

use crate::adapter::{AdapterEvent, ExchangeAdapter};
use crate::bingx::BingxAdapter;
use crate::binance::BinanceAdapter;
use crate::error::AdapterResult;
use crate::gate::GateAdapter;
use crate::okx::OkxAdapter;
use crate::types::{Balance, FundingPayment, OpenInterest, OrderRequest, OrderResult, PositionInfo, SymbolInfo};

/// One enum member per supported venue (spec §4 names Binance, OKX,
/// Gate.io, BingX). Every variant wraps the `Arc<Self>` each adapter's
/// own `new()` already returns.
#[derive(Clone)]
pub enum AnyAdapter {
    Binance(Arc<BinanceAdapter>),
    Okx(Arc<OkxAdapter>),
    Gate(Arc<GateAdapter>),
    Bingx(Arc<BingxAdapter>),
}

impl AnyAdapter {
    /// Construct the adapter named by `venue` (`"binance"`, `"okx"`,
    /// `"gate"`, `"bingx"`), or `None` for an unrecognized name.
    pub fn build(venue: &str, api_key: Option<String>, api_secret: Option<String>) -> Option<AdapterResult<Self>> {
        Some(match venue {
            "binance" => BinanceAdapter::new(api_key, api_secret).map(AnyAdapter::Binance),
            "okx" => OkxAdapter::new(api_key, api_secret).map(AnyAdapter::Okx),
            "gate" => GateAdapter::new(api_key, api_secret).map(AnyAdapter::Gate),
            "bingx" => BingxAdapter::new(api_key, api_secret).map(AnyAdapter::Bingx),
            _ => return None,
        })
    }
}

macro_rules! delegate {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            AnyAdapter::Binance(a) => a.$method($($arg),*).await,
            AnyAdapter::Okx(a) => a.$method($($arg),*).await,
            AnyAdapter::Gate(a) => a.$method($($arg),*).await,
            AnyAdapter::Bingx(a) => a.$method($($arg),*).await,
        }
    };
}

#[allow(async_fn_in_trait)]
impl ExchangeAdapter for AnyAdapter {
    fn venue(&self) -> &Venue {
        match self {
            AnyAdapter::Binance(a) => a.venue(),
            AnyAdapter::Okx(a) => a.venue(),
            AnyAdapter::Gate(a) => a.venue(),
            AnyAdapter::Bingx(a) => a.venue(),
        }
    }

    async fn connect(&self) -> AdapterResult<()> {
        delegate!(self, connect)
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        delegate!(self, disconnect)
    }

    async fn get_funding_rate(&self, symbol: &Symbol) -> AdapterResult<FundingRate> {
        delegate!(self, get_funding_rate, symbol)
    }

    async fn get_funding_rates(&self, symbols: &[Symbol]) -> AdapterResult<Vec<(Symbol, FundingRate)>> {
        delegate!(self, get_funding_rates, symbols)
    }

    async fn get_funding_interval(&self, symbol: &Symbol) -> AdapterResult<u32> {
        delegate!(self, get_funding_interval, symbol)
    }

    async fn get_price(&self, symbol: &Symbol) -> AdapterResult<Price> {
        delegate!(self, get_price, symbol)
    }

    async fn get_prices(&self, symbols: &[Symbol]) -> AdapterResult<Vec<(Symbol, Price)>> {
        delegate!(self, get_prices, symbols)
    }

    async fn get_mark_prices(&self, symbols: &[Symbol]) -> AdapterResult<Vec<(Symbol, Price)>> {
        delegate!(self, get_mark_prices, symbols)
    }

    async fn get_symbol_info(&self, symbol: &Symbol) -> AdapterResult<SymbolInfo> {
        delegate!(self, get_symbol_info, symbol)
    }

    async fn get_usdt_perpetual_symbols(&self) -> AdapterResult<Vec<Symbol>> {
        delegate!(self, get_usdt_perpetual_symbols)
    }

    async fn get_open_interest(&self, symbol: &Symbol) -> AdapterResult<OpenInterest> {
        delegate!(self, get_open_interest, symbol)
    }

    async fn get_balance(&self, asset: &str) -> AdapterResult<Balance> {
        delegate!(self, get_balance, asset)
    }

    async fn get_positions(&self) -> AdapterResult<Vec<PositionInfo>> {
        delegate!(self, get_positions)
    }

    async fn create_order(&self, request: OrderRequest) -> AdapterResult<OrderResult> {
        delegate!(self, create_order, request)
    }

    async fn cancel_order(&self, symbol: &Symbol, venue_order_id: &str) -> AdapterResult<()> {
        delegate!(self, cancel_order, symbol, venue_order_id)
    }

    async fn get_order(&self, symbol: &Symbol, venue_order_id: &str) -> AdapterResult<OrderResult> {
        delegate!(self, get_order, symbol, venue_order_id)
    }

    async fn get_funding_payments(&self, symbol: &Symbol, since: DateTime<Utc>) -> AdapterResult<Vec<FundingPayment>> {
        delegate!(self, get_funding_payments, symbol, since)
    }

    async fn subscribe(&self, symbol: &Symbol) -> AdapterResult<()> {
        delegate!(self, subscribe, symbol)
    }

    async fn unsubscribe(&self, symbol: &Symbol) -> AdapterResult<()> {
        delegate!(self, unsubscribe, symbol)
    }

    fn events(&self) -> broadcast::Receiver<AdapterEvent> {
        match self {
            AnyAdapter::Binance(a) => a.events(),
            AnyAdapter::Okx(a) => a.events(),
            AnyAdapter::Gate(a) => a.events(),
            AnyAdapter::Bingx(a) => a.events(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_unknown_venue() {
        assert!(AnyAdapter::build("deribit", None, None).is_none());
    }

    #[test]
    fn build_constructs_known_venues() {
        for venue in ["binance", "okx", "gate", "bingx"] {
            let built = AnyAdapter::build(venue, None, None).expect("known venue");
            let adapter = built.expect("construction succeeds without credentials");
            assert_eq!(adapter.venue().as_str(), venue);
        }
    }
}
