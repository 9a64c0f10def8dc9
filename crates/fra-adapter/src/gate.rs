//! Gate.io USDT-margined perpetual futures adapter.
//!
//! Mirrors [`crate::binance`]'s structure; Gate.io spells symbols
//! underscored (`BTC_USDT`), signs with a `KEY`/`SIGN` header pair, and
//! caps WebSocket subscriptions at 20 per connection (spec §4.2).

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashSet;
use fra_core::decimal::{Money, Price, Rate, Size};
use fra_core::ids::{Symbol, Venue};
use fra_core::model::{FundingRate, SourceTag};
use fra_ws::{ConnectionConfig, PoolConfig};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::info;

use crate::adapter::{AdapterEvent, AdapterMemo, ExchangeAdapter, METADATA_CACHE_TTL};
use crate::error::{AdapterError, AdapterResult};
use crate::rest_client::RestClient;
use crate::types::{
    Balance, FundingPayment, OpenInterest, OrderRequest, OrderResult, OrderSide, OrderStatus,
    OrderType, PositionInfo, SymbolDialect, SymbolInfo,
};
use crate::ws_ingest::WsIngest;

const BASE_URL: &str = "https://api.gateio.ws";
const WS_URL: &str = "wss://fx-ws.gateio.ws/v4/ws/usdt";

/// Gate.io's documented per-connection subscription cap (spec §4.2).
pub const MAX_PER_CONNECTION: usize = 20;

pub struct GateAdapter {
    venue: Venue,
    rest: RestClient,
    memo: AdapterMemo,
    subscribed: DashSet<Symbol>,
    events_tx: broadcast::Sender<AdapterEvent>,
    ws: Arc<WsIngest>,
}

impl GateAdapter {
    pub fn new(api_key: Option<String>, api_secret: Option<String>) -> AdapterResult<Arc<Self>> {
        let mut rest = RestClient::new(BASE_URL)?.with_api_key_header("KEY");
        if let (Some(key), Some(secret)) = (api_key, api_secret) {
            rest = rest.with_credentials(key, secret);
        }
        let (events_tx, _) = broadcast::channel(1024);
        let ws = Arc::new(WsIngest::new(PoolConfig {
            url: WS_URL.to_string(),
            max_symbols_per_connection: MAX_PER_CONNECTION,
            connection: ConnectionConfig {
                ping_payload: serde_json::json!({ "time": 0, "channel": "futures.ping" }),
                ..ConnectionConfig::default()
            },
        }));
        let adapter = Arc::new(Self {
            venue: Venue::new("gate"),
            rest,
            memo: AdapterMemo::new(),
            subscribed: DashSet::new(),
            events_tx,
            ws,
        });
        adapter.ws.spawn_relay(adapter.events_tx.clone(), parse_gate_ws_message);
        Ok(adapter)
    }

    fn wire_symbol(symbol: &Symbol) -> String {
        crate::types::to_venue_symbol(symbol, "USDT", SymbolDialect::Underscored)
    }

    fn channel_tag(symbol: &Symbol) -> String {
        format!("futures.funding_rate|{}", Self::wire_symbol(symbol))
    }
}

#[derive(Debug, Deserialize)]
struct ContractEntry {
    name: String,
    #[serde(rename = "funding_rate")]
    funding_rate: String,
    #[serde(rename = "mark_price")]
    mark_price: String,
    #[serde(rename = "index_price")]
    index_price: String,
    #[serde(rename = "funding_next_apply")]
    funding_next_apply: i64,
    #[serde(rename = "funding_interval", default)]
    funding_interval: i64,
    #[serde(rename = "order_price_round")]
    order_price_round: String,
    #[serde(rename = "order_size_min", default)]
    order_size_min: i64,
    #[serde(rename = "leverage_max", default)]
    leverage_max: String,
}

#[derive(Debug, Deserialize)]
struct AccountEntry {
    total: String,
    available: String,
}

#[derive(Debug, Deserialize)]
struct PositionEntry {
    contract: String,
    size: i64,
    #[serde(rename = "entry_price")]
    entry_price: String,
    leverage: String,
    #[serde(rename = "unrealised_pnl")]
    unrealised_pnl: String,
}

#[derive(Debug, Deserialize)]
struct OrderEntry {
    id: i64,
    text: String,
    contract: String,
    status: String,
    size: i64,
    #[serde(rename = "fill_price", default)]
    fill_price: String,
    #[serde(rename = "is_reduce_only", default)]
    is_reduce_only: bool,
    #[serde(rename = "finish_time", default)]
    finish_time: i64,
    #[serde(rename = "tif", default)]
    tif: String,
}

#[derive(Debug, Deserialize)]
struct FundingRecordEntry {
    contract: String,
    #[serde(rename = "change")]
    change: String,
    time: i64,
}

#[derive(Debug, Deserialize)]
struct OpenInterestEntry {
    #[serde(rename = "total_size", default)]
    total_size: i64,
}

fn parse_decimal(s: &str, field: &str) -> AdapterResult<rust_decimal::Decimal> {
    s.parse().map_err(|_| AdapterError::Validation(format!("unparseable {field}: {s}")))
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn secs_to_utc(s: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(s, 0).single().unwrap_or_else(Utc::now)
}

/// Gate.io quotes leverage as a decimal string (`"100"`, occasionally
/// `"100.0"`); truncate to the integer multiplier.
fn parse_leverage(s: &str) -> u32 {
    s.parse::<rust_decimal::Decimal>()
        .ok()
        .and_then(|d| d.trunc().to_string().parse().ok())
        .unwrap_or(1)
}

fn parse_status(s: &str) -> OrderStatus {
    match s {
        "finished" => OrderStatus::Filled,
        "cancelled" => OrderStatus::Canceled,
        "open" => OrderStatus::New,
        _ => OrderStatus::New,
    }
}

#[derive(Debug, Deserialize)]
struct GateWsPush {
    channel: String,
    #[serde(default)]
    result: Vec<GateWsResult>,
}

#[derive(Debug, Deserialize)]
struct GateWsResult {
    contract: String,
    r: String,
    t: i64,
}

fn parse_gate_ws_message(payload: Value) -> Option<AdapterEvent> {
    let push: GateWsPush = serde_json::from_value(payload).ok()?;
    if push.channel != "futures.funding_rate" {
        return None;
    }
    let entry = push.result.into_iter().next()?;
    let rate: rust_decimal::Decimal = entry.r.parse().ok()?;
    let symbol = Symbol::new(entry.contract.replace('_', ""));
    let funding_rate = FundingRate {
        venue: Venue::new("gate"),
        rate: Rate::new(rate),
        mark_price: Price::ZERO,
        index_price: None,
        next_funding_time: secs_to_utc(entry.t),
        funding_interval_hours: fra_core::model::DEFAULT_FUNDING_INTERVAL_HOURS,
        received_at: Utc::now(),
        source: SourceTag::Websocket,
    };
    Some(AdapterEvent::FundingRate { symbol, rate: funding_rate })
}

#[allow(async_fn_in_trait)]
impl ExchangeAdapter for GateAdapter {
    fn venue(&self) -> &Venue {
        &self.venue
    }

    async fn connect(&self) -> AdapterResult<()> {
        info!(venue = %self.venue, "gate adapter connected (REST + WebSocket)");
        let _ = self.events_tx.send(AdapterEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        self.ws.shutdown();
        let _ = self.events_tx.send(AdapterEvent::Disconnected { reason: "adapter shutdown".to_string() });
        Ok(())
    }

    async fn get_funding_rate(&self, symbol: &Symbol) -> AdapterResult<FundingRate> {
        let wire = Self::wire_symbol(symbol);
        let interval = self.get_funding_interval(symbol).await?;
        let req = self
            .rest
            .public_request(Method::GET, &format!("/api/v4/futures/usdt/contracts/{wire}"));
        let entry: ContractEntry = self.rest.send_json(req).await?;
        Ok(FundingRate {
            venue: self.venue.clone(),
            rate: Rate::new(parse_decimal(&entry.funding_rate, "funding_rate")?),
            mark_price: Price::new(parse_decimal(&entry.mark_price, "mark_price")?),
            index_price: Some(Price::new(parse_decimal(&entry.index_price, "index_price")?)),
            next_funding_time: millis_to_utc(entry.funding_next_apply * 1000),
            funding_interval_hours: interval,
            received_at: Utc::now(),
            source: SourceTag::Rest,
        })
    }

    async fn get_funding_rates(&self, symbols: &[Symbol]) -> AdapterResult<Vec<(Symbol, FundingRate)>> {
        let mut out = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if let Ok(rate) = self.get_funding_rate(symbol).await {
                out.push((symbol.clone(), rate));
            }
        }
        Ok(out)
    }

    async fn get_funding_interval(&self, symbol: &Symbol) -> AdapterResult<u32> {
        self.memo
            .funding_interval
            .get_or_fetch(symbol.clone(), || async {
                Ok::<u32, AdapterError>(fra_core::model::DEFAULT_FUNDING_INTERVAL_HOURS)
            })
            .await
    }

    async fn get_price(&self, symbol: &Symbol) -> AdapterResult<Price> {
        let wire = Self::wire_symbol(symbol);
        let req = self
            .rest
            .public_request(Method::GET, &format!("/api/v4/futures/usdt/contracts/{wire}"));
        let entry: ContractEntry = self.rest.send_json(req).await?;
        Ok(Price::new(parse_decimal(&entry.mark_price, "mark_price")?))
    }

    async fn get_prices(&self, symbols: &[Symbol]) -> AdapterResult<Vec<(Symbol, Price)>> {
        let mut out = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            out.push((symbol.clone(), self.get_price(symbol).await?));
        }
        Ok(out)
    }

    async fn get_mark_prices(&self, symbols: &[Symbol]) -> AdapterResult<Vec<(Symbol, Price)>> {
        self.get_prices(symbols).await
    }

    async fn get_symbol_info(&self, symbol: &Symbol) -> AdapterResult<SymbolInfo> {
        let symbol = symbol.clone();
        let rest = &self.rest;
        let interval = self.get_funding_interval(&symbol).await?;
        self.memo
            .symbol_info
            .get_or_fetch(symbol.clone(), || async move {
                let wire = GateAdapter::wire_symbol(&symbol);
                let req = rest.public_request(Method::GET, &format!("/api/v4/futures/usdt/contracts/{wire}"));
                let entry: ContractEntry = rest.send_json(req).await?;
                let mut parts = wire.splitn(2, '_');
                let base_asset = parts.next().unwrap_or_default().to_string();
                let quote_asset = parts.next().unwrap_or("USDT").to_string();
                Ok::<SymbolInfo, AdapterError>(SymbolInfo {
                    symbol: symbol.clone(),
                    base_asset,
                    quote_asset,
                    tick_size: Price::new(parse_decimal(&entry.order_price_round, "order_price_round")?),
                    lot_size: Size::ONE,
                    max_leverage: parse_leverage(&entry.leverage_max),
                    funding_interval_hours: interval,
                })
            })
            .await
    }

    async fn get_usdt_perpetual_symbols(&self) -> AdapterResult<Vec<Symbol>> {
        let req = self.rest.public_request(Method::GET, "/api/v4/futures/usdt/contracts");
        let entries: Vec<ContractEntry> = self.rest.send_json(req).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.name.ends_with("_USDT"))
            .map(|e| Symbol::new(e.name.replace('_', "")))
            .collect())
    }

    async fn get_open_interest(&self, symbol: &Symbol) -> AdapterResult<OpenInterest> {
        let wire = Self::wire_symbol(symbol);
        let req = self
            .rest
            .public_request(Method::GET, &format!("/api/v4/futures/usdt/contracts/{wire}"));
        let entry: OpenInterestEntry = self.rest.send_json(req).await?;
        let oi = Size::new(rust_decimal::Decimal::from(entry.total_size));
        let price = self.get_price(symbol).await?;
        Ok(OpenInterest {
            symbol: symbol.clone(),
            open_interest: oi,
            open_interest_value: oi.notional(price),
            as_of: Utc::now(),
        })
    }

    async fn get_balance(&self, asset: &str) -> AdapterResult<Balance> {
        let req = self.rest.signed_request(Method::GET, "/api/v4/futures/usdt/accounts", "")?;
        let entry: AccountEntry = self.rest.send_json(req).await?;
        Ok(Balance {
            asset: asset.to_string(),
            total: Money::new(parse_decimal(&entry.total, "total")?),
            available: Money::new(parse_decimal(&entry.available, "available")?),
        })
    }

    async fn get_positions(&self) -> AdapterResult<Vec<PositionInfo>> {
        let req = self.rest.signed_request(Method::GET, "/api/v4/futures/usdt/positions", "")?;
        let entries: Vec<PositionEntry> = self.rest.send_json(req).await?;
        let mut out = Vec::new();
        for entry in entries {
            if entry.size == 0 {
                continue;
            }
            out.push(PositionInfo {
                symbol: Symbol::new(entry.contract.replace('_', "")),
                side: if entry.size > 0 { OrderSide::Buy } else { OrderSide::Sell },
                size: Size::new(rust_decimal::Decimal::from(entry.size.abs())),
                entry_price: Price::new(parse_decimal(&entry.entry_price, "entry_price")?),
                leverage: parse_leverage(&entry.leverage),
                unrealized_pnl: Money::new(parse_decimal(&entry.unrealised_pnl, "unrealised_pnl")?),
            });
        }
        Ok(out)
    }

    async fn create_order(&self, request: OrderRequest) -> AdapterResult<OrderResult> {
        let wire = Self::wire_symbol(&request.symbol);
        let signed_size = match request.side {
            OrderSide::Buy => request.size.inner(),
            OrderSide::Sell => -request.size.inner(),
        };
        let tif = match request.order_type {
            OrderType::Market => "ioc",
            _ => "gtc",
        };
        let query = format!(
            "contract={wire}&size={signed_size}&text=t-{}&tif={tif}&reduce_only={}",
            request.client_order_id, request.reduce_only,
        );
        let req = self.rest.signed_request(Method::POST, "/api/v4/futures/usdt/orders", &query)?;
        let entry: OrderEntry = self.rest.send_json(req).await?;
        let result = order_result_from_entry(self.venue.clone(), request.symbol, request.order_type, entry)?;
        let _ = self.events_tx.send(AdapterEvent::OrderStatusChanged(result.clone()));
        Ok(result)
    }

    async fn cancel_order(&self, _symbol: &Symbol, venue_order_id: &str) -> AdapterResult<()> {
        let path = format!("/api/v4/futures/usdt/orders/{venue_order_id}");
        let req = self.rest.signed_request(Method::DELETE, &path, "")?;
        let _entry: OrderEntry = self.rest.send_json(req).await?;
        Ok(())
    }

    async fn get_order(&self, symbol: &Symbol, venue_order_id: &str) -> AdapterResult<OrderResult> {
        let path = format!("/api/v4/futures/usdt/orders/{venue_order_id}");
        let req = self.rest.signed_request(Method::GET, &path, "")?;
        let entry: OrderEntry = self.rest.send_json(req).await?;
        let order_type = if entry.tif == "ioc" { OrderType::Market } else { OrderType::Limit };
        order_result_from_entry(self.venue.clone(), symbol.clone(), order_type, entry)
    }

    async fn get_funding_payments(&self, symbol: &Symbol, since: DateTime<Utc>) -> AdapterResult<Vec<FundingPayment>> {
        let wire = Self::wire_symbol(symbol);
        let query = format!("contract={wire}&type=fund&from={}", since.timestamp());
        let req = self.rest.signed_request(Method::GET, "/api/v4/futures/usdt/account_book", &query)?;
        let entries: Vec<FundingRecordEntry> = self.rest.send_json(req).await?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            out.push(FundingPayment {
                symbol: Symbol::new(entry.contract.replace('_', "")),
                amount: Money::new(parse_decimal(&entry.change, "change")?),
                rate: Rate::ZERO,
                paid_at: secs_to_utc(entry.time),
            });
        }
        Ok(out)
    }

    async fn subscribe(&self, symbol: &Symbol) -> AdapterResult<()> {
        if !self.subscribed.insert(symbol.clone()) {
            return Ok(());
        }
        let wire = Self::wire_symbol(symbol);
        let tag = Self::channel_tag(symbol);
        let payload = serde_json::json!({
            "time": Utc::now().timestamp(),
            "channel": "futures.funding_rate",
            "event": "subscribe",
            "payload": [wire],
        });
        if let Err(e) = self.ws.subscribe(tag, payload).await {
            self.subscribed.remove(symbol);
            return Err(e);
        }
        Ok(())
    }

    async fn unsubscribe(&self, symbol: &Symbol) -> AdapterResult<()> {
        if self.subscribed.remove(symbol).is_none() {
            return Ok(());
        }
        self.ws.unsubscribe(&Self::channel_tag(symbol)).await
    }

    fn events(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events_tx.subscribe()
    }
}

fn order_result_from_entry(
    venue: Venue,
    symbol: Symbol,
    order_type: OrderType,
    entry: OrderEntry,
) -> AdapterResult<OrderResult> {
    let status = parse_status(&entry.status);
    Ok(OrderResult {
        venue,
        venue_order_id: entry.id.to_string(),
        client_order_id: entry.text,
        symbol,
        side: if entry.size >= 0 { OrderSide::Buy } else { OrderSide::Sell },
        status,
        order_type,
        conditional_kind: None,
        stop_price: None,
        filled_size: Size::new(rust_decimal::Decimal::from(entry.size.abs())),
        avg_fill_price: (!entry.fill_price.is_empty())
            .then(|| parse_decimal(&entry.fill_price, "fill_price"))
            .transpose()?
            .map(Price::new),
        realized_pnl: None,
        updated_at: if entry.finish_time > 0 { secs_to_utc(entry.finish_time) } else { Utc::now() },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_symbol_is_underscored() {
        let symbol = Symbol::new("BTCUSDT");
        assert_eq!(GateAdapter::wire_symbol(&symbol), "BTC_USDT");
    }

    #[test]
    fn parse_status_maps_terminal_states() {
        assert_eq!(parse_status("finished"), OrderStatus::Filled);
        assert_eq!(parse_status("cancelled"), OrderStatus::Canceled);
    }
}
