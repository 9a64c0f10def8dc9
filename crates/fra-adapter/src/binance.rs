//! Binance USDT-M Futures adapter — the reference [`ExchangeAdapter`]
//! implementation other venues are modeled after.
//!
//! Grounded in the HMAC-SHA256 signed-request pattern of
//! `BinanceClient` (account/order/balance endpoints) combined with the
//! funding/mark-price endpoints `fapi.binance.com` exposes for USDT-M
//! perpetuals.

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
use tracing::{info, warn};

use crate::adapter::{AdapterEvent, AdapterMemo, ExchangeAdapter, METADATA_CACHE_TTL};
use crate::error::{AdapterError, AdapterResult};
use crate::rest_client::RestClient;
use crate::types::{
    Balance, FundingPayment, OpenInterest, OrderRequest, OrderResult, OrderSide, OrderStatus,
    OrderType, PositionInfo, SymbolDialect, SymbolInfo,
};
use crate::ws_ingest::WsIngest;

const BASE_URL: &str = "https://fapi.binance.com";
const WS_URL: &str = "wss://fstream.binance.com/stream";

/// Binance's combined-stream WebSocket has no documented hard cap on
/// streams per connection comparable to OKX/Gate/BingX (spec §4.2
/// enumerates those three explicitly); 200 is a conservative default
/// kept well under Binance's documented 1024-stream ceiling.
const DEFAULT_MAX_PER_CONNECTION: usize = 200;

pub struct BinanceAdapter {
    venue: Venue,
    rest: RestClient,
    memo: AdapterMemo,
    subscribed: DashSet<Symbol>,
    events_tx: broadcast::Sender<AdapterEvent>,
    ws: Arc<WsIngest>,
}

impl BinanceAdapter {
    pub fn new(api_key: Option<String>, api_secret: Option<String>) -> AdapterResult<Arc<Self>> {
        let mut rest = RestClient::new(BASE_URL)?;
        if let (Some(key), Some(secret)) = (api_key, api_secret) {
            rest = rest.with_credentials(key, secret);
        }
        let (events_tx, _) = broadcast::channel(1024);
        let ws = Arc::new(WsIngest::new(PoolConfig {
            url: WS_URL.to_string(),
            max_symbols_per_connection: DEFAULT_MAX_PER_CONNECTION,
            connection: ConnectionConfig {
                ping_payload: serde_json::json!({ "method": "ping" }),
                ..ConnectionConfig::default()
            },
        }));
        let adapter = Arc::new(Self {
            venue: Venue::new("binance"),
            rest,
            memo: AdapterMemo::new(),
            subscribed: DashSet::new(),
            events_tx,
            ws,
        });
        adapter.ws.spawn_relay(adapter.events_tx.clone(), parse_binance_ws_message);
        Ok(adapter)
    }

    fn wire_symbol(symbol: &Symbol) -> String {
        crate::types::to_venue_symbol(symbol, "USDT", SymbolDialect::Concatenated)
    }

    /// Binance combined-stream name for a symbol's 1s mark-price/funding
    /// push, e.g. `btcusdt@markPrice@1s`.
    fn stream_name(symbol: &Symbol) -> String {
        format!("{}@markPrice@1s", Self::wire_symbol(symbol).to_lowercase())
    }
}

#[derive(Debug, Deserialize)]
struct MarkPriceEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    mark_price: String,
    #[serde(rename = "i", default)]
    index_price: Option<String>,
    #[serde(rename = "r", default)]
    funding_rate: Option<String>,
    #[serde(rename = "T")]
    next_funding_time: i64,
}

/// Parse one raw combined-stream payload (`{"stream": "...", "data": {...}}`)
/// into a `FundingRate` update, or `None` for anything that isn't a
/// `markPriceUpdate` push.
fn parse_binance_ws_message(payload: Value) -> Option<AdapterEvent> {
    let data = payload.get("data").unwrap_or(&payload);
    let event: MarkPriceEvent = serde_json::from_value(data.clone()).ok()?;
    if event.event_type != "markPriceUpdate" {
        return None;
    }
    let rate = event.funding_rate.as_deref()?.parse().ok()?;
    let mark_price = event.mark_price.parse().ok()?;
    let index_price = event
        .index_price
        .as_deref()
        .and_then(|s| s.parse().ok())
        .map(Price::new);

    let symbol = Symbol::new(event.symbol);
    let funding_rate = FundingRate {
        venue: Venue::new("binance"),
        rate: Rate::new(rate),
        mark_price: Price::new(mark_price),
        index_price,
        next_funding_time: millis_to_utc(event.next_funding_time),
        funding_interval_hours: fra_core::model::DEFAULT_FUNDING_INTERVAL_HOURS,
        received_at: Utc::now(),
        source: SourceTag::Websocket,
    };
    Some(AdapterEvent::FundingRate { symbol, rate: funding_rate })
}

#[derive(Debug, Deserialize)]
struct PremiumIndexResponse {
    symbol: String,
    #[serde(rename = "markPrice")]
    mark_price: String,
    #[serde(rename = "indexPrice")]
    index_price: String,
    #[serde(rename = "lastFundingRate")]
    last_funding_rate: String,
    #[serde(rename = "nextFundingTime")]
    next_funding_time: i64,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<ExchangeInfoSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoSymbol {
    symbol: String,
    #[serde(rename = "baseAsset")]
    base_asset: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
    filters: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    asset: String,
    balance: String,
    #[serde(rename = "availableBalance")]
    available_balance: String,
}

#[derive(Debug, Deserialize)]
struct PositionRiskEntry {
    symbol: String,
    #[serde(rename = "positionAmt")]
    position_amt: String,
    #[serde(rename = "entryPrice")]
    entry_price: String,
    leverage: String,
    #[serde(rename = "unRealizedProfit")]
    unrealized_profit: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderId")]
    order_id: i64,
    #[serde(rename = "clientOrderId")]
    client_order_id: String,
    symbol: String,
    status: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    #[serde(rename = "stopPrice", default)]
    stop_price: Option<String>,
    #[serde(rename = "executedQty")]
    executed_qty: String,
    #[serde(rename = "avgPrice", default)]
    avg_price: Option<String>,
    #[serde(rename = "updateTime", default)]
    update_time: i64,
}

#[derive(Debug, Deserialize)]
struct IncomeEntry {
    symbol: String,
    income: String,
    time: i64,
}

#[derive(Debug, Deserialize)]
struct OpenInterestResponse {
    #[serde(rename = "openInterest")]
    open_interest: String,
}

fn parse_decimal(s: &str, field: &str) -> AdapterResult<rust_decimal::Decimal> {
    s.parse()
        .map_err(|_| AdapterError::Validation(format!("unparseable {field}: {s}")))
}

fn parse_status(s: &str) -> OrderStatus {
    match s {
        "FILLED" => OrderStatus::Filled,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "CANCELED" | "EXPIRED" => OrderStatus::Canceled,
        "REJECTED" => OrderStatus::Rejected,
        _ => OrderStatus::New,
    }
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn parse_side(s: &str) -> OrderSide {
    match s {
        "SELL" => OrderSide::Sell,
        _ => OrderSide::Buy,
    }
}

fn parse_order_type(s: &str) -> OrderType {
    match s {
        "MARKET" => OrderType::Market,
        "LIMIT" => OrderType::Limit,
        _ => OrderType::Conditional,
    }
}

/// The wire order-type string, lowercased, for conditional orders only
/// (spec §4.8 classification input); `None` for plain market/limit orders.
fn conditional_kind(order_type: OrderType, raw: &str) -> Option<String> {
    matches!(order_type, OrderType::Conditional).then(|| raw.to_lowercase())
}

impl BinanceAdapter {
    async fn fetch_premium_index(&self, symbol: &Symbol) -> AdapterResult<PremiumIndexResponse> {
        let wire = Self::wire_symbol(symbol);
        let req = self
            .rest
            .public_request(Method::GET, &format!("/fapi/v1/premiumIndex?symbol={wire}"));
        self.rest.send_json(req).await
    }

    fn to_funding_rate(&self, resp: PremiumIndexResponse, interval_hours: u32) -> AdapterResult<FundingRate> {
        Ok(FundingRate {
            venue: self.venue.clone(),
            rate: Rate::new(parse_decimal(&resp.last_funding_rate, "lastFundingRate")?),
            mark_price: Price::new(parse_decimal(&resp.mark_price, "markPrice")?),
            index_price: Some(Price::new(parse_decimal(&resp.index_price, "indexPrice")?)),
            next_funding_time: millis_to_utc(resp.next_funding_time),
            funding_interval_hours: interval_hours,
            received_at: Utc::now(),
            source: SourceTag::Rest,
        })
    }
}

#[allow(async_fn_in_trait)]
impl ExchangeAdapter for BinanceAdapter {
    fn venue(&self) -> &Venue {
        &self.venue
    }

    async fn connect(&self) -> AdapterResult<()> {
        info!(venue = %self.venue, "binance adapter connected (REST + WebSocket)");
        let _ = self.events_tx.send(AdapterEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        self.ws.shutdown();
        let _ = self.events_tx.send(AdapterEvent::Disconnected {
            reason: "adapter shutdown".to_string(),
        });
        Ok(())
    }

    async fn get_funding_rate(&self, symbol: &Symbol) -> AdapterResult<FundingRate> {
        let interval = self.get_funding_interval(symbol).await?;
        let resp = self.fetch_premium_index(symbol).await?;
        self.to_funding_rate(resp, interval)
    }

    async fn get_funding_rates(&self, symbols: &[Symbol]) -> AdapterResult<Vec<(Symbol, FundingRate)>> {
        let mut out = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.get_funding_rate(symbol).await {
                Ok(rate) => out.push((symbol.clone(), rate)),
                Err(e) => warn!(%symbol, error = %e, "failed to fetch funding rate"),
            }
        }
        Ok(out)
    }

    async fn get_funding_interval(&self, symbol: &Symbol) -> AdapterResult<u32> {
        // Binance USDT-M perpetuals settle every 8h; it doesn't expose the
        // interval directly, so we fall back to the shared default and
        // memoize it like any venue-reported value.
        self.memo
            .funding_interval
            .get_or_fetch(symbol.clone(), || async {
                Ok::<u32, AdapterError>(fra_core::model::DEFAULT_FUNDING_INTERVAL_HOURS)
            })
            .await
    }

    async fn get_price(&self, symbol: &Symbol) -> AdapterResult<Price> {
        let resp = self.fetch_premium_index(symbol).await?;
        Ok(Price::new(parse_decimal(&resp.mark_price, "markPrice")?))
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
                let req = rest.public_request(Method::GET, "/fapi/v1/exchangeInfo");
                let resp: ExchangeInfoResponse = rest.send_json(req).await?;
                let wire = BinanceAdapter::wire_symbol(&symbol);
                let entry = resp
                    .symbols
                    .into_iter()
                    .find(|s| s.symbol == wire)
                    .ok_or_else(|| AdapterError::Validation(format!("unknown symbol: {wire}")))?;

                let mut tick_size = Price::ZERO;
                let mut lot_size = Size::ZERO;
                for filter in &entry.filters {
                    if filter.get("filterType").and_then(|v| v.as_str()) == Some("PRICE_FILTER") {
                        if let Some(t) = filter.get("tickSize").and_then(|v| v.as_str()) {
                            tick_size = Price::new(parse_decimal(t, "tickSize")?);
                        }
                    }
                    if filter.get("filterType").and_then(|v| v.as_str()) == Some("LOT_SIZE") {
                        if let Some(t) = filter.get("stepSize").and_then(|v| v.as_str()) {
                            lot_size = Size::new(parse_decimal(t, "stepSize")?);
                        }
                    }
                }

                Ok::<SymbolInfo, AdapterError>(SymbolInfo {
                    symbol: symbol.clone(),
                    base_asset: entry.base_asset,
                    quote_asset: entry.quote_asset,
                    tick_size,
                    lot_size,
                    max_leverage: 125,
                    funding_interval_hours: interval,
                })
            })
            .await
    }

    async fn get_usdt_perpetual_symbols(&self) -> AdapterResult<Vec<Symbol>> {
        let req = self.rest.public_request(Method::GET, "/fapi/v1/exchangeInfo");
        let resp: ExchangeInfoResponse = self.rest.send_json(req).await?;
        Ok(resp
            .symbols
            .into_iter()
            .filter(|s| s.quote_asset == "USDT")
            .map(|s| Symbol::new(s.symbol))
            .collect())
    }

    async fn get_open_interest(&self, symbol: &Symbol) -> AdapterResult<OpenInterest> {
        let wire = Self::wire_symbol(symbol);
        let req = self
            .rest
            .public_request(Method::GET, &format!("/fapi/v1/openInterest?symbol={wire}"));
        let resp: OpenInterestResponse = self.rest.send_json(req).await?;
        let oi = Size::new(parse_decimal(&resp.open_interest, "openInterest")?);
        let price = self.get_price(symbol).await?;
        Ok(OpenInterest {
            symbol: symbol.clone(),
            open_interest: oi,
            open_interest_value: oi.notional(price),
            as_of: Utc::now(),
        })
    }

    async fn get_balance(&self, asset: &str) -> AdapterResult<Balance> {
        let req = self.rest.signed_request(Method::GET, "/fapi/v2/balance", "")?;
        let resp: Vec<BalanceEntry> = self.rest.send_json(req).await?;
        let entry = resp
            .into_iter()
            .find(|e| e.asset == asset)
            .ok_or_else(|| AdapterError::Validation(format!("unknown asset: {asset}")))?;
        Ok(Balance {
            asset: entry.asset,
            total: Money::new(parse_decimal(&entry.balance, "balance")?),
            available: Money::new(parse_decimal(&entry.available_balance, "availableBalance")?),
        })
    }

    async fn get_positions(&self) -> AdapterResult<Vec<PositionInfo>> {
        let req = self.rest.signed_request(Method::GET, "/fapi/v2/positionRisk", "")?;
        let resp: Vec<PositionRiskEntry> = self.rest.send_json(req).await?;

        let mut out = Vec::new();
        for entry in resp {
            let amt = parse_decimal(&entry.position_amt, "positionAmt")?;
            if amt.is_zero() {
                continue;
            }
            out.push(PositionInfo {
                symbol: Symbol::new(entry.symbol),
                side: if amt.is_sign_positive() { OrderSide::Buy } else { OrderSide::Sell },
                size: Size::new(amt.abs()),
                entry_price: Price::new(parse_decimal(&entry.entry_price, "entryPrice")?),
                leverage: entry.leverage.parse().unwrap_or(1),
                unrealized_pnl: Money::new(parse_decimal(&entry.unrealized_profit, "unRealizedProfit")?),
            });
        }
        Ok(out)
    }

    async fn create_order(&self, request: OrderRequest) -> AdapterResult<OrderResult> {
        let wire = Self::wire_symbol(&request.symbol);
        let side = match request.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let order_type = match request.order_type {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::Conditional => "STOP_MARKET",
        };

        let mut query = format!(
            "symbol={wire}&side={side}&type={order_type}&quantity={}&newClientOrderId={}",
            request.size.inner(),
            request.client_order_id
        );
        if request.reduce_only {
            query.push_str("&reduceOnly=true");
        }
        if let Some(price) = request.price {
            query.push_str(&format!("&price={}&timeInForce=GTC", price.inner()));
        }

        let req = self.rest.signed_request(Method::POST, "/fapi/v1/order", &query)?;
        let resp: OrderResponse = self.rest.send_json(req).await?;
        let parsed_order_type = parse_order_type(&resp.order_type);
        let result = OrderResult {
            venue: self.venue.clone(),
            venue_order_id: resp.order_id.to_string(),
            client_order_id: resp.client_order_id,
            symbol: request.symbol,
            side: parse_side(&resp.side),
            status: parse_status(&resp.status),
            order_type: parsed_order_type,
            conditional_kind: conditional_kind(parsed_order_type, &resp.order_type),
            stop_price: resp
                .stop_price
                .as_deref()
                .filter(|s| !s.is_empty() && *s != "0")
                .map(|s| parse_decimal(s, "stopPrice"))
                .transpose()?
                .map(Price::new),
            filled_size: Size::new(parse_decimal(&resp.executed_qty, "executedQty")?),
            avg_fill_price: resp
                .avg_price
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| parse_decimal(s, "avgPrice"))
                .transpose()?
                .map(Price::new),
            realized_pnl: None,
            updated_at: millis_to_utc(resp.update_time),
        };
        let _ = self.events_tx.send(AdapterEvent::OrderStatusChanged(result.clone()));
        Ok(result)
    }

    async fn cancel_order(&self, symbol: &Symbol, venue_order_id: &str) -> AdapterResult<()> {
        let wire = Self::wire_symbol(symbol);
        let query = format!("symbol={wire}&orderId={venue_order_id}");
        let req = self.rest.signed_request(Method::DELETE, "/fapi/v1/order", &query)?;
        let _resp: OrderResponse = self.rest.send_json(req).await?;
        Ok(())
    }

    async fn get_order(&self, symbol: &Symbol, venue_order_id: &str) -> AdapterResult<OrderResult> {
        let wire = Self::wire_symbol(symbol);
        let query = format!("symbol={wire}&orderId={venue_order_id}");
        let req = self.rest.signed_request(Method::GET, "/fapi/v1/order", &query)?;
        let resp: OrderResponse = self.rest.send_json(req).await?;
        let parsed_order_type = parse_order_type(&resp.order_type);
        Ok(OrderResult {
            venue: self.venue.clone(),
            venue_order_id: resp.order_id.to_string(),
            client_order_id: resp.client_order_id,
            symbol: symbol.clone(),
            side: parse_side(&resp.side),
            status: parse_status(&resp.status),
            order_type: parsed_order_type,
            conditional_kind: conditional_kind(parsed_order_type, &resp.order_type),
            stop_price: resp
                .stop_price
                .as_deref()
                .filter(|s| !s.is_empty() && *s != "0")
                .map(|s| parse_decimal(s, "stopPrice"))
                .transpose()?
                .map(Price::new),
            filled_size: Size::new(parse_decimal(&resp.executed_qty, "executedQty")?),
            avg_fill_price: resp
                .avg_price
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| parse_decimal(s, "avgPrice"))
                .transpose()?
                .map(Price::new),
            realized_pnl: None,
            updated_at: millis_to_utc(resp.update_time),
        })
    }

    async fn get_funding_payments(
        &self,
        symbol: &Symbol,
        since: DateTime<Utc>,
    ) -> AdapterResult<Vec<FundingPayment>> {
        let wire = Self::wire_symbol(symbol);
        let query = format!(
            "symbol={wire}&incomeType=FUNDING_FEE&startTime={}",
            since.timestamp_millis()
        );
        let req = self.rest.signed_request(Method::GET, "/fapi/v1/income", &query)?;
        let resp: Vec<IncomeEntry> = self.rest.send_json(req).await?;

        let mut out = Vec::with_capacity(resp.len());
        for entry in resp {
            out.push(FundingPayment {
                symbol: Symbol::new(entry.symbol),
                amount: Money::new(parse_decimal(&entry.income, "income")?),
                // Binance's income history reports the paid amount only,
                // not the rate in effect at settlement time.
                rate: Rate::ZERO,
                paid_at: millis_to_utc(entry.time),
            });
        }
        Ok(out)
    }

    async fn subscribe(&self, symbol: &Symbol) -> AdapterResult<()> {
        if !self.subscribed.insert(symbol.clone()) {
            // spec §4.2 "Rejects no-op duplicates".
            return Ok(());
        }
        let tag = Self::stream_name(symbol);
        let payload = serde_json::json!({
            "method": "SUBSCRIBE",
            "params": [tag.clone()],
            "id": 1,
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
        self.ws.unsubscribe(&Self::stream_name(symbol)).await
    }

    fn events(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_symbol_is_concatenated() {
        let symbol = Symbol::new("BTCUSDT");
        assert_eq!(BinanceAdapter::wire_symbol(&symbol), "BTCUSDT");
    }

    #[test]
    fn parse_status_maps_terminal_states() {
        assert_eq!(parse_status("FILLED"), OrderStatus::Filled);
        assert_eq!(parse_status("CANCELED"), OrderStatus::Canceled);
        assert_eq!(parse_status("NEW"), OrderStatus::New);
    }
}
