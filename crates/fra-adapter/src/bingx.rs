//! BingX USDT-margined perpetual swap adapter.
//!
//! Mirrors [`crate::binance`]'s structure; BingX spells symbols
//! hyphenated (`BTC-USDT`), signs with an `X-BX-APIKEY` header, and
//! caps WebSocket subscriptions at 50 per connection (spec §4.2).

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

const BASE_URL: &str = "https://open-api.bingx.com";
const WS_URL: &str = "wss://open-api-swap.bingx.com/swap-market";

/// BingX's documented per-connection subscription cap (spec §4.2).
pub const MAX_PER_CONNECTION: usize = 50;

pub struct BingxAdapter {
    venue: Venue,
    rest: RestClient,
    memo: AdapterMemo,
    subscribed: DashSet<Symbol>,
    events_tx: broadcast::Sender<AdapterEvent>,
    ws: Arc<WsIngest>,
}

impl BingxAdapter {
    pub fn new(api_key: Option<String>, api_secret: Option<String>) -> AdapterResult<Arc<Self>> {
        let mut rest = RestClient::new(BASE_URL)?.with_api_key_header("X-BX-APIKEY");
        if let (Some(key), Some(secret)) = (api_key, api_secret) {
            rest = rest.with_credentials(key, secret);
        }
        let (events_tx, _) = broadcast::channel(1024);
        let ws = Arc::new(WsIngest::new(PoolConfig {
            url: WS_URL.to_string(),
            max_symbols_per_connection: MAX_PER_CONNECTION,
            connection: ConnectionConfig {
                ping_payload: Value::String("Ping".to_string()),
                ..ConnectionConfig::default()
            },
        }));
        let adapter = Arc::new(Self {
            venue: Venue::new("bingx"),
            rest,
            memo: AdapterMemo::new(),
            subscribed: DashSet::new(),
            events_tx,
            ws,
        });
        adapter.ws.spawn_relay(adapter.events_tx.clone(), parse_bingx_ws_message);
        Ok(adapter)
    }

    fn wire_symbol(symbol: &Symbol) -> String {
        crate::types::to_venue_symbol(symbol, "USDT", SymbolDialect::Hyphenated)
    }

    fn channel_tag(symbol: &Symbol) -> String {
        format!("{}@markPrice", Self::wire_symbol(symbol))
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: T,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self, what: &str) -> AdapterResult<T> {
        if self.code != 0 {
            return Err(AdapterError::ApiError(format!("bingx {what} error {}: {}", self.code, self.msg)));
        }
        Ok(self.data)
    }
}

#[derive(Debug, Deserialize)]
struct PremiumIndexEntry {
    symbol: String,
    #[serde(rename = "lastFundingRate")]
    last_funding_rate: String,
    #[serde(rename = "markPrice")]
    mark_price: String,
    #[serde(rename = "indexPrice")]
    index_price: String,
    #[serde(rename = "nextFundingTime")]
    next_funding_time: i64,
}

#[derive(Debug, Deserialize)]
struct ContractEntry {
    symbol: String,
    #[serde(rename = "baseAsset", default)]
    base_asset: String,
    #[serde(rename = "quoteAsset", default)]
    quote_asset: String,
    #[serde(rename = "tickSize", default)]
    tick_size: String,
    #[serde(rename = "stepSize", default)]
    step_size: String,
    #[serde(rename = "maxLeverage", default)]
    max_leverage: i64,
}

#[derive(Debug, Deserialize)]
struct ContractsData {
    #[serde(default)]
    contracts: Vec<ContractEntry>,
}

#[derive(Debug, Deserialize)]
struct BalanceData {
    balance: BalanceEntry,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    asset: String,
    balance: String,
    #[serde(rename = "availableMargin")]
    available_margin: String,
}

#[derive(Debug, Deserialize)]
struct PositionsData {
    #[serde(default)]
    positions: Vec<PositionEntry>,
}

#[derive(Debug, Deserialize)]
struct PositionEntry {
    symbol: String,
    #[serde(rename = "positionSide")]
    position_side: String,
    #[serde(rename = "positionAmt")]
    position_amt: String,
    #[serde(rename = "avgPrice")]
    avg_price: String,
    leverage: i64,
    #[serde(rename = "unrealizedProfit")]
    unrealized_profit: String,
}

#[derive(Debug, Deserialize)]
struct OrderData {
    order: OrderEntry,
}

#[derive(Debug, Deserialize)]
struct OrderEntry {
    #[serde(rename = "orderId")]
    order_id: i64,
    #[serde(rename = "clientOrderID", default)]
    client_order_id: String,
    symbol: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    status: String,
    #[serde(rename = "stopPrice", default)]
    stop_price: String,
    #[serde(rename = "executedQty", default)]
    executed_qty: String,
    #[serde(rename = "avgPrice", default)]
    avg_price: String,
    #[serde(rename = "updateTime", default)]
    update_time: i64,
}

#[derive(Debug, Deserialize)]
struct FundingRecordsData {
    #[serde(default)]
    #[serde(rename = "fundFlow")]
    fund_flow: Vec<FundingRecordEntry>,
}

#[derive(Debug, Deserialize)]
struct FundingRecordEntry {
    symbol: String,
    amount: String,
    time: i64,
}

#[derive(Debug, Deserialize)]
struct OpenInterestData {
    #[serde(rename = "openInterest")]
    open_interest: String,
}

fn parse_decimal(s: &str, field: &str) -> AdapterResult<rust_decimal::Decimal> {
    s.parse().map_err(|_| AdapterError::Validation(format!("unparseable {field}: {s}")))
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

fn parse_status(s: &str) -> OrderStatus {
    match s {
        "FILLED" => OrderStatus::Filled,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "CANCELED" | "EXPIRED" => OrderStatus::Canceled,
        "REJECTED" => OrderStatus::Rejected,
        _ => OrderStatus::New,
    }
}

fn parse_order_type(s: &str) -> OrderType {
    match s {
        "MARKET" => OrderType::Market,
        "LIMIT" => OrderType::Limit,
        _ => OrderType::Conditional,
    }
}

#[derive(Debug, Deserialize)]
struct BingxWsPush {
    #[serde(rename = "dataType", default)]
    data_type: String,
    #[serde(default)]
    data: Option<BingxWsData>,
}

#[derive(Debug, Deserialize)]
struct BingxWsData {
    symbol: String,
    #[serde(rename = "markPrice", default)]
    mark_price: Option<String>,
    #[serde(rename = "fundingRate", default)]
    funding_rate: Option<String>,
    #[serde(rename = "nextFundingTime", default)]
    next_funding_time: Option<i64>,
}

fn parse_bingx_ws_message(payload: Value) -> Option<AdapterEvent> {
    let push: BingxWsPush = serde_json::from_value(payload).ok()?;
    if !push.data_type.ends_with("markPrice") {
        return None;
    }
    let data = push.data?;
    let rate: rust_decimal::Decimal = data.funding_rate.as_deref()?.parse().ok()?;
    let mark_price: rust_decimal::Decimal = data.mark_price.as_deref().unwrap_or("0").parse().ok()?;
    let symbol = Symbol::new(data.symbol.replace('-', ""));
    let funding_rate = FundingRate {
        venue: Venue::new("bingx"),
        rate: Rate::new(rate),
        mark_price: Price::new(mark_price),
        index_price: None,
        next_funding_time: millis_to_utc(data.next_funding_time.unwrap_or(0)),
        funding_interval_hours: fra_core::model::DEFAULT_FUNDING_INTERVAL_HOURS,
        received_at: Utc::now(),
        source: SourceTag::Websocket,
    };
    Some(AdapterEvent::FundingRate { symbol, rate: funding_rate })
}

#[allow(async_fn_in_trait)]
impl ExchangeAdapter for BingxAdapter {
    fn venue(&self) -> &Venue {
        &self.venue
    }

    async fn connect(&self) -> AdapterResult<()> {
        info!(venue = %self.venue, "bingx adapter connected (REST + WebSocket)");
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
            .public_request(Method::GET, &format!("/openApi/swap/v2/quote/premiumIndex?symbol={wire}"));
        let env: ApiEnvelope<PremiumIndexEntry> = self.rest.send_json(req).await?;
        let entry = env.into_data("premiumIndex")?;
        Ok(FundingRate {
            venue: self.venue.clone(),
            rate: Rate::new(parse_decimal(&entry.last_funding_rate, "lastFundingRate")?),
            mark_price: Price::new(parse_decimal(&entry.mark_price, "markPrice")?),
            index_price: Some(Price::new(parse_decimal(&entry.index_price, "indexPrice")?)),
            next_funding_time: millis_to_utc(entry.next_funding_time),
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
            .public_request(Method::GET, &format!("/openApi/swap/v2/quote/premiumIndex?symbol={wire}"));
        let env: ApiEnvelope<PremiumIndexEntry> = self.rest.send_json(req).await?;
        let entry = env.into_data("premiumIndex")?;
        Ok(Price::new(parse_decimal(&entry.mark_price, "markPrice")?))
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
                let req = rest.public_request(Method::GET, "/openApi/swap/v2/quote/contracts");
                let env: ApiEnvelope<ContractsData> = rest.send_json(req).await?;
                let data = env.into_data("contracts")?;
                let wire = BingxAdapter::wire_symbol(&symbol);
                let entry = data
                    .contracts
                    .into_iter()
                    .find(|c| c.symbol == wire)
                    .ok_or_else(|| AdapterError::Validation(format!("unknown symbol: {wire}")))?;
                Ok::<SymbolInfo, AdapterError>(SymbolInfo {
                    symbol: symbol.clone(),
                    base_asset: entry.base_asset,
                    quote_asset: entry.quote_asset,
                    tick_size: Price::new(parse_decimal(&entry.tick_size, "tickSize")?),
                    lot_size: Size::new(parse_decimal(&entry.step_size, "stepSize")?),
                    max_leverage: entry.max_leverage.try_into().unwrap_or(100),
                    funding_interval_hours: interval,
                })
            })
            .await
    }

    async fn get_usdt_perpetual_symbols(&self) -> AdapterResult<Vec<Symbol>> {
        let req = self.rest.public_request(Method::GET, "/openApi/swap/v2/quote/contracts");
        let env: ApiEnvelope<ContractsData> = self.rest.send_json(req).await?;
        let data = env.into_data("contracts")?;
        Ok(data
            .contracts
            .into_iter()
            .filter(|c| c.quote_asset == "USDT")
            .map(|c| Symbol::new(c.symbol.replace('-', "")))
            .collect())
    }

    async fn get_open_interest(&self, symbol: &Symbol) -> AdapterResult<OpenInterest> {
        let wire = Self::wire_symbol(symbol);
        let req = self
            .rest
            .public_request(Method::GET, &format!("/openApi/swap/v2/quote/openInterest?symbol={wire}"));
        let env: ApiEnvelope<OpenInterestData> = self.rest.send_json(req).await?;
        let data = env.into_data("openInterest")?;
        let oi = Size::new(parse_decimal(&data.open_interest, "openInterest")?);
        let price = self.get_price(symbol).await?;
        Ok(OpenInterest {
            symbol: symbol.clone(),
            open_interest: oi,
            open_interest_value: oi.notional(price),
            as_of: Utc::now(),
        })
    }

    async fn get_balance(&self, asset: &str) -> AdapterResult<Balance> {
        let req = self.rest.signed_request(Method::GET, "/openApi/swap/v2/user/balance", "")?;
        let env: ApiEnvelope<BalanceData> = self.rest.send_json(req).await?;
        let data = env.into_data("balance")?;
        if data.balance.asset != asset {
            return Err(AdapterError::Validation(format!("unknown asset: {asset}")));
        }
        Ok(Balance {
            asset: data.balance.asset,
            total: Money::new(parse_decimal(&data.balance.balance, "balance")?),
            available: Money::new(parse_decimal(&data.balance.available_margin, "availableMargin")?),
        })
    }

    async fn get_positions(&self) -> AdapterResult<Vec<PositionInfo>> {
        let req = self.rest.signed_request(Method::GET, "/openApi/swap/v2/user/positions", "")?;
        let env: ApiEnvelope<PositionsData> = self.rest.send_json(req).await?;
        let data = env.into_data("positions")?;
        let mut out = Vec::new();
        for entry in data.positions {
            let amt = parse_decimal(&entry.position_amt, "positionAmt")?;
            if amt.is_zero() {
                continue;
            }
            out.push(PositionInfo {
                symbol: Symbol::new(entry.symbol.replace('-', "")),
                side: if entry.position_side == "SHORT" { OrderSide::Sell } else { OrderSide::Buy },
                size: Size::new(amt.abs()),
                entry_price: Price::new(parse_decimal(&entry.avg_price, "avgPrice")?),
                leverage: entry.leverage.try_into().unwrap_or(1),
                unrealized_pnl: Money::new(parse_decimal(&entry.unrealized_profit, "unrealizedProfit")?),
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
        let query = format!(
            "symbol={wire}&side={side}&type={order_type}&quantity={}&clientOrderID={}&reduceOnly={}",
            request.size.inner(),
            request.client_order_id,
            request.reduce_only,
        );
        let req = self.rest.signed_request(Method::POST, "/openApi/swap/v2/trade/order", &query)?;
        let env: ApiEnvelope<OrderData> = self.rest.send_json(req).await?;
        let entry = env.into_data("order")?.order;
        let result = order_result_from_entry(self.venue.clone(), request.symbol, entry)?;
        let _ = self.events_tx.send(AdapterEvent::OrderStatusChanged(result.clone()));
        Ok(result)
    }

    async fn cancel_order(&self, symbol: &Symbol, venue_order_id: &str) -> AdapterResult<()> {
        let wire = Self::wire_symbol(symbol);
        let query = format!("symbol={wire}&orderId={venue_order_id}");
        let req = self.rest.signed_request(Method::DELETE, "/openApi/swap/v2/trade/order", &query)?;
        let env: ApiEnvelope<OrderData> = self.rest.send_json(req).await?;
        env.into_data("order")?;
        Ok(())
    }

    async fn get_order(&self, symbol: &Symbol, venue_order_id: &str) -> AdapterResult<OrderResult> {
        let wire = Self::wire_symbol(symbol);
        let query = format!("symbol={wire}&orderId={venue_order_id}");
        let req = self.rest.signed_request(Method::GET, "/openApi/swap/v2/trade/order", &query)?;
        let env: ApiEnvelope<OrderData> = self.rest.send_json(req).await?;
        let entry = env.into_data("order")?.order;
        order_result_from_entry(self.venue.clone(), symbol.clone(), entry)
    }

    async fn get_funding_payments(&self, symbol: &Symbol, since: DateTime<Utc>) -> AdapterResult<Vec<FundingPayment>> {
        let wire = Self::wire_symbol(symbol);
        let query = format!("symbol={wire}&startTs={}", since.timestamp_millis());
        let req = self.rest.signed_request(Method::GET, "/openApi/swap/v2/user/income", &query)?;
        let env: ApiEnvelope<FundingRecordsData> = self.rest.send_json(req).await?;
        let data = env.into_data("income")?;
        let mut out = Vec::with_capacity(data.fund_flow.len());
        for entry in data.fund_flow {
            out.push(FundingPayment {
                symbol: Symbol::new(entry.symbol.replace('-', "")),
                amount: Money::new(parse_decimal(&entry.amount, "amount")?),
                rate: Rate::ZERO,
                paid_at: millis_to_utc(entry.time),
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
            "id": tag.clone(),
            "reqType": "sub",
            "dataType": format!("{wire}@markPrice"),
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

fn order_result_from_entry(venue: Venue, symbol: Symbol, entry: OrderEntry) -> AdapterResult<OrderResult> {
    let order_type = parse_order_type(&entry.order_type);
    Ok(OrderResult {
        venue,
        venue_order_id: entry.order_id.to_string(),
        client_order_id: entry.client_order_id,
        symbol,
        side: parse_side(&entry.side),
        status: parse_status(&entry.status),
        order_type,
        conditional_kind: matches!(order_type, OrderType::Conditional).then(|| entry.order_type.to_lowercase()),
        stop_price: (!entry.stop_price.is_empty() && entry.stop_price != "0")
            .then(|| parse_decimal(&entry.stop_price, "stopPrice"))
            .transpose()?
            .map(Price::new),
        filled_size: Size::new(parse_decimal(&entry.executed_qty, "executedQty")?),
        avg_fill_price: (!entry.avg_price.is_empty())
            .then(|| parse_decimal(&entry.avg_price, "avgPrice"))
            .transpose()?
            .map(Price::new),
        realized_pnl: None,
        updated_at: millis_to_utc(entry.update_time),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_symbol_is_hyphenated() {
        let symbol = Symbol::new("BTCUSDT");
        assert_eq!(BingxAdapter::wire_symbol(&symbol), "BTC-USDT");
    }

    #[test]
    fn parse_status_maps_terminal_states() {
        assert_eq!(parse_status("FILLED"), OrderStatus::Filled);
        assert_eq!(parse_status("CANCELED"), OrderStatus::Canceled);
    }
}
