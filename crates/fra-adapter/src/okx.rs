//! OKX USDT-margined perpetual swap adapter.
//!
//! Grounded in the same REST-signing + WS-push shape as
//! [`crate::binance`], adjusted for OKX's envelope-wrapped REST
//! responses (`{"code","msg","data":[...]}`), `OK-ACCESS-*` signed
//! headers, and `BASE-QUOTE-SWAP` symbol dialect (spec §4.1's own
//! example: `BTC-USDT-SWAP`).

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
    OrderType, PositionInfo, SymbolInfo,
};
use crate::ws_ingest::WsIngest;

const BASE_URL: &str = "https://www.okx.com";
const WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";

/// OKX's documented per-connection subscription cap (spec §4.2).
pub const MAX_PER_CONNECTION: usize = 100;

pub struct OkxAdapter {
    venue: Venue,
    rest: RestClient,
    memo: AdapterMemo,
    subscribed: DashSet<Symbol>,
    events_tx: broadcast::Sender<AdapterEvent>,
    ws: Arc<WsIngest>,
}

impl OkxAdapter {
    pub fn new(api_key: Option<String>, api_secret: Option<String>) -> AdapterResult<Arc<Self>> {
        let mut rest = RestClient::new(BASE_URL)?.with_api_key_header("OK-ACCESS-KEY");
        if let (Some(key), Some(secret)) = (api_key, api_secret) {
            rest = rest.with_credentials(key, secret);
        }
        let (events_tx, _) = broadcast::channel(1024);
        let ws = Arc::new(WsIngest::new(PoolConfig {
            url: WS_URL.to_string(),
            max_symbols_per_connection: MAX_PER_CONNECTION,
            connection: ConnectionConfig {
                ping_payload: Value::String("ping".to_string()),
                ..ConnectionConfig::default()
            },
        }));
        let adapter = Arc::new(Self {
            venue: Venue::new("okx"),
            rest,
            memo: AdapterMemo::new(),
            subscribed: DashSet::new(),
            events_tx,
            ws,
        });
        adapter.ws.spawn_relay(adapter.events_tx.clone(), parse_okx_ws_message);
        Ok(adapter)
    }

    /// `BASEQUOTE` -> `BASE-QUOTE-SWAP`.
    fn wire_symbol(symbol: &Symbol) -> String {
        let raw = symbol.as_str();
        let base = raw.strip_suffix("USDT").unwrap_or(raw);
        format!("{base}-USDT-SWAP")
    }

    fn channel_tag(symbol: &Symbol) -> String {
        format!("funding-rate|{}", Self::wire_symbol(symbol))
    }
}

#[derive(Debug, Deserialize)]
struct OkxEnvelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<T>,
}

impl<T> OkxEnvelope<T> {
    fn into_first(self, what: &str) -> AdapterResult<T> {
        if self.code != "0" {
            return Err(AdapterError::ApiError(format!("okx {what} error {}: {}", self.code, self.msg)));
        }
        self.data
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::Validation(format!("okx {what}: empty data")))
    }
}

#[derive(Debug, Deserialize)]
struct FundingRateEntry {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "fundingRate")]
    funding_rate: String,
    #[serde(rename = "nextFundingTime")]
    next_funding_time: String,
}

#[derive(Debug, Deserialize)]
struct MarkPriceEntry {
    #[serde(rename = "markPx")]
    mark_px: String,
}

#[derive(Debug, Deserialize)]
struct InstrumentEntry {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "baseCcy", default)]
    base_ccy: String,
    #[serde(rename = "quoteCcy", default)]
    quote_ccy: String,
    #[serde(rename = "tickSz")]
    tick_sz: String,
    #[serde(rename = "lotSz")]
    lot_sz: String,
    #[serde(rename = "lever", default)]
    lever: String,
}

#[derive(Debug, Deserialize)]
struct BalanceDetail {
    ccy: String,
    #[serde(rename = "eq")]
    eq: String,
    #[serde(rename = "availEq")]
    avail_eq: String,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    details: Vec<BalanceDetail>,
}

#[derive(Debug, Deserialize)]
struct PositionEntry {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "posSide")]
    pos_side: String,
    pos: String,
    #[serde(rename = "avgPx")]
    avg_px: String,
    lever: String,
    upl: String,
}

#[derive(Debug, Deserialize)]
struct OrderEntry {
    #[serde(rename = "ordId")]
    ord_id: String,
    #[serde(rename = "clOrdId")]
    cl_ord_id: String,
    #[serde(rename = "instId")]
    inst_id: String,
    side: String,
    state: String,
    #[serde(rename = "ordType")]
    ord_type: String,
    #[serde(rename = "slTriggerPx", default)]
    sl_trigger_px: Option<String>,
    #[serde(rename = "tpTriggerPx", default)]
    tp_trigger_px: Option<String>,
    #[serde(rename = "accFillSz")]
    acc_fill_sz: String,
    #[serde(rename = "avgPx", default)]
    avg_px: Option<String>,
    #[serde(rename = "uTime", default)]
    u_time: String,
}

#[derive(Debug, Deserialize)]
struct BillEntry {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "balChg")]
    bal_chg: String,
    ts: String,
}

#[derive(Debug, Deserialize)]
struct OpenInterestEntry {
    #[serde(rename = "instId")]
    inst_id: String,
    oi: String,
    #[serde(rename = "oiCcy")]
    oi_ccy: String,
}

fn parse_decimal(s: &str, field: &str) -> AdapterResult<rust_decimal::Decimal> {
    s.parse().map_err(|_| AdapterError::Validation(format!("unparseable {field}: {s}")))
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn parse_millis_str(s: &str) -> i64 {
    s.parse().unwrap_or(0)
}

fn parse_side(s: &str) -> OrderSide {
    match s {
        "sell" => OrderSide::Sell,
        _ => OrderSide::Buy,
    }
}

fn parse_status(s: &str) -> OrderStatus {
    match s {
        "filled" => OrderStatus::Filled,
        "partially_filled" => OrderStatus::PartiallyFilled,
        "canceled" => OrderStatus::Canceled,
        _ => OrderStatus::New,
    }
}

fn parse_order_type(s: &str) -> OrderType {
    match s {
        "market" => OrderType::Market,
        "limit" => OrderType::Limit,
        _ => OrderType::Conditional,
    }
}

#[derive(Debug, Deserialize)]
struct OkxWsPush {
    #[serde(default)]
    arg: Option<OkxWsArg>,
    #[serde(default)]
    data: Vec<OkxWsData>,
}

#[derive(Debug, Deserialize)]
struct OkxWsArg {
    channel: String,
}

#[derive(Debug, Deserialize)]
struct OkxWsData {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "fundingRate", default)]
    funding_rate: Option<String>,
    #[serde(rename = "markPx", default)]
    mark_px: Option<String>,
    #[serde(rename = "nextFundingTime", default)]
    next_funding_time: Option<String>,
}

fn parse_okx_ws_message(payload: Value) -> Option<AdapterEvent> {
    let push: OkxWsPush = serde_json::from_value(payload).ok()?;
    if push.arg.as_ref().map(|a| a.channel.as_str()) != Some("funding-rate") {
        return None;
    }
    let entry = push.data.into_iter().next()?;
    let rate: rust_decimal::Decimal = entry.funding_rate.as_deref()?.parse().ok()?;
    let mark_price: rust_decimal::Decimal = entry.mark_px.as_deref().unwrap_or("0").parse().ok()?;
    let next_funding_time = entry
        .next_funding_time
        .as_deref()
        .map(parse_millis_str)
        .unwrap_or(0);

    let symbol = Symbol::new(entry.inst_id.replace("-SWAP", "").replace('-', ""));
    let funding_rate = FundingRate {
        venue: Venue::new("okx"),
        rate: Rate::new(rate),
        mark_price: Price::new(mark_price),
        index_price: None,
        next_funding_time: millis_to_utc(next_funding_time),
        funding_interval_hours: fra_core::model::DEFAULT_FUNDING_INTERVAL_HOURS,
        received_at: Utc::now(),
        source: SourceTag::Websocket,
    };
    Some(AdapterEvent::FundingRate { symbol, rate: funding_rate })
}

#[allow(async_fn_in_trait)]
impl ExchangeAdapter for OkxAdapter {
    fn venue(&self) -> &Venue {
        &self.venue
    }

    async fn connect(&self) -> AdapterResult<()> {
        info!(venue = %self.venue, "okx adapter connected (REST + WebSocket)");
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
            .public_request(Method::GET, &format!("/api/v5/public/funding-rate?instId={wire}"));
        let env: OkxEnvelope<FundingRateEntry> = self.rest.send_json(req).await?;
        let entry = env.into_first("funding-rate")?;

        let price_req = self
            .rest
            .public_request(Method::GET, &format!("/api/v5/public/mark-price?instType=SWAP&instId={wire}"));
        let price_env: OkxEnvelope<MarkPriceEntry> = self.rest.send_json(price_req).await?;
        let price_entry = price_env.into_first("mark-price")?;

        Ok(FundingRate {
            venue: self.venue.clone(),
            rate: Rate::new(parse_decimal(&entry.funding_rate, "fundingRate")?),
            mark_price: Price::new(parse_decimal(&price_entry.mark_px, "markPx")?),
            index_price: None,
            next_funding_time: millis_to_utc(parse_millis_str(&entry.next_funding_time)),
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
            .public_request(Method::GET, &format!("/api/v5/public/mark-price?instType=SWAP&instId={wire}"));
        let env: OkxEnvelope<MarkPriceEntry> = self.rest.send_json(req).await?;
        let entry = env.into_first("mark-price")?;
        Ok(Price::new(parse_decimal(&entry.mark_px, "markPx")?))
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
                let req = rest.public_request(Method::GET, "/api/v5/public/instruments?instType=SWAP");
                let env: OkxEnvelope<InstrumentEntry> = rest.send_json(req).await?;
                let wire = OkxAdapter::wire_symbol(&symbol);
                let entry = env
                    .data
                    .into_iter()
                    .find(|e| e.inst_id == wire)
                    .ok_or_else(|| AdapterError::Validation(format!("unknown symbol: {wire}")))?;
                Ok::<SymbolInfo, AdapterError>(SymbolInfo {
                    symbol: symbol.clone(),
                    base_asset: entry.base_ccy,
                    quote_asset: entry.quote_ccy,
                    tick_size: Price::new(parse_decimal(&entry.tick_sz, "tickSz")?),
                    lot_size: Size::new(parse_decimal(&entry.lot_sz, "lotSz")?),
                    max_leverage: entry.lever.parse().unwrap_or(125),
                    funding_interval_hours: interval,
                })
            })
            .await
    }

    async fn get_usdt_perpetual_symbols(&self) -> AdapterResult<Vec<Symbol>> {
        let req = self.rest.public_request(Method::GET, "/api/v5/public/instruments?instType=SWAP");
        let env: OkxEnvelope<InstrumentEntry> = self.rest.send_json(req).await?;
        Ok(env
            .data
            .into_iter()
            .filter(|e| e.quote_ccy == "USDT")
            .map(|e| Symbol::new(e.inst_id.replace("-SWAP", "").replace('-', "")))
            .collect())
    }

    async fn get_open_interest(&self, symbol: &Symbol) -> AdapterResult<OpenInterest> {
        let wire = Self::wire_symbol(symbol);
        let req = self
            .rest
            .public_request(Method::GET, &format!("/api/v5/public/open-interest?instType=SWAP&instId={wire}"));
        let env: OkxEnvelope<OpenInterestEntry> = self.rest.send_json(req).await?;
        let entry = env.into_first("open-interest")?;
        let oi = Size::new(parse_decimal(&entry.oi, "oi")?);
        let value = Money::new(parse_decimal(&entry.oi_ccy, "oiCcy")?);
        Ok(OpenInterest { symbol: symbol.clone(), open_interest: oi, open_interest_value: value, as_of: Utc::now() })
    }

    async fn get_balance(&self, asset: &str) -> AdapterResult<Balance> {
        let req = self.rest.signed_request(Method::GET, "/api/v5/account/balance", "")?;
        let env: OkxEnvelope<BalanceEntry> = self.rest.send_json(req).await?;
        let entry = env.into_first("balance")?;
        let detail = entry
            .details
            .into_iter()
            .find(|d| d.ccy == asset)
            .ok_or_else(|| AdapterError::Validation(format!("unknown asset: {asset}")))?;
        Ok(Balance {
            asset: detail.ccy,
            total: Money::new(parse_decimal(&detail.eq, "eq")?),
            available: Money::new(parse_decimal(&detail.avail_eq, "availEq")?),
        })
    }

    async fn get_positions(&self) -> AdapterResult<Vec<PositionInfo>> {
        let req = self.rest.signed_request(Method::GET, "/api/v5/account/positions?instType=SWAP", "")?;
        let env: OkxEnvelope<PositionEntry> = self.rest.send_json(req).await?;
        let mut out = Vec::new();
        for entry in env.data {
            let size = parse_decimal(&entry.pos, "pos")?;
            if size.is_zero() {
                continue;
            }
            out.push(PositionInfo {
                symbol: Symbol::new(entry.inst_id.replace("-SWAP", "").replace('-', "")),
                side: if entry.pos_side == "short" { OrderSide::Sell } else { OrderSide::Buy },
                size: Size::new(size.abs()),
                entry_price: Price::new(parse_decimal(&entry.avg_px, "avgPx")?),
                leverage: entry.lever.parse().unwrap_or(1),
                unrealized_pnl: Money::new(parse_decimal(&entry.upl, "upl")?),
            });
        }
        Ok(out)
    }

    async fn create_order(&self, request: OrderRequest) -> AdapterResult<OrderResult> {
        let wire = Self::wire_symbol(&request.symbol);
        let side = match request.side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let ord_type = match request.order_type {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::Conditional => "conditional",
        };
        let query = format!(
            "instId={wire}&tdMode=cross&side={side}&ordType={ord_type}&sz={}&clOrdId={}&reduceOnly={}",
            request.size.inner(),
            request.client_order_id,
            request.reduce_only,
        );
        let req = self.rest.signed_request(Method::POST, "/api/v5/trade/order", &query)?;
        let env: OkxEnvelope<OrderEntry> = self.rest.send_json(req).await?;
        let entry = env.into_first("order")?;
        let result = order_result_from_entry(self.venue.clone(), request.symbol, entry)?;
        let _ = self.events_tx.send(AdapterEvent::OrderStatusChanged(result.clone()));
        Ok(result)
    }

    async fn cancel_order(&self, symbol: &Symbol, venue_order_id: &str) -> AdapterResult<()> {
        let wire = Self::wire_symbol(symbol);
        let query = format!("instId={wire}&ordId={venue_order_id}");
        let req = self.rest.signed_request(Method::POST, "/api/v5/trade/cancel-order", &query)?;
        let _env: OkxEnvelope<OrderEntry> = self.rest.send_json(req).await?;
        Ok(())
    }

    async fn get_order(&self, symbol: &Symbol, venue_order_id: &str) -> AdapterResult<OrderResult> {
        let wire = Self::wire_symbol(symbol);
        let query = format!("instId={wire}&ordId={venue_order_id}");
        let req = self.rest.signed_request(Method::GET, "/api/v5/trade/order", &query)?;
        let env: OkxEnvelope<OrderEntry> = self.rest.send_json(req).await?;
        let entry = env.into_first("order")?;
        order_result_from_entry(self.venue.clone(), symbol.clone(), entry)
    }

    async fn get_funding_payments(&self, symbol: &Symbol, since: DateTime<Utc>) -> AdapterResult<Vec<FundingPayment>> {
        let wire = Self::wire_symbol(symbol);
        let query = format!("instType=SWAP&instId={wire}&type=8&after={}", since.timestamp_millis());
        let req = self.rest.signed_request(Method::GET, "/api/v5/account/bills", &query)?;
        let env: OkxEnvelope<BillEntry> = self.rest.send_json(req).await?;
        let mut out = Vec::with_capacity(env.data.len());
        for entry in env.data {
            out.push(FundingPayment {
                symbol: Symbol::new(entry.inst_id.replace("-SWAP", "").replace('-', "")),
                amount: Money::new(parse_decimal(&entry.bal_chg, "balChg")?),
                rate: Rate::ZERO,
                paid_at: millis_to_utc(parse_millis_str(&entry.ts)),
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
            "op": "subscribe",
            "args": [{ "channel": "funding-rate", "instId": wire }],
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
    let order_type = parse_order_type(&entry.ord_type);
    let stop_price = entry
        .sl_trigger_px
        .or(entry.tp_trigger_px)
        .filter(|s| !s.is_empty())
        .map(|s| parse_decimal(&s, "triggerPx"))
        .transpose()?
        .map(Price::new);
    Ok(OrderResult {
        venue,
        venue_order_id: entry.ord_id,
        client_order_id: entry.cl_ord_id,
        symbol,
        side: parse_side(&entry.side),
        status: parse_status(&entry.state),
        order_type,
        conditional_kind: matches!(order_type, OrderType::Conditional).then(|| entry.ord_type.clone()),
        stop_price,
        filled_size: Size::new(parse_decimal(&entry.acc_fill_sz, "accFillSz")?),
        avg_fill_price: entry
            .avg_px
            .filter(|s| !s.is_empty())
            .map(|s| parse_decimal(&s, "avgPx"))
            .transpose()?
            .map(Price::new),
        realized_pnl: None,
        updated_at: millis_to_utc(parse_millis_str(&entry.u_time)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_symbol_appends_swap_suffix() {
        let symbol = Symbol::new("BTCUSDT");
        assert_eq!(OkxAdapter::wire_symbol(&symbol), "BTC-USDT-SWAP");
    }

    #[test]
    fn parse_status_maps_terminal_states() {
        assert_eq!(parse_status("filled"), OrderStatus::Filled);
        assert_eq!(parse_status("canceled"), OrderStatus::Canceled);
    }
}
