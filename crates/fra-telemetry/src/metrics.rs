//! Prometheus metrics for the funding-rate arbitrage engine.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration
//! fails it indicates a fatal configuration error (e.g. a duplicate
//! metric name) that should crash at startup rather than fail silently.
//! These panics only occur during static initialization, never at
//! runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_gauge_vec,
    CounterVec, GaugeVec, HistogramVec, IntGaugeVec,
};

/// Per-venue WebSocket connection state (1 = connected, 0 = disconnected).
/// Labels: venue
pub static WS_CONNECTED: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "fra_ws_connected",
        "Per-venue WebSocket connection state (1=connected)",
        &["venue"]
    )
    .unwrap()
});

/// WebSocket reconnect attempts. Labels: venue
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fra_ws_reconnect_total",
        "Total WebSocket reconnect attempts",
        &["venue"]
    )
    .unwrap()
});

/// Subscribe-timeout occurrences (spec §5, `SUBSCRIBE_TIMEOUT`). Labels: venue
pub static SUBSCRIBE_TIMEOUT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fra_subscribe_timeout_total",
        "Total subscribe-acknowledgement timeouts",
        &["venue"]
    )
    .unwrap()
});

/// Current active WebSocket connection count per venue (Connection Pool).
pub static POOL_CONNECTION_COUNT: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "fra_pool_connection_count",
        "Active WebSocket connection count per venue",
        &["venue"]
    )
    .unwrap()
});

/// Current data-source mode per (venue, dataType): 1=websocket, 0=rest.
pub static DATA_SOURCE_MODE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "fra_data_source_mode",
        "Current data-source mode (1=websocket, 0=rest/hybrid)",
        &["venue", "data_type"]
    )
    .unwrap()
});

/// Stale data-source detections. Labels: venue, data_type
pub static DATA_SOURCE_STALE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fra_data_source_stale_total",
        "Total times a stream was detected stale",
        &["venue", "data_type"]
    )
    .unwrap()
});

/// Funding-rate update latency from venue timestamp to aggregator ingest.
/// Labels: venue, symbol
pub static RATE_UPDATE_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fra_rate_update_latency_ms",
        "Latency from FundingRate received_at to aggregator ingest, ms",
        &["venue"],
        vec![5.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Currently active arbitrage opportunities. Labels: symbol
pub static OPPORTUNITIES_ACTIVE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "fra_opportunities_active",
        "Currently ACTIVE arbitrage opportunities",
        &["symbol"]
    )
    .unwrap()
});

/// Opportunity lifecycle transitions. Labels: transition (detected/expired/closed)
pub static OPPORTUNITY_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fra_opportunity_transitions_total",
        "Total opportunity lifecycle transitions",
        &["transition"]
    )
    .unwrap()
});

/// Rate-difference (spread) observed at opportunity creation/update.
/// Labels: symbol
pub static OPPORTUNITY_SPREAD_PERCENT: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fra_opportunity_spread_percent",
        "Observed spreadPercent at opportunity update time",
        &["symbol"],
        vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.75, 1.0, 2.0, 5.0]
    )
    .unwrap()
});

/// Exit suggestions emitted. Labels: reason (APY_NEGATIVE/PROFIT_LOCKABLE)
pub static EXIT_SUGGESTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fra_exit_suggested_total",
        "Total exit suggestions emitted",
        &["reason"]
    )
    .unwrap()
});

pub static EXIT_CANCELED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fra_exit_canceled_total",
        "Total exit-suggestion cancellations",
        &[]
    )
    .unwrap()
});

/// Conditional-order triggers detected. Labels: kind (LONG_SL/LONG_TP/SHORT_SL/SHORT_TP)
pub static TRIGGERS_DETECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fra_triggers_detected_total",
        "Total SL/TP triggers detected",
        &["kind"]
    )
    .unwrap()
});

/// Duplicate trigger events suppressed by the at-most-once dedup set.
pub static TRIGGER_DUPLICATES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fra_trigger_duplicates_total",
        "Total duplicate trigger events suppressed by dedup",
        &[]
    )
    .unwrap()
});

/// Position-close outcomes. Labels: outcome (closed/partial/failed)
pub static CLOSE_OUTCOME_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fra_close_outcome_total",
        "Total Position Closer outcomes",
        &["outcome"]
    )
    .unwrap()
});

/// Realized trade PnL. Labels: symbol, close_reason
pub static TRADE_PNL: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fra_trade_pnl",
        "Realized totalPnL per closed trade",
        &["symbol", "close_reason"],
        vec![-500.0, -100.0, -10.0, 0.0, 10.0, 100.0, 500.0, 2000.0]
    )
    .unwrap()
});

/// Webhook delivery attempts. Labels: platform, outcome (delivered/failed)
pub static WEBHOOK_DELIVERY_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fra_webhook_delivery_total",
        "Total webhook delivery attempts",
        &["platform", "outcome"]
    )
    .unwrap()
});

/// Venue REST/WS adapter call outcomes. Labels: venue, operation, outcome
pub static ADAPTER_CALLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fra_adapter_calls_total",
        "Total adapter calls by outcome",
        &["venue", "operation", "outcome"]
    )
    .unwrap()
});

/// Convenience wrapper matching the style of call sites throughout this
/// workspace (`Metrics::foo(...)` rather than reaching for the statics
/// directly).
pub struct Metrics;

impl Metrics {
    pub fn ws_connected(venue: &str, connected: bool) {
        WS_CONNECTED
            .with_label_values(&[venue])
            .set(if connected { 1.0 } else { 0.0 });
    }

    pub fn ws_reconnect(venue: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[venue]).inc();
    }

    pub fn subscribe_timeout(venue: &str) {
        SUBSCRIBE_TIMEOUT_TOTAL.with_label_values(&[venue]).inc();
    }

    pub fn pool_connection_count(venue: &str, count: usize) {
        POOL_CONNECTION_COUNT.with_label_values(&[venue]).set(count as f64);
    }

    pub fn data_source_mode(venue: &str, data_type: &str, websocket: bool) {
        DATA_SOURCE_MODE
            .with_label_values(&[venue, data_type])
            .set(if websocket { 1.0 } else { 0.0 });
    }

    pub fn data_source_stale(venue: &str, data_type: &str) {
        DATA_SOURCE_STALE_TOTAL.with_label_values(&[venue, data_type]).inc();
    }

    pub fn rate_update_latency_ms(venue: &str, latency_ms: f64) {
        RATE_UPDATE_LATENCY_MS.with_label_values(&[venue]).observe(latency_ms);
    }

    pub fn opportunities_active(symbol: &str, count: i64) {
        OPPORTUNITIES_ACTIVE.with_label_values(&[symbol]).set(count);
    }

    pub fn opportunity_transition(transition: &str) {
        OPPORTUNITY_TRANSITIONS_TOTAL.with_label_values(&[transition]).inc();
    }

    pub fn opportunity_spread_percent(symbol: &str, spread_percent: f64) {
        OPPORTUNITY_SPREAD_PERCENT.with_label_values(&[symbol]).observe(spread_percent);
    }

    pub fn exit_suggested(reason: &str) {
        EXIT_SUGGESTED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn exit_canceled() {
        EXIT_CANCELED_TOTAL.with_label_values(&[]).inc();
    }

    pub fn trigger_detected(kind: &str) {
        TRIGGERS_DETECTED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn trigger_duplicate() {
        TRIGGER_DUPLICATES_TOTAL.with_label_values(&[]).inc();
    }

    pub fn close_outcome(outcome: &str) {
        CLOSE_OUTCOME_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn trade_pnl(symbol: &str, close_reason: &str, pnl: f64) {
        TRADE_PNL.with_label_values(&[symbol, close_reason]).observe(pnl);
    }

    pub fn webhook_delivery(platform: &str, delivered: bool) {
        let outcome = if delivered { "delivered" } else { "failed" };
        WEBHOOK_DELIVERY_TOTAL.with_label_values(&[platform, outcome]).inc();
    }

    pub fn adapter_call(venue: &str, operation: &str, outcome: &str) {
        ADAPTER_CALLS_TOTAL.with_label_values(&[venue, operation, outcome]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_can_be_recorded_without_panicking() {
        Metrics::ws_connected("okx", true);
        Metrics::ws_reconnect("okx");
        Metrics::subscribe_timeout("okx");
        Metrics::pool_connection_count("okx", 3);
        Metrics::data_source_mode("okx", "fundingRate", true);
        Metrics::data_source_stale("okx", "fundingRate");
        Metrics::rate_update_latency_ms("okx", 42.0);
        Metrics::opportunities_active("BTCUSDT", 2);
        Metrics::opportunity_transition("detected");
        Metrics::opportunity_spread_percent("BTCUSDT", 0.6);
        Metrics::exit_suggested("APY_NEGATIVE");
        Metrics::exit_canceled();
        Metrics::trigger_detected("LONG_TP");
        Metrics::trigger_duplicate();
        Metrics::close_outcome("closed");
        Metrics::trade_pnl("BTCUSDT", "MANUAL", 12.5);
        Metrics::webhook_delivery("slack", true);
        Metrics::adapter_call("okx", "createOrder", "ok");
    }
}
