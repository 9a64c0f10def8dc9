//! Venue-facing request/response types and canonical symbol conversion.
//!
//! Internally the engine names every instrument by its canonical form
//! `BASEQUOTE` (e.g. `BTCUSDT`). Venues spell the same instrument
//! differently on the wire (`BTC-USDT`, `BTC_USDT`, `btcusdt`); adapters
//! convert at the boundary so nothing above this crate ever sees a
//! venue dialect.

use chrono::{DateTime, Utc};
use fra_core::decimal::{Money, Price, Size};
use fra_core::ids::{Symbol, Venue};
use serde::{Deserialize, Serialize};

/// How a venue spells a symbol on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolDialect {
    /// `BTCUSDT`
    Concatenated,
    /// `BTC-USDT`
    Hyphenated,
    /// `BTC_USDT`
    Underscored,
}

/// Convert a canonical `BASEQUOTE` symbol into a venue's dialect. `quote`
/// is the quote asset suffix (almost always `USDT`) used to find the
/// split point, since the canonical form carries no separator.
pub fn to_venue_symbol(canonical: &Symbol, quote: &str, dialect: SymbolDialect) -> String {
    let raw = canonical.as_str();
    let base = raw.strip_suffix(quote).unwrap_or(raw);
    match dialect {
        SymbolDialect::Concatenated => format!("{base}{quote}"),
        SymbolDialect::Hyphenated => format!("{base}-{quote}"),
        SymbolDialect::Underscored => format!("{base}_{quote}"),
    }
}

/// Convert a venue-dialect symbol back into the canonical `BASEQUOTE` form.
pub fn to_canonical_symbol(venue_symbol: &str, dialect: SymbolDialect) -> Symbol {
    let canonical = match dialect {
        SymbolDialect::Concatenated => venue_symbol.to_string(),
        SymbolDialect::Hyphenated => venue_symbol.replace('-', ""),
        SymbolDialect::Underscored => venue_symbol.replace('_', ""),
    };
    Symbol::new(canonical.to_uppercase())
}

/// Static per-symbol contract metadata, memoized by the adapter since it
/// rarely changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: Symbol,
    pub base_asset: String,
    pub quote_asset: String,
    pub tick_size: Price,
    pub lot_size: Size,
    pub max_leverage: u32,
    pub funding_interval_hours: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    /// A reduce-only conditional close (stop-loss or take-profit) attached
    /// to a position rather than submitted as a standalone order.
    Conditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub size: Size,
    pub price: Option<Price>,
    pub reduce_only: bool,
    /// Caller-supplied idempotency key, echoed back by venues that
    /// support client order IDs.
    pub client_order_id: String,
}

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub venue: Venue,
    pub venue_order_id: String,
    pub client_order_id: String,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub order_type: OrderType,
    /// Venue's own order-type spelling (e.g. `"stop_market"`,
    /// `"take_profit_market"`), lowercased. Needed to classify a filled
    /// conditional order as stop-loss vs. take-profit (spec §4.8) since
    /// venues don't agree on one vocabulary for that distinction.
    pub conditional_kind: Option<String>,
    pub stop_price: Option<Price>,
    pub filled_size: Size,
    pub avg_fill_price: Option<Price>,
    pub realized_pnl: Option<Money>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Balance {
    pub asset: String,
    pub total: Money,
    pub available: Money,
}

#[derive(Debug, Clone)]
pub struct PositionInfo {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub size: Size,
    pub entry_price: Price,
    pub leverage: u32,
    pub unrealized_pnl: Money,
}

#[derive(Debug, Clone)]
pub struct FundingPayment {
    pub symbol: Symbol,
    pub amount: Money,
    pub rate: fra_core::decimal::Rate,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OpenInterest {
    pub symbol: Symbol,
    pub open_interest: Size,
    pub open_interest_value: Money,
    pub as_of: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_hyphenated_symbol() {
        let canonical = Symbol::new("BTCUSDT");
        let venue = to_venue_symbol(&canonical, "USDT", SymbolDialect::Hyphenated);
        assert_eq!(venue, "BTC-USDT");
        assert_eq!(to_canonical_symbol(&venue, SymbolDialect::Hyphenated), canonical);
    }

    #[test]
    fn round_trips_underscored_symbol() {
        let canonical = Symbol::new("ETHUSDT");
        let venue = to_venue_symbol(&canonical, "USDT", SymbolDialect::Underscored);
        assert_eq!(venue, "ETH_USDT");
        assert_eq!(to_canonical_symbol(&venue, SymbolDialect::Underscored), canonical);
    }
}
