//! Exchange adapters: one implementation per venue behind a shared trait
//! (spec §4.1), plus the REST/signing/symbol-conversion plumbing every
//! implementation composes.

pub mod adapter;
pub mod any;
pub mod bingx;
pub mod binance;
pub mod error;
pub mod gate;
pub mod memo;
pub mod okx;
pub mod registry;
pub mod rest_client;
pub mod signing;
pub mod types;
pub mod ws_ingest;

pub use adapter::{AdapterEvent, AdapterMemo, ExchangeAdapter, METADATA_CACHE_TTL};
pub use any::AnyAdapter;
pub use bingx::BingxAdapter;
pub use binance::BinanceAdapter;
pub use error::{AdapterError, AdapterResult};
pub use gate::GateAdapter;
pub use memo::TtlCache;
pub use okx::OkxAdapter;
pub use registry::AdapterRegistry;
pub use rest_client::RestClient;
pub use signing::HmacSigner;
pub use types::{
    Balance, FundingPayment, OpenInterest, OrderRequest, OrderResult, OrderSide, OrderStatus,
    OrderType, PositionInfo, SymbolDialect, SymbolInfo, to_canonical_symbol, to_venue_symbol,
};
pub use ws_ingest::WsIngest;
