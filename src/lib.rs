//! Aggregation engine: computes OHLCV, VWAP, and transaction-count bars
//! from a stream of trades, keyed by (ticker, bar length, bar start).
//!
//! The core is backend-agnostic (`store::Store`) and asset-class-agnostic
//! (`trade::Trade`); `logic` supplies the per-asset-class update rules and
//! `process_trade` glues them to a store in one atomic read-modify-write.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod logic;
pub mod process_trade;
pub mod publish_queue;
pub mod store;
pub mod time;
pub mod trade;
pub mod worker;

pub use aggregate::Aggregate;
pub use error::{Error, Result};
pub use process_trade::process_trade;
pub use publish_queue::PublishQueue;
pub use store::{NativeDb, Store};
pub use time::BarLength;
pub use trade::{CurrenciesTrade, StocksTrade, Trade};
