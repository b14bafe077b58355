//! The aggregate record (C2): the value carried end-to-end through the
//! pipeline, plus its CSV and JSON encodings.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::time::BarLength;

/// An OHLCV+VWAP+transaction-count bar, identified by (ticker, start, end).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregate {
    pub ticker: String,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub vwap: f64,
    pub volume: f64,
    pub transactions: u32,
}

impl Aggregate {
    /// A freshly-materialized bar for a given identity: all metrics zero.
    pub fn fresh(ticker: impl Into<String>, start_timestamp: i64, length: BarLength) -> Self {
        Aggregate {
            ticker: ticker.into(),
            start_timestamp,
            end_timestamp: start_timestamp + length.duration_ms(),
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            vwap: 0.0,
            volume: 0.0,
            transactions: 0,
        }
    }

    pub fn bar_length(&self) -> Result<BarLength> {
        BarLength::from_delta_ms(self.end_timestamp - self.start_timestamp)
    }

    /// Structural, bitwise equality used to decide whether a trade produced
    /// an effective mutation. Field-by-field `f64::to_bits` comparison so
    /// NaN bit patterns (never produced by the update logic on finite
    /// inputs, but checked here rather than assumed) compare equal to
    /// themselves instead of leaking `PartialEq`'s NaN-never-equal rule.
    pub fn structurally_eq(&self, other: &Aggregate) -> bool {
        self.ticker == other.ticker
            && self.start_timestamp == other.start_timestamp
            && self.end_timestamp == other.end_timestamp
            && self.transactions == other.transactions
            && bits_eq(self.open, other.open)
            && bits_eq(self.high, other.high)
            && bits_eq(self.low, other.low)
            && bits_eq(self.close, other.close)
            && bits_eq(self.vwap, other.vwap)
            && bits_eq(self.volume, other.volume)
    }

    pub fn to_csv_row(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.ticker,
            self.start_timestamp,
            self.end_timestamp,
            self.open,
            self.high,
            self.low,
            self.close,
            self.vwap,
            self.volume,
            self.transactions
        )
    }

    pub fn from_csv_row(row: &str) -> Result<Self> {
        let mut fields = row.split('|');
        let mut next = || fields.next().ok_or_else(|| crate::error::Error::Parse("truncated aggregate row".into()));
        let ticker = next()?.to_string();
        let parse_i64 = |s: &str| s.parse::<i64>().map_err(|e| crate::error::Error::Parse(e.to_string()));
        let parse_f64 = |s: &str| s.parse::<f64>().map_err(|e| crate::error::Error::Parse(e.to_string()));
        let parse_u32 = |s: &str| s.parse::<u32>().map_err(|e| crate::error::Error::Parse(e.to_string()));

        let start_timestamp = parse_i64(next()?)?;
        let end_timestamp = parse_i64(next()?)?;
        let open = parse_f64(next()?)?;
        let high = parse_f64(next()?)?;
        let low = parse_f64(next()?)?;
        let close = parse_f64(next()?)?;
        let vwap = parse_f64(next()?)?;
        let volume = parse_f64(next()?)?;
        let transactions = parse_u32(next()?)?;

        Ok(Aggregate {
            ticker,
            start_timestamp,
            end_timestamp,
            open,
            high,
            low,
            close,
            vwap,
            volume,
            transactions,
        })
    }
}

fn bits_eq(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits()
}
