//! Trade records (§3): the asset-class-specific inputs to C5's update logic.

use serde::Deserialize;

/// Common surface every trade exposes to C6's ProcessTrade pipeline.
pub trait Trade {
    fn ticker(&self) -> &str;
    /// Raw timestamp, ms or ns (see `time::parse_ts`).
    fn timestamp(&self) -> i64;
}

/// A stocks trade, carrying exchange condition codes that gate C5's update
/// predicates. Wire shape matches the streaming feed's trade event (`ev:"T"`).
#[derive(Debug, Clone, Deserialize)]
pub struct StocksTrade {
    #[serde(rename = "sym")]
    pub ticker: String,
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "p")]
    pub price: f64,
    #[serde(rename = "s")]
    pub size: u32,
    #[serde(rename = "c", default)]
    pub conditions: Vec<i32>,
}

impl Trade for StocksTrade {
    fn ticker(&self) -> &str {
        &self.ticker
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// A currencies (crypto/forex) trade. No condition filtering applies; the
/// weighting field is `order_size` rather than an integer share count.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrenciesTrade {
    #[serde(rename = "sym")]
    pub ticker: String,
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "p")]
    pub price: f64,
    #[serde(rename = "os")]
    pub order_size: f64,
}

impl Trade for CurrenciesTrade {
    fn ticker(&self) -> &str {
        &self.ticker
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// A stocks trade as it appears in the pipe-delimited batch CSV: conditions
/// are a semicolon-joined list of integers rather than a JSON array.
#[derive(Debug, Clone, Deserialize)]
pub struct CsvStocksTrade {
    pub ticker: String,
    pub timestamp: i64,
    pub price: f64,
    pub size: u32,
    #[serde(default)]
    pub conditions: String,
}

impl CsvStocksTrade {
    pub fn into_trade(self) -> StocksTrade {
        let conditions = if self.conditions.trim().is_empty() {
            Vec::new()
        } else {
            self.conditions
                .split(';')
                .filter_map(|s| s.trim().parse::<i32>().ok())
                .collect()
        };
        StocksTrade {
            ticker: self.ticker,
            timestamp: self.timestamp,
            price: self.price,
            size: self.size,
            conditions,
        }
    }
}
