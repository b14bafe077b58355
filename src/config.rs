//! Engine configuration: environment-driven, serde-deserializable, with
//! defaults for every field so a bare `.env` (or none at all) still runs.

use serde::{Deserialize, Serialize};

fn default_workers() -> usize {
    8
}

fn default_channel_capacity() -> usize {
    1_000
}

fn default_streaming_timeout_ms() -> u64 {
    100
}

fn default_symbols() -> Vec<String> {
    Vec::new()
}

fn default_minute_bar() -> String {
    "min".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Streaming feed credential. Empty for batch-only runs.
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub postgres_url: Option<String>,

    #[serde(default)]
    pub redis_url: Option<String>,

    /// Comma-separated symbol list override for streaming subscriptions.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Per-trade ProcessTrade deadline in streaming mode.
    #[serde(default = "default_streaming_timeout_ms")]
    pub streaming_timeout_ms: u64,

    /// Bar length tag ("sec" | "min" | "day") the engine aggregates by default.
    #[serde(default = "default_minute_bar")]
    pub bar_length: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            api_key: String::new(),
            postgres_url: None,
            redis_url: None,
            symbols: default_symbols(),
            workers: default_workers(),
            channel_capacity: default_channel_capacity(),
            streaming_timeout_ms: default_streaming_timeout_ms(),
            bar_length: default_minute_bar(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from process environment variables, falling back
    /// to defaults for anything unset. Call `dotenv::dotenv()` before this
    /// (as the binaries do) to pick up a `.env` file first.
    pub fn from_env() -> Self {
        let mut config = EngineConfig::default();

        if let Ok(v) = std::env::var("API_KEY") {
            config.api_key = v;
        }
        if let Ok(v) = std::env::var("POSTGRES_URL") {
            config.postgres_url = Some(v);
        }
        if let Ok(v) = std::env::var("REDIS_URL") {
            config.redis_url = Some(v);
        }
        if let Ok(v) = std::env::var("AGGREGATES_SYMBOLS") {
            config.symbols = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = std::env::var("AGGREGATES_WORKERS") {
            if let Ok(n) = v.parse() {
                config.workers = n;
            }
        }
        if let Ok(v) = std::env::var("AGGREGATES_CHANNEL_CAPACITY") {
            if let Ok(n) = v.parse() {
                config.channel_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("AGGREGATES_BAR_LENGTH") {
            config.bar_length = v;
        }

        config
    }

    pub fn bar_length(&self) -> crate::error::Result<crate::time::BarLength> {
        crate::time::BarLength::from_tag(&self.bar_length)
    }
}
