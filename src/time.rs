//! Bar-boundary arithmetic (C1): snapping timestamps, mapping bar lengths to
//! durations, and recovering a bar's length from its start/end timestamps.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A trade timestamp is nanoseconds if its magnitude would otherwise place it
/// past roughly the year 2286 when read as milliseconds. Below that, it's ms.
const NS_VS_MS_THRESHOLD: i64 = 10_000_000_000_000;

pub const MS_PER_SECOND: i64 = 1_000;
pub const MS_PER_MINUTE: i64 = 60_000;
pub const MS_PER_DAY: i64 = 86_400_000;

/// The closed set of supported bar durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarLength {
    Second,
    Minute,
    Day,
}

impl BarLength {
    pub fn duration_ms(self) -> i64 {
        match self {
            BarLength::Second => MS_PER_SECOND,
            BarLength::Minute => MS_PER_MINUTE,
            BarLength::Day => MS_PER_DAY,
        }
    }

    pub fn as_tag(self) -> &'static str {
        match self {
            BarLength::Second => "sec",
            BarLength::Minute => "min",
            BarLength::Day => "day",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "sec" => Ok(BarLength::Second),
            "min" => Ok(BarLength::Minute),
            "day" => Ok(BarLength::Day),
            other => Err(Error::Parse(format!("unknown bar length tag: {other}"))),
        }
    }

    /// Recover a bar length from an (end - start) delta, in milliseconds.
    pub fn from_delta_ms(delta_ms: i64) -> Result<Self> {
        match delta_ms {
            MS_PER_SECOND => Ok(BarLength::Second),
            MS_PER_MINUTE => Ok(BarLength::Minute),
            MS_PER_DAY => Ok(BarLength::Day),
            other => Err(Error::InvalidBarLength { delta_ms: other }),
        }
    }
}

/// Coerce a trade's raw timestamp (ms or ns, ambiguous by magnitude) to
/// nanoseconds.
pub fn parse_ts(raw: i64) -> i64 {
    if raw.abs() < NS_VS_MS_THRESHOLD {
        raw * 1_000_000
    } else {
        raw
    }
}

/// Floor a nanosecond timestamp to the start of its bar window, in
/// milliseconds since the epoch.
pub fn snap(ts_ns: i64, length: BarLength) -> i64 {
    let ts_ms = ts_ns.div_euclid(1_000_000);
    let duration = length.duration_ms();
    ts_ms.div_euclid(duration) * duration
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ts_detects_milliseconds() {
        assert_eq!(parse_ts(1), 1_000_000);
        assert_eq!(parse_ts(1_700_000_000_000), 1_700_000_000_000_000_000);
    }

    #[test]
    fn parse_ts_detects_nanoseconds() {
        assert_eq!(parse_ts(1_700_000_000_000_000_000), 1_700_000_000_000_000_000);
    }

    #[test]
    fn ms_and_ns_trade_snap_to_same_bucket() {
        let ms = parse_ts(1_700_000_000_000);
        let ns = parse_ts(1_700_000_000_000_000_000);
        assert_eq!(snap(ms, BarLength::Minute), snap(ns, BarLength::Minute));
    }

    #[test]
    fn snap_is_idempotent_and_aligned() {
        for length in [BarLength::Second, BarLength::Minute, BarLength::Day] {
            let ts_ns = 1_700_000_123_456_789i64;
            let once = snap(ts_ns, length);
            let twice = snap(once * 1_000_000, length);
            assert_eq!(once, twice);
            assert_eq!(once % length.duration_ms(), 0);
        }
    }

    #[test]
    fn snap_floors_not_rounds() {
        let ts_ns = 59_999 * 1_000_000; // 59.999s, just under a minute
        assert_eq!(snap(ts_ns, BarLength::Minute), 0);
    }

    #[test]
    fn bar_length_round_trips_through_delta() {
        for length in [BarLength::Second, BarLength::Minute, BarLength::Day] {
            assert_eq!(BarLength::from_delta_ms(length.duration_ms()).unwrap(), length);
        }
        assert!(BarLength::from_delta_ms(42).is_err());
    }

    #[test]
    fn bar_length_tag_round_trips() {
        for length in [BarLength::Second, BarLength::Minute, BarLength::Day] {
            assert_eq!(BarLength::from_tag(length.as_tag()).unwrap(), length);
        }
    }
}
