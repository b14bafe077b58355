//! Update logic (C5): pure `(Aggregate, &Trade) -> Aggregate` functions for
//! stocks and currencies.
//!
//! The condition-code predicate names here are chosen for what they *gate*,
//! not copied from the upstream Go (`canUpdateHighLow` / `canUpdateOpenClose`),
//! which names them backwards: there, `canUpdateHighLow` actually gates
//! open/close and `canUpdateOpenClose` actually gates high/low. The exclusion
//! lists below are unchanged; only the names are corrected.

use crate::aggregate::Aggregate;
use crate::trade::{CurrenciesTrade, StocksTrade};

/// A pure update function from one trade to a new aggregate value.
pub type UpdateLogic<T> = fn(Aggregate, &T) -> Aggregate;

const OHL_EXCLUDED: [i32; 10] = [2, 7, 15, 16, 20, 21, 22, 29, 37, 52];
const HL_EXCLUDED: [i32; 18] = [
    2, 5, 7, 10, 12, 13, 15, 16, 17, 20, 21, 22, 29, 32, 33, 37, 38, 52,
];
const VOLUME_EXCLUDED: [i32; 2] = [15, 16];

/// Gates `open`/`close` assignment for a stocks trade.
pub fn may_update_ohl(conditions: &[i32]) -> bool {
    !conditions.iter().any(|c| OHL_EXCLUDED.contains(c))
}

/// Gates `high`/`low` assignment for a stocks trade.
pub fn may_update_hl(conditions: &[i32]) -> bool {
    !conditions.iter().any(|c| HL_EXCLUDED.contains(c))
}

/// Gates `volume`/`vwap`/`transactions` assignment for a stocks trade.
pub fn may_update_volume(conditions: &[i32]) -> bool {
    !conditions.iter().any(|c| VOLUME_EXCLUDED.contains(c))
}

/// VWAP update, size-weighted: `(vwap*volume + price*size) / (volume+size)`.
fn apply_volume(mut agg: Aggregate, price: f64, size: f64) -> Aggregate {
    let new_volume = agg.volume + size;
    agg.vwap = (agg.vwap * agg.volume + price * size) / new_volume;
    agg.volume = new_volume;
    agg.transactions += 1;
    agg
}

fn apply_ohl(mut agg: Aggregate, price: f64) -> Aggregate {
    if agg.open == 0.0 {
        agg.open = price;
    }
    agg.close = price;
    agg
}

fn apply_hl(mut agg: Aggregate, price: f64) -> Aggregate {
    if price > agg.high {
        agg.high = price;
    }
    if price < agg.low || agg.low == 0.0 {
        agg.low = price;
    }
    agg
}

/// Update logic for equities trades: each of open/close, high/low, and
/// volume/vwap/transactions is independently gated by the trade's condition
/// codes.
pub fn stocks_logic(mut aggregate: Aggregate, trade: &StocksTrade) -> Aggregate {
    if may_update_ohl(&trade.conditions) {
        aggregate = apply_ohl(aggregate, trade.price);
    }
    if may_update_hl(&trade.conditions) {
        aggregate = apply_hl(aggregate, trade.price);
    }
    if may_update_volume(&trade.conditions) {
        aggregate = apply_volume(aggregate, trade.price, trade.size as f64);
    }
    aggregate
}

/// Update logic for currency/crypto trades: unconditional (no condition
/// codes), weighted by `order_size` rather than an integer share count.
pub fn currencies_logic(mut aggregate: Aggregate, trade: &CurrenciesTrade) -> Aggregate {
    aggregate = apply_ohl(aggregate, trade.price);
    aggregate = apply_hl(aggregate, trade.price);
    aggregate = apply_volume(aggregate, trade.price, trade.order_size);
    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::BarLength;

    fn trade(price: f64, size: u32, conditions: Vec<i32>) -> StocksTrade {
        StocksTrade {
            ticker: "PGON".into(),
            timestamp: 1,
            price,
            size,
            conditions,
        }
    }

    #[test]
    fn s1_two_trades_produce_expected_bar() {
        let fresh = Aggregate::fresh("PGON", 0, BarLength::Minute);
        let after1 = stocks_logic(fresh, &trade(1.0, 2, vec![]));
        let after2 = stocks_logic(after1, &trade(2.0, 1, vec![]));

        assert_eq!(after2.open, 1.0);
        assert_eq!(after2.high, 2.0);
        assert_eq!(after2.low, 1.0);
        assert_eq!(after2.close, 2.0);
        assert_eq!(after2.volume, 3.0);
        assert_eq!(after2.transactions, 2);
        assert!((after2.vwap - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn s2_excluded_condition_leaves_bar_unchanged() {
        let fresh = Aggregate::fresh("PGON", 0, BarLength::Minute);
        let after = stocks_logic(fresh.clone(), &trade(1.0, 2, vec![15]));
        assert!(fresh.structurally_eq(&after));
    }

    #[test]
    fn s3_condition_2_blocks_open_close_but_allows_high_low() {
        let fresh = Aggregate::fresh("PGON", 0, BarLength::Minute);
        let after = stocks_logic(fresh, &trade(5.0, 1, vec![2]));
        assert_eq!(after.open, 0.0);
        assert_eq!(after.close, 0.0);
        assert_eq!(after.high, 5.0);
        assert_eq!(after.low, 5.0);
    }

    #[test]
    fn s4_currencies_two_trades_produce_expected_bar() {
        let fresh = Aggregate::fresh("BTC-USD", 0, BarLength::Minute);
        let t1 = CurrenciesTrade {
            ticker: "BTC-USD".into(),
            timestamp: 1,
            price: 10.0,
            order_size: 1.0,
        };
        let t2 = CurrenciesTrade {
            ticker: "BTC-USD".into(),
            timestamp: 1,
            price: 20.0,
            order_size: 3.0,
        };
        let after1 = currencies_logic(fresh, &t1);
        let after2 = currencies_logic(after1, &t2);

        assert_eq!(after2.open, 10.0);
        assert_eq!(after2.close, 20.0);
        assert_eq!(after2.high, 20.0);
        assert_eq!(after2.low, 10.0);
        assert_eq!(after2.volume, 4.0);
        assert_eq!(after2.transactions, 2);
        assert!((after2.vwap - 17.5).abs() < 1e-12);
    }

    #[test]
    fn ohlc_ordering_invariant_holds_after_any_trade_sequence() {
        let mut agg = Aggregate::fresh("PGON", 0, BarLength::Minute);
        for price in [3.0, 1.0, 5.0, 2.0] {
            agg = stocks_logic(agg, &trade(price, 1, vec![]));
        }
        assert!(agg.low <= agg.open && agg.open <= agg.high);
        assert!(agg.low <= agg.close && agg.close <= agg.high);
        assert!(agg.low <= agg.vwap && agg.vwap <= agg.high);
    }

    #[test]
    fn volume_never_decreases() {
        let mut agg = Aggregate::fresh("PGON", 0, BarLength::Minute);
        let mut last_volume = agg.volume;
        for price in [1.0, 2.0, 3.0] {
            agg = stocks_logic(agg, &trade(price, 4, vec![]));
            assert!(agg.volume >= last_volume);
            last_volume = agg.volume;
        }
    }
}
