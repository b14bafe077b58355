//! Publish queue (C7): a deduplicating, concurrent set of aggregates updated
//! since the last sweep.

use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use crate::aggregate::Aggregate;
use crate::time::BarLength;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    ticker: String,
    start_timestamp: i64,
    bar_length: BarLength,
}

/// Collects the freshest version of every bar updated since the last sweep.
/// Re-enqueuing a key overwrites the prior value: the sweep emits the
/// latest view of each bar, not a log of every mutation (§9).
#[derive(Default)]
pub struct PublishQueue {
    entries: DashMap<Key, Aggregate>,
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A bar is ready to publish once its window has closed on the wall clock.
pub fn ready(aggregate: &Aggregate) -> bool {
    aggregate.end_timestamp < now_ms()
}

impl PublishQueue {
    pub fn new() -> Self {
        PublishQueue::default()
    }

    pub fn enqueue(&self, aggregate: Aggregate, bar_length: BarLength) {
        let key = Key {
            ticker: aggregate.ticker.clone(),
            start_timestamp: aggregate.start_timestamp,
            bar_length,
        };
        self.entries.insert(key, aggregate);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke `predicate` for every queued aggregate; entries for which it
    /// returns `true` are removed. `predicate` is the publish action itself
    /// — it decides readiness and performs the emission side effect.
    pub fn sweep_and_clear(&self, mut predicate: impl FnMut(&Aggregate) -> bool) {
        let keys: Vec<Key> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            let should_remove = match self.entries.get(&key) {
                Some(entry) => predicate(entry.value()),
                None => continue,
            };
            if should_remove {
                self.entries.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::BarLength;

    fn agg(ticker: &str, start: i64, end: i64) -> Aggregate {
        Aggregate {
            ticker: ticker.into(),
            start_timestamp: start,
            end_timestamp: end,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            vwap: 1.0,
            volume: 1.0,
            transactions: 1,
        }
    }

    #[test]
    fn re_enqueue_overwrites_not_accumulates() {
        let queue = PublishQueue::new();
        queue.enqueue(agg("PGON", 0, 60_000), BarLength::Minute);
        let mut updated = agg("PGON", 0, 60_000);
        updated.close = 5.0;
        queue.enqueue(updated, BarLength::Minute);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn sweep_removes_only_accepted_entries() {
        let queue = PublishQueue::new();
        queue.enqueue(agg("AAA", 0, 60_000), BarLength::Minute);
        queue.enqueue(agg("BBB", 0, 60_000), BarLength::Minute);

        let mut emitted = Vec::new();
        queue.sweep_and_clear(|agg| {
            let accept = agg.ticker == "AAA";
            if accept {
                emitted.push(agg.ticker.clone());
            }
            accept
        });

        assert_eq!(emitted, vec!["AAA".to_string()]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn ready_detects_closed_window() {
        let past = agg("PGON", 0, 1);
        let future = agg("PGON", 0, now_ms() + 1_000_000);
        assert!(ready(&past));
        assert!(!ready(&future));
    }
}
