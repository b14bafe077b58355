//! NativeDB (C4): the in-memory `Store` implementation backing both batch
//! and streaming binaries by default.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::aggregate::Aggregate;
use crate::error::Result;
use crate::store::Store;
use crate::time::{snap, BarLength};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    ticker: String,
    start_ms: i64,
    length: BarLength,
}

/// Per-ticker TTL, matching the 15-minute sweep cadence for second/minute
/// bars and a 24-hour horizon for day bars.
fn ttl(length: BarLength) -> Duration {
    match length {
        BarLength::Second | BarLength::Minute => Duration::from_secs(15 * 60),
        BarLength::Day => Duration::from_secs(24 * 60 * 60),
    }
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// In-memory store: a concurrent data map, a concurrent last-write-time map,
/// and an unbounded per-ticker lock pool.
pub struct NativeDb {
    data: DashMap<Key, Aggregate>,
    last_updated_ns: DashMap<Key, i64>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Default for NativeDb {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeDb {
    pub fn new() -> Self {
        NativeDb {
            data: DashMap::new(),
            last_updated_ns: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, ticker: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(ticker.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Bind `tx` to `ticker`, acquiring its lock on first use. Panics if the
    /// transaction was already bound to a different ticker: crossing
    /// tickers inside one transaction is a caller programming error, not a
    /// recoverable one (§4.3, §7).
    async fn bind(&self, tx: &mut NativeTxn, ticker: &str) {
        match &tx.ticker {
            None => {
                let guard = self.lock_for(ticker).lock_owned().await;
                tx.ticker = Some(ticker.to_string());
                tx.guard = Some(guard);
            }
            Some(existing) if existing == ticker => {}
            Some(existing) => {
                panic!(
                    "single-symbol violation: transaction already bound to {existing:?}, \
                     attempted to touch {ticker:?}"
                );
            }
        }
    }

    /// Iterate a snapshot of keys and evict entries idle past their TTL.
    /// Never holds a global lock: each eviction takes only that ticker's
    /// per-symbol mutex, so live traffic on other tickers is unaffected.
    pub async fn sweep_expired(&self) {
        let now = now_ns();
        let snapshot: Vec<Key> = self.last_updated_ns.iter().map(|e| e.key().clone()).collect();
        let mut evicted = 0usize;

        for key in snapshot {
            let lock = self.lock_for(&key.ticker);
            let _guard = lock.lock().await;
            let Some(last) = self.last_updated_ns.get(&key).map(|v| *v) else {
                continue;
            };
            let idle = Duration::from_nanos((now - last).max(0) as u64);
            if idle > ttl(key.length) {
                self.data.remove(&key);
                self.last_updated_ns.remove(&key);
                evicted += 1;
            }
        }

        if evicted > 0 {
            debug!(evicted, "ttl sweep evicted idle aggregates");
        }
    }

    /// Drop lock-manager entries for tickers with no live data, bounding
    /// the otherwise-unbounded lock map (§9).
    pub fn gc_idle_locks(&self) {
        let live: std::collections::HashSet<String> =
            self.data.iter().map(|e| e.key().ticker.clone()).collect();
        let before = self.locks.len();
        self.locks.retain(|ticker, lock| live.contains(ticker) || Arc::strong_count(lock) > 1);
        let removed = before - self.locks.len();
        if removed > 0 {
            debug!(removed, "gc'd idle per-symbol locks");
        }
    }

    /// Run the TTL sweeper on a 15-minute tick until `shutdown` fires.
    pub async fn run_ttl_sweeper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(15 * 60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_expired().await;
                    self.gc_idle_locks();
                }
                _ = shutdown.changed() => {
                    info!("ttl sweeper shutting down");
                    return;
                }
            }
        }
    }
}

/// NativeDB's transaction handle: the ticker it's bound to and the guard
/// that grants exclusive access to it. Dropping without `commit` simply
/// releases the guard — NativeDB applies writes immediately rather than
/// buffering them, so there is no staged state to roll back (see DESIGN.md).
pub struct NativeTxn {
    ticker: Option<String>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl NativeTxn {
    fn new() -> Self {
        NativeTxn {
            ticker: None,
            guard: None,
        }
    }
}

#[async_trait]
impl Store for NativeDb {
    type Txn = NativeTxn;

    async fn new_tx(&self) -> Result<Self::Txn> {
        Ok(NativeTxn::new())
    }

    async fn get(&self, tx: &mut Self::Txn, ticker: &str, ts_ns: i64, length: BarLength) -> Result<Aggregate> {
        self.bind(tx, ticker).await;
        let start_ms = snap(ts_ns, length);
        let key = Key {
            ticker: ticker.to_string(),
            start_ms,
            length,
        };
        let agg = self
            .data
            .entry(key)
            .or_insert_with(|| Aggregate::fresh(ticker, start_ms, length))
            .clone();
        Ok(agg)
    }

    async fn upsert(&self, tx: &mut Self::Txn, aggregate: &Aggregate) -> Result<()> {
        let length = aggregate.bar_length()?;
        self.bind(tx, &aggregate.ticker).await;
        let key = Key {
            ticker: aggregate.ticker.clone(),
            start_ms: aggregate.start_timestamp,
            length,
        };
        self.data.insert(key.clone(), aggregate.clone());
        self.last_updated_ns.insert(key, now_ns());
        Ok(())
    }

    async fn delete(&self, tx: &mut Self::Txn, ticker: &str, ts_ns: i64, length: BarLength) -> Result<()> {
        self.bind(tx, ticker).await;
        let start_ms = snap(ts_ns, length);
        let key = Key {
            ticker: ticker.to_string(),
            start_ms,
            length,
        };
        self.data.remove(&key);
        self.last_updated_ns.remove(&key);
        Ok(())
    }

    async fn commit(&self, tx: Self::Txn) -> Result<()> {
        // Dropping `tx` (and its guard) is the entire commit: writes were
        // already applied by upsert/delete under the held lock.
        drop(tx);
        Ok(())
    }

    async fn range(&self, visitor: &mut (dyn for<'r> FnMut(&'r Aggregate) -> bool + Send)) -> Result<()> {
        let snapshot: Vec<Aggregate> = self.data.iter().map(|entry| entry.value().clone()).collect();
        for aggregate in &snapshot {
            if !visitor(aggregate) {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::stocks_logic;
    use crate::process_trade::process_trade;
    use crate::trade::StocksTrade;

    fn trade(price: f64, size: u32) -> StocksTrade {
        StocksTrade {
            ticker: "PGON".into(),
            timestamp: 1,
            price,
            size,
            conditions: vec![],
        }
    }

    #[tokio::test]
    async fn get_miss_materializes_fresh_aggregate() {
        let db = NativeDb::new();
        let mut tx = db.new_tx().await.unwrap();
        let agg = db.get(&mut tx, "PGON", 0, BarLength::Minute).await.unwrap();
        assert_eq!(agg.ticker, "PGON");
        assert_eq!(agg.transactions, 0);
        db.commit(tx).await.unwrap();
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let db = NativeDb::new();
        for t in [trade(1.0, 2), trade(2.0, 1)] {
            process_trade(&db, stocks_logic, &t, BarLength::Minute, None)
                .await
                .unwrap();
        }

        let mut tx = db.new_tx().await.unwrap();
        let agg = db.get(&mut tx, "PGON", 0, BarLength::Minute).await.unwrap();
        db.commit(tx).await.unwrap();

        assert_eq!(agg.open, 1.0);
        assert_eq!(agg.high, 2.0);
        assert_eq!(agg.low, 1.0);
        assert_eq!(agg.close, 2.0);
        assert_eq!(agg.volume, 3.0);
    }

    #[tokio::test]
    #[should_panic(expected = "single-symbol violation")]
    async fn crossing_tickers_in_one_transaction_panics() {
        let db = NativeDb::new();
        let mut tx = db.new_tx().await.unwrap();
        let _ = db.get(&mut tx, "PGON", 0, BarLength::Minute).await.unwrap();
        let _ = db.get(&mut tx, "OTHER", 0, BarLength::Minute).await.unwrap();
    }

    #[tokio::test]
    async fn ttl_sweep_evicts_idle_entries() {
        let db = NativeDb::new();
        let mut tx = db.new_tx().await.unwrap();
        let agg = db.get(&mut tx, "PGON", 0, BarLength::Second).await.unwrap();
        db.upsert(&mut tx, &agg).await.unwrap();
        db.commit(tx).await.unwrap();

        // Force the bookkeeping entry to look stale without waiting 15 min.
        let key = Key {
            ticker: "PGON".into(),
            start_ms: 0,
            length: BarLength::Second,
        };
        db.last_updated_ns.insert(key, 0);
        db.sweep_expired().await;

        let mut tx = db.new_tx().await.unwrap();
        let agg = db.get(&mut tx, "PGON", 0, BarLength::Second).await.unwrap();
        db.commit(tx).await.unwrap();
        assert_eq!(agg.transactions, 0, "eviction should return a fresh bar");
    }

    #[tokio::test]
    async fn range_visits_every_stored_aggregate() {
        let db = NativeDb::new();
        for ticker in ["AAA", "BBB"] {
            let mut tx = db.new_tx().await.unwrap();
            let agg = db.get(&mut tx, ticker, 0, BarLength::Minute).await.unwrap();
            db.upsert(&mut tx, &agg).await.unwrap();
            db.commit(tx).await.unwrap();
        }

        let mut seen = Vec::new();
        db.range(&mut |agg| {
            seen.push(agg.ticker.clone());
            true
        })
        .await
        .unwrap();
        seen.sort();
        assert_eq!(seen, vec!["AAA".to_string(), "BBB".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_workers_match_serial_result() {
        use std::sync::Arc;

        let trades: Vec<StocksTrade> = (0..1000)
            .map(|i| trade(1.0 + (i % 7) as f64, 1 + (i % 3) as u32))
            .collect();

        let serial_db = NativeDb::new();
        for t in &trades {
            process_trade(&serial_db, stocks_logic, t, BarLength::Minute, None)
                .await
                .unwrap();
        }
        let mut tx = serial_db.new_tx().await.unwrap();
        let serial_result = serial_db.get(&mut tx, "PGON", 0, BarLength::Minute).await.unwrap();
        serial_db.commit(tx).await.unwrap();

        let parallel_db = Arc::new(NativeDb::new());
        let mut handles = Vec::new();
        for chunk in trades.chunks(125) {
            let db = parallel_db.clone();
            let chunk = chunk.to_vec();
            handles.push(tokio::spawn(async move {
                for t in chunk {
                    process_trade(&*db, stocks_logic, &t, BarLength::Minute, None)
                        .await
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let mut tx = parallel_db.new_tx().await.unwrap();
        let parallel_result = parallel_db.get(&mut tx, "PGON", 0, BarLength::Minute).await.unwrap();
        parallel_db.commit(tx).await.unwrap();

        assert!(serial_result.structurally_eq(&parallel_result));
    }
}
