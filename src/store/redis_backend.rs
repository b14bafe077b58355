//! Redis backend (C9): a `Store` implementation over Redis, satisfying the
//! same single-symbol exclusivity and get-miss materialization contract as
//! NativeDB. Feature-gated behind `redis-backend`.
//!
//! Redis itself has no notion of a per-symbol mutex, so — like NativeDB —
//! this backend keeps its own in-process lock manager to serialize
//! transactions on the same ticker; it does not provide cross-process
//! exclusivity, which is out of scope (§1 Non-goals: no durable
//! write-ahead log, no cross-process coordination guarantees beyond a
//! single engine instance).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::aggregate::Aggregate;
use crate::error::{Error, Result, Stage};
use crate::time::{snap, BarLength};

fn ttl_secs(length: BarLength) -> usize {
    match length {
        BarLength::Second | BarLength::Minute => 15 * 60,
        BarLength::Day => 24 * 60 * 60,
    }
}

fn key_for(ticker: &str, start_ms: i64, length: BarLength) -> String {
    format!("{ticker}/{start_ms}/{}", length.as_tag())
}

pub struct RedisStore {
    conn: redis::aio::MultiplexedConnection,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| Error::backend(Stage::NewTx, e))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::backend(Stage::NewTx, e))?;
        Ok(RedisStore {
            conn,
            locks: DashMap::new(),
        })
    }

    fn lock_for(&self, ticker: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(ticker.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct RedisTxn {
    conn: redis::aio::MultiplexedConnection,
    ticker: Option<String>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RedisStore {
    async fn bind(&self, tx: &mut RedisTxn, ticker: &str) {
        match &tx.ticker {
            None => {
                let guard = self.lock_for(ticker).lock_owned().await;
                tx.ticker = Some(ticker.to_string());
                tx.guard = Some(guard);
            }
            Some(existing) if existing == ticker => {}
            Some(existing) => panic!(
                "single-symbol violation: transaction already bound to {existing:?}, attempted to touch {ticker:?}"
            ),
        }
    }
}

#[async_trait]
impl crate::store::Store for RedisStore {
    type Txn = RedisTxn;

    async fn new_tx(&self) -> Result<Self::Txn> {
        Ok(RedisTxn {
            conn: self.conn.clone(),
            ticker: None,
            guard: None,
        })
    }

    async fn get(&self, tx: &mut Self::Txn, ticker: &str, ts_ns: i64, length: BarLength) -> Result<Aggregate> {
        self.bind(tx, ticker).await;
        let start_ms = snap(ts_ns, length);
        let key = key_for(ticker, start_ms, length);
        let raw: Option<String> = tx.conn.get(&key).await.map_err(|e| Error::backend(Stage::Get, e))?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Aggregate::fresh(ticker, start_ms, length)),
        }
    }

    async fn upsert(&self, tx: &mut Self::Txn, aggregate: &Aggregate) -> Result<()> {
        let length = aggregate.bar_length()?;
        self.bind(tx, &aggregate.ticker).await;
        let key = key_for(&aggregate.ticker, aggregate.start_timestamp, length);
        let json = serde_json::to_string(aggregate)?;
        let _: () = tx
            .conn
            .set_ex(&key, json, ttl_secs(length) as u64)
            .await
            .map_err(|e| Error::backend(Stage::Upsert, e))?;
        Ok(())
    }

    async fn delete(&self, tx: &mut Self::Txn, ticker: &str, ts_ns: i64, length: BarLength) -> Result<()> {
        self.bind(tx, ticker).await;
        let start_ms = snap(ts_ns, length);
        let key = key_for(ticker, start_ms, length);
        let _: () = tx.conn.del(&key).await.map_err(|e| Error::backend(Stage::Delete, e))?;
        Ok(())
    }

    async fn commit(&self, tx: Self::Txn) -> Result<()> {
        drop(tx);
        Ok(())
    }

    async fn range(&self, visitor: &mut (dyn for<'r> FnMut(&'r Aggregate) -> bool + Send)) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("*/*/*")
                .query_async(&mut conn)
                .await
                .map_err(|e| Error::backend(Stage::Get, e))?;

            for key in keys {
                let raw: Option<String> = conn.get(&key).await.map_err(|e| Error::backend(Stage::Get, e))?;
                if let Some(json) = raw {
                    if let Ok(agg) = serde_json::from_str::<Aggregate>(&json) {
                        if !visitor(&agg) {
                            return Ok(());
                        }
                    }
                }
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(())
    }
}
