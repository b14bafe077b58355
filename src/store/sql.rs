//! SQL backend (C9): a `Store` implementation over Postgres via `sqlx`,
//! satisfying the same single-symbol exclusivity and get-miss
//! materialization contract as NativeDB. Feature-gated behind
//! `sql-backend` since most deployments run on NativeDB alone.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::{PgPool, Postgres, Row};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::aggregate::Aggregate;
use crate::error::{Error, Result, Stage};
use crate::time::{snap, BarLength};

pub const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS aggregates (
    ticker       TEXT NOT NULL,
    timestamp    BIGINT NOT NULL,
    bar_length   TEXT NOT NULL,
    open         DOUBLE PRECISION NOT NULL,
    high         DOUBLE PRECISION NOT NULL,
    low          DOUBLE PRECISION NOT NULL,
    close        DOUBLE PRECISION NOT NULL,
    vwap         DOUBLE PRECISION NOT NULL,
    volume       DOUBLE PRECISION NOT NULL,
    transactions INTEGER NOT NULL,
    PRIMARY KEY (ticker, timestamp, bar_length)
)
"#;

pub struct SqlStore {
    pool: PgPool,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SqlStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url)
            .await
            .map_err(|e| Error::backend(Stage::NewTx, e))?;
        sqlx::query(CREATE_TABLE_SQL)
            .execute(&pool)
            .await
            .map_err(|e| Error::backend(Stage::NewTx, e))?;
        Ok(SqlStore {
            pool,
            locks: DashMap::new(),
        })
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
    /// recoverable one (§4.3, §7). READ COMMITTED alone doesn't serialize
    /// concurrent upserts to the same row, so the lock is load-bearing here,
    /// not just a mirror of NativeDB's.
    async fn bind(&self, tx: &mut SqlTxn, ticker: &str) {
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
}

pub struct SqlTxn {
    tx: sqlx::Transaction<'static, Postgres>,
    ticker: Option<String>,
    guard: Option<OwnedMutexGuard<()>>,
}

fn row_to_aggregate(ticker: &str, start_ms: i64, length: BarLength, row: &sqlx::postgres::PgRow) -> Aggregate {
    Aggregate {
        ticker: ticker.to_string(),
        start_timestamp: start_ms,
        end_timestamp: start_ms + length.duration_ms(),
        open: row.get("open"),
        high: row.get("high"),
        low: row.get("low"),
        close: row.get("close"),
        vwap: row.get("vwap"),
        volume: row.get("volume"),
        transactions: row.get::<i32, _>("transactions") as u32,
    }
}

#[async_trait]
impl crate::store::Store for SqlStore {
    type Txn = SqlTxn;

    async fn new_tx(&self) -> Result<Self::Txn> {
        let tx = self.pool.begin().await.map_err(|e| Error::backend(Stage::NewTx, e))?;
        Ok(SqlTxn {
            tx,
            ticker: None,
            guard: None,
        })
    }

    async fn get(&self, tx: &mut Self::Txn, ticker: &str, ts_ns: i64, length: BarLength) -> Result<Aggregate> {
        self.bind(tx, ticker).await;
        let start_ms = snap(ts_ns, length);
        let row = sqlx::query(
            "SELECT open, high, low, close, vwap, volume, transactions FROM aggregates \
             WHERE ticker = $1 AND timestamp = $2 AND bar_length = $3",
        )
        .bind(ticker)
        .bind(start_ms)
        .bind(length.as_tag())
        .fetch_optional(&mut *tx.tx)
        .await
        .map_err(|e| Error::backend(Stage::Get, e))?;

        Ok(match row {
            Some(row) => row_to_aggregate(ticker, start_ms, length, &row),
            None => Aggregate::fresh(ticker, start_ms, length),
        })
    }

    async fn upsert(&self, tx: &mut Self::Txn, aggregate: &Aggregate) -> Result<()> {
        let length = aggregate.bar_length()?;
        self.bind(tx, &aggregate.ticker).await;
        sqlx::query(
            "INSERT INTO aggregates (ticker, timestamp, bar_length, open, high, low, close, vwap, volume, transactions) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (ticker, timestamp, bar_length) DO UPDATE SET \
             open = EXCLUDED.open, high = EXCLUDED.high, low = EXCLUDED.low, close = EXCLUDED.close, \
             vwap = EXCLUDED.vwap, volume = EXCLUDED.volume, transactions = EXCLUDED.transactions",
        )
        .bind(&aggregate.ticker)
        .bind(aggregate.start_timestamp)
        .bind(length.as_tag())
        .bind(aggregate.open)
        .bind(aggregate.high)
        .bind(aggregate.low)
        .bind(aggregate.close)
        .bind(aggregate.vwap)
        .bind(aggregate.volume)
        .bind(aggregate.transactions as i32)
        .execute(&mut *tx.tx)
        .await
        .map_err(|e| Error::backend(Stage::Upsert, e))?;
        Ok(())
    }

    async fn delete(&self, tx: &mut Self::Txn, ticker: &str, ts_ns: i64, length: BarLength) -> Result<()> {
        self.bind(tx, ticker).await;
        let start_ms = snap(ts_ns, length);
        sqlx::query("DELETE FROM aggregates WHERE ticker = $1 AND timestamp = $2 AND bar_length = $3")
            .bind(ticker)
            .bind(start_ms)
            .bind(length.as_tag())
            .execute(&mut *tx.tx)
            .await
            .map_err(|e| Error::backend(Stage::Delete, e))?;
        Ok(())
    }

    async fn commit(&self, tx: Self::Txn) -> Result<()> {
        tx.tx.commit().await.map_err(|e| Error::backend(Stage::Commit, e))
    }

    async fn range(&self, visitor: &mut (dyn for<'r> FnMut(&'r Aggregate) -> bool + Send)) -> Result<()> {
        let rows = sqlx::query("SELECT ticker, timestamp, bar_length, open, high, low, close, vwap, volume, transactions FROM aggregates")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::backend(Stage::Get, e))?;

        for row in rows {
            let ticker: String = row.get("ticker");
            let start_ms: i64 = row.get("timestamp");
            let tag: String = row.get("bar_length");
            let length = BarLength::from_tag(&tag)?;
            let agg = row_to_aggregate(&ticker, start_ms, length, &row);
            if !visitor(&agg) {
                break;
            }
        }
        Ok(())
    }
}
