//! The keyed-transactional store interface (C3) and its implementations.

pub mod native;
#[cfg(feature = "redis-backend")]
pub mod redis_backend;
#[cfg(feature = "sql-backend")]
pub mod sql;

pub use native::NativeDb;

use async_trait::async_trait;

use crate::aggregate::Aggregate;
use crate::error::Result;
use crate::time::BarLength;

/// A keyed-transactional store of in-flight aggregates.
///
/// All operations within one transaction must target the same ticker
/// (single-symbol exclusivity, §4.3); a conforming backend panics if asked
/// to cross tickers within a live transaction, since that is a caller
/// programming error rather than a recoverable condition.
#[async_trait]
pub trait Store: Send + Sync {
    /// The transaction handle this backend hands out. Dropping a handle
    /// without calling `commit` must roll back any work it performed.
    type Txn: Send;

    async fn new_tx(&self) -> Result<Self::Txn>;

    /// Fetch the aggregate for `(ticker, snap(ts_ns, length), length)`. On a
    /// miss, materializes and returns a fresh zero aggregate with the
    /// correct identity rather than surfacing an "absent" error.
    async fn get(&self, tx: &mut Self::Txn, ticker: &str, ts_ns: i64, length: BarLength) -> Result<Aggregate>;

    /// Write `aggregate`; its key is derived from its own identity fields.
    async fn upsert(&self, tx: &mut Self::Txn, aggregate: &Aggregate) -> Result<()>;

    async fn delete(&self, tx: &mut Self::Txn, ticker: &str, ts_ns: i64, length: BarLength) -> Result<()>;

    /// Commit all operations performed under `tx`. On a backend that
    /// already failed partway through the transaction, this must surface
    /// the originating error rather than silently succeeding.
    async fn commit(&self, tx: Self::Txn) -> Result<()>;

    /// Weakly-consistent iteration over every stored aggregate. Cannot be
    /// composed with a transaction. `visitor` returns `false` to stop early.
    async fn range(&self, visitor: &mut (dyn for<'r> FnMut(&'r Aggregate) -> bool + Send)) -> Result<()>;
}
