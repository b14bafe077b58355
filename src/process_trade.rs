//! ProcessTrade (C6): the transactional read-modify-write pipeline gluing
//! the store (C3) to a pure update function (C5).

use std::time::Duration;

use tracing::error;

use crate::error::{Error, Result};
use crate::logic::UpdateLogic;
use crate::store::Store;
use crate::time::{parse_ts, BarLength};
use crate::trade::Trade;

/// Apply `trade` to whatever bar it belongs to in `store`, using `logic` to
/// compute the new value. Returns the resulting aggregate and whether the
/// trade produced an effective mutation (computed *before* the write, per
/// §4.6, so it reflects the logical effect rather than a post-hoc diff).
///
/// `deadline`, when set, bounds the whole operation; on expiry the
/// transaction is abandoned (its `Drop` impl rolls back) and
/// `Error::Cancelled` is returned.
pub async fn process_trade<S, T>(
    store: &S,
    logic: UpdateLogic<T>,
    trade: &T,
    length: BarLength,
    deadline: Option<Duration>,
) -> Result<(crate::aggregate::Aggregate, bool)>
where
    S: Store,
    T: Trade,
{
    let attempt = run(store, logic, trade, length);
    match deadline {
        Some(d) => tokio::time::timeout(d, attempt)
            .await
            .map_err(|_| Error::Cancelled)?,
        None => attempt.await,
    }
}

async fn run<S, T>(
    store: &S,
    logic: UpdateLogic<T>,
    trade: &T,
    length: BarLength,
) -> Result<(crate::aggregate::Aggregate, bool)>
where
    S: Store,
    T: Trade,
{
    let mut tx = store.new_tx().await.map_err(|e| {
        error!(stage = "new_tx", error = %e, "failed to open transaction");
        e
    })?;

    let ts_ns = parse_ts(trade.timestamp());
    let ticker = trade.ticker();

    let old = store.get(&mut tx, ticker, ts_ns, length).await.map_err(|e| {
        error!(stage = "get", ticker, error = %e, "failed to read aggregate");
        e
    })?;

    let new = logic(old.clone(), trade);
    let updated = !old.structurally_eq(&new);

    store.upsert(&mut tx, &new).await.map_err(|e| {
        error!(stage = "upsert", ticker, error = %e, "failed to write aggregate");
        e
    })?;

    store.commit(tx).await.map_err(|e| {
        error!(stage = "commit", ticker, error = %e, "failed to commit transaction");
        e
    })?;

    Ok((new, updated))
}
