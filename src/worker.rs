//! Worker pool & ingestion glue (C8): fan a trade channel out to N workers,
//! each running ProcessTrade and enqueueing updates for publish.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::logic::UpdateLogic;
use crate::process_trade::process_trade;
use crate::publish_queue::PublishQueue;
use crate::store::Store;
use crate::time::BarLength;
use crate::trade::Trade;

/// Spawn `worker_count` tasks that drain `receiver`, run ProcessTrade for
/// each trade, and enqueue the result into `publish_queue` when updated.
/// `per_trade_timeout` bounds each ProcessTrade call (≈100ms in streaming
/// mode; pass `None` in batch mode, where ingestion is already bounded by
/// the file's end).
pub fn spawn_workers<S, T>(
    store: Arc<S>,
    logic: UpdateLogic<T>,
    bar_length: BarLength,
    receiver: mpsc::Receiver<T>,
    publish_queue: Arc<PublishQueue>,
    worker_count: usize,
    per_trade_timeout: Option<Duration>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>>
where
    S: Store + 'static,
    T: Trade + Send + Sync + 'static,
{
    let receiver = Arc::new(Mutex::new(receiver));
    (0..worker_count.max(1))
        .map(|id| {
            let store = store.clone();
            let receiver = receiver.clone();
            let publish_queue = publish_queue.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let trade = tokio::select! {
                        biased;
                        _ = shutdown.changed() => {
                            info!(worker = id, "worker shutting down");
                            return;
                        }
                        trade = async {
                            let mut guard = receiver.lock().await;
                            guard.recv().await
                        } => trade,
                    };

                    let Some(trade) = trade else {
                        info!(worker = id, "ingestion channel closed, worker exiting");
                        return;
                    };

                    let ticker = trade.ticker().to_string();
                    match process_trade(&*store, logic, &trade, bar_length, per_trade_timeout).await {
                        Ok((aggregate, true)) => {
                            publish_queue.enqueue(aggregate, bar_length);
                        }
                        Ok((_, false)) => {}
                        Err(e) => {
                            // Fail-open: log and keep draining, per §7.
                            error!(worker = id, ticker, error = %e, "trade processing failed, skipping");
                        }
                    }
                }
            })
        })
        .collect()
}

/// Sweep `queue` on a 1-second tick, invoking `sink` for each ready
/// aggregate until `shutdown` fires.
pub fn spawn_publish_sweeper(
    queue: Arc<PublishQueue>,
    sink: impl Fn(&crate::aggregate::Aggregate) + Send + Sync + 'static,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    queue.sweep_and_clear(|agg| {
                        if crate::publish_queue::ready(agg) {
                            sink(agg);
                            true
                        } else {
                            false
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("publish sweeper shutting down");
                    return;
                }
            }
        }
    })
}
