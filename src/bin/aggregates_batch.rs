//! Batch entry point: replay a historical trade file through the
//! aggregation engine and write the resulting bars to a CSV file.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

use aggregates_engine::config::EngineConfig;
use aggregates_engine::logic::stocks_logic;
use aggregates_engine::publish_queue::PublishQueue;
use aggregates_engine::store::{NativeDb, Store};
use aggregates_engine::worker::spawn_workers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let input_path = args.next().context("usage: aggregates-batch <input.csv.zst> <output.csv>")?;
    let output_path = args.next().context("usage: aggregates-batch <input.csv.zst> <output.csv>")?;

    let config = EngineConfig::from_env();
    let bar_length = config.bar_length()?;

    let store = Arc::new(NativeDb::new());
    let publish_queue = Arc::new(PublishQueue::new());
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let workers = spawn_workers(
        store.clone(),
        stocks_logic,
        bar_length,
        rx,
        publish_queue,
        config.workers,
        None,
        shutdown_rx,
    );

    info!(input = %input_path, "starting batch ingestion");
    aggregates_engine::ingestion::csv_reader::run_csv_ingestion(&input_path, tx).await?;

    for worker in workers {
        worker.await?;
    }

    info!(output = %output_path, "writing aggregates");
    let mut out = std::fs::File::create(&output_path).with_context(|| format!("creating {output_path}"))?;
    let mut count = 0usize;
    store
        .range(&mut |agg| {
            if writeln!(out, "{}", agg.to_csv_row()).is_err() {
                return false;
            }
            count += 1;
            true
        })
        .await?;

    info!(count, "batch run complete");
    Ok(())
}
