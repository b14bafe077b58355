//! Streaming entry point: consume a live trade feed, maintain rolling bars
//! in memory, and print each bar once its window closes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

use aggregates_engine::config::EngineConfig;
use aggregates_engine::logic::currencies_logic;
use aggregates_engine::publish_queue::PublishQueue;
use aggregates_engine::store::NativeDb;
use aggregates_engine::time::BarLength;
use aggregates_engine::worker::{spawn_publish_sweeper, spawn_workers};

const STREAM_URL: &str = "wss://socket.polygon.io/crypto";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EngineConfig::from_env();
    let bar_length = config.bar_length().unwrap_or(BarLength::Minute);

    let store = Arc::new(NativeDb::new());
    let publish_queue = Arc::new(PublishQueue::new());
    let (trade_tx, trade_rx) = mpsc::channel(config.channel_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let workers = spawn_workers(
        store.clone(),
        currencies_logic,
        bar_length,
        trade_rx,
        publish_queue.clone(),
        config.workers,
        Some(Duration::from_millis(config.streaming_timeout_ms)),
        shutdown_rx.clone(),
    );

    let sweeper = spawn_publish_sweeper(
        publish_queue,
        |agg| {
            let start = chrono::DateTime::from_timestamp_millis(agg.start_timestamp)
                .map(|dt| dt.format("%H:%M:%S").to_string())
                .unwrap_or_default();
            println!(
                "{} {} - open: ${:.2}, close: ${:.2}, high: ${:.2}, low: ${:.2}, volume: {}",
                agg.ticker, start, agg.open, agg.close, agg.high, agg.low, agg.volume
            );
        },
        shutdown_rx.clone(),
    );

    let ttl_sweeper = tokio::spawn(store.clone().run_ttl_sweeper(shutdown_rx));

    info!(workers = config.workers, "starting streaming ingestion");
    let ingest = tokio::spawn(aggregates_engine::ingestion::websocket::run_currencies_stream(
        STREAM_URL.to_string(),
        config.api_key.clone(),
        "XT.*".to_string(),
        trade_tx,
    ));

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
    shutdown_tx.send(true).ok();

    ingest.abort();
    for worker in workers {
        worker.await.ok();
    }
    sweeper.await.ok();
    ttl_sweeper.await.ok();

    Ok(())
}
