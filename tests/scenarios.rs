//! End-to-end scenarios exercised through the public API only: ingestion,
//! aggregation, and publish-queue readiness working together.

use std::sync::Arc;
use std::time::Duration;

use aggregates_engine::logic::{currencies_logic, stocks_logic};
use aggregates_engine::process_trade::process_trade;
use aggregates_engine::publish_queue::PublishQueue;
use aggregates_engine::store::{NativeDb, Store};
use aggregates_engine::time::BarLength;
use aggregates_engine::{CurrenciesTrade, StocksTrade};

#[tokio::test]
async fn mixed_ticker_trades_stay_isolated_per_symbol() {
    let store = NativeDb::new();

    let pgon1 = StocksTrade {
        ticker: "PGON".into(),
        timestamp: 1,
        price: 1.0,
        size: 2,
        conditions: vec![],
    };
    let pgon2 = StocksTrade {
        ticker: "PGON".into(),
        timestamp: 1,
        price: 2.0,
        size: 1,
        conditions: vec![],
    };
    let other = StocksTrade {
        ticker: "OTHER".into(),
        timestamp: 1,
        price: 100.0,
        size: 5,
        conditions: vec![],
    };

    process_trade(&store, stocks_logic, &pgon1, BarLength::Minute, None).await.unwrap();
    process_trade(&store, stocks_logic, &pgon2, BarLength::Minute, None).await.unwrap();
    process_trade(&store, stocks_logic, &other, BarLength::Minute, None).await.unwrap();

    let mut seen = Vec::new();
    store
        .range(&mut |agg| {
            seen.push((agg.ticker.clone(), agg.volume, agg.transactions));
            true
        })
        .await
        .unwrap();
    seen.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(seen, vec![("OTHER".to_string(), 5.0, 1), ("PGON".to_string(), 3.0, 2)]);
}

#[tokio::test]
async fn bar_becomes_ready_once_its_window_has_closed() {
    let store = Arc::new(NativeDb::new());
    let queue = PublishQueue::new();

    // A bar timestamped far in the past is immediately ready to publish.
    let old_trade = CurrenciesTrade {
        ticker: "BTC-USD".into(),
        timestamp: 1,
        price: 10.0,
        order_size: 1.0,
    };
    let (aggregate, updated) = process_trade(&*store, currencies_logic, &old_trade, BarLength::Second, None)
        .await
        .unwrap();
    assert!(updated);
    queue.enqueue(aggregate, BarLength::Second);

    let mut emitted = Vec::new();
    queue.sweep_and_clear(|agg| {
        if aggregates_engine::publish_queue::ready(agg) {
            emitted.push(agg.ticker.clone());
            true
        } else {
            false
        }
    });

    assert_eq!(emitted, vec!["BTC-USD".to_string()]);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn deadline_rolls_back_without_corrupting_subsequent_reads() {
    let store = NativeDb::new();
    let trade = StocksTrade {
        ticker: "PGON".into(),
        timestamp: 1,
        price: 1.0,
        size: 1,
        conditions: vec![],
    };

    // A deadline far shorter than any real work still leaves the store in a
    // usable state for the next, unbounded call.
    let _ = process_trade(&store, stocks_logic, &trade, BarLength::Minute, Some(Duration::from_nanos(1))).await;

    let (aggregate, _) = process_trade(&store, stocks_logic, &trade, BarLength::Minute, None)
        .await
        .unwrap();
    assert_eq!(aggregate.ticker, "PGON");
}
