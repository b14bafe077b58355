//! Streaming ingestion: connect to the trade websocket, perform the
//! auth/subscribe handshake, and push decoded trades onto the worker
//! channel. Reconnects with a fixed backoff on disconnect, matching the
//! teacher's `market_data::trade_stream::run_trade_stream` loop.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::trade::{CurrenciesTrade, StocksTrade};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Stream stocks trades from `url`, authenticating with `api_key` and
/// subscribing to `topic` (e.g. `"T.*"`). Runs until the sender's receiver
/// is dropped; reconnects on any socket error.
pub async fn run_stocks_stream(url: String, api_key: String, topic: String, sender: mpsc::Sender<StocksTrade>) {
    loop {
        if sender.is_closed() {
            info!("stocks stream sender closed, stopping reconnect loop");
            return;
        }
        if let Err(e) = stocks_session(&url, &api_key, &topic, &sender).await {
            error!(error = %e, "stocks websocket session ended, reconnecting");
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn stocks_session(
    url: &str,
    api_key: &str,
    topic: &str,
    sender: &mpsc::Sender<StocksTrade>,
) -> anyhow::Result<()> {
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await?;
    authenticate(&mut socket, api_key, topic).await?;

    while let Some(msg) = socket.next().await {
        let msg = msg?;
        let Message::Text(text) = msg else { continue };
        match serde_json::from_str::<Vec<StocksTrade>>(&text) {
            Ok(trades) => {
                for trade in trades {
                    if sender.send(trade).await.is_err() {
                        return Ok(());
                    }
                }
            }
            Err(e) => warn!(error = %e, "skipping malformed stocks trade frame"),
        }
    }
    Ok(())
}

/// Stream currencies trades, same handshake shape, different payload type.
pub async fn run_currencies_stream(url: String, api_key: String, topic: String, sender: mpsc::Sender<CurrenciesTrade>) {
    loop {
        if sender.is_closed() {
            info!("currencies stream sender closed, stopping reconnect loop");
            return;
        }
        if let Err(e) = currencies_session(&url, &api_key, &topic, &sender).await {
            error!(error = %e, "currencies websocket session ended, reconnecting");
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn currencies_session(
    url: &str,
    api_key: &str,
    topic: &str,
    sender: &mpsc::Sender<CurrenciesTrade>,
) -> anyhow::Result<()> {
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await?;
    authenticate(&mut socket, api_key, topic).await?;

    while let Some(msg) = socket.next().await {
        let msg = msg?;
        let Message::Text(text) = msg else { continue };
        match serde_json::from_str::<Vec<CurrenciesTrade>>(&text) {
            Ok(trades) => {
                for trade in trades {
                    if sender.send(trade).await.is_err() {
                        return Ok(());
                    }
                }
            }
            Err(e) => warn!(error = %e, "skipping malformed currencies trade frame"),
        }
    }
    Ok(())
}

async fn authenticate(
    socket: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    api_key: &str,
    topic: &str,
) -> anyhow::Result<()> {
    // The feed greets with a status frame before accepting commands.
    if let Some(greeting) = socket.next().await {
        info!(greeting = ?greeting?, "websocket connected");
    }

    let auth = serde_json::json!({"action": "auth", "params": api_key}).to_string();
    socket.send(Message::Text(auth)).await?;
    if let Some(resp) = socket.next().await {
        info!(response = ?resp?, "auth acknowledged");
    }

    let subscribe = serde_json::json!({"action": "subscribe", "params": topic}).to_string();
    socket.send(Message::Text(subscribe)).await?;
    if let Some(resp) = socket.next().await {
        info!(response = ?resp?, "subscribe acknowledged");
    }

    Ok(())
}
