//! Batch ingestion: read a pipe-delimited, zstd-compressed trade file and
//! push each record onto the worker channel.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::trade::{CsvStocksTrade, StocksTrade};

/// Read `path` (zstd-compressed, pipe-delimited, header row present) and
/// push every trade onto `sender`. Runs on a blocking thread since `csv`
/// and `zstd` are synchronous; matches the teacher's pattern of keeping
/// blocking I/O off the async worker tasks.
pub async fn run_csv_ingestion(path: impl AsRef<Path>, sender: mpsc::Sender<StocksTrade>) -> anyhow::Result<()> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || read_and_send(&path, sender))
        .await
        .context("csv ingestion task panicked")?
}

fn read_and_send(path: &Path, sender: mpsc::Sender<StocksTrade>) -> anyhow::Result<()> {
    let file = File::open(path).with_context(|| format!("opening trade file {path:?}"))?;
    let decoder = zstd::stream::read::Decoder::new(BufReader::new(file)).context("initializing zstd decoder")?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(true)
        .from_reader(decoder);

    let mut count = 0usize;
    let mut errors = 0usize;
    for record in reader.deserialize::<CsvStocksTrade>() {
        match record {
            Ok(raw) => {
                count += 1;
                if sender.blocking_send(raw.into_trade()).is_err() {
                    warn!("ingestion channel closed, stopping early");
                    break;
                }
                if count % 100_000 == 0 {
                    info!(count, "batch ingestion progress");
                }
            }
            Err(e) => {
                // Fail-open at the record level: one malformed row doesn't
                // abort the whole file.
                errors += 1;
                warn!(error = %e, "skipping malformed trade row");
            }
        }
    }

    info!(count, errors, "batch ingestion complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_valid_rows_and_skips_malformed_ones() {
        let dir = tempfile_dir();
        let path = dir.join("trades.csv.zst");

        let csv_body = "ticker|timestamp|price|size|conditions\n\
                         PGON|1|1.0|2|\n\
                         PGON|1|2.0|1|2;7\n\
                         not|a|valid|row|here|extra\n";
        let mut encoder = zstd::stream::write::Encoder::new(File::create(&path).unwrap(), 0).unwrap();
        encoder.write_all(csv_body.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        run_csv_ingestion(&path, tx).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.ticker, "PGON");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.conditions, vec![2, 7]);
        assert!(rx.recv().await.is_none());

        std::fs::remove_dir_all(dir).ok();
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("aggregates-engine-test-{nanos}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
