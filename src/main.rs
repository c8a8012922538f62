//! Loki Pusher - ship JSON log lines from stdin to Loki
//!
//! Reads newline-delimited JSON log records (zap/tracing style, with `level`,
//! `msg`, `ts`, `caller` fields) from stdin, batches them, and pushes them to
//! a Loki server. Stops on EOF or Ctrl+C after flushing what is buffered.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `LOKI_PUSHER_URL`: Loki base URL (default: http://localhost:3100)
//! - `LOKI_PUSHER_LABELS`: Stream labels, e.g. `app=api,env=dev`
//! - `LOKI_PUSHER_BATCH_MAX_SIZE`: Entries per batch (default: 100)
//! - `LOKI_PUSHER_BATCH_MAX_WAIT_MS`: Flush interval (default: 5000)
//! - `LOKI_PUSHER_QUEUE_CAPACITY`: Ingestion queue size (default: 100)
//! - `LOKI_PUSHER_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: none)
//! - `LOKI_PUSHER_USERNAME` / `LOKI_PUSHER_PASSWORD`: Basic auth
//! - `LOKI_PUSHER_API_KEY_HEADER` / `LOKI_PUSHER_API_KEY`: API key header
//! - `RUST_LOG`: Logging level filter (default: info)

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use loki_pusher::config::Config;
use loki_pusher::pusher::Pusher;
use loki_pusher::sink::SinkError;

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with environment filter
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                push_url = %config.push_url(),
                labels = ?config.labels,
                batch_max_size = config.batch_max_size,
                batch_max_wait_ms = config.batch_max_wait.as_millis() as u64,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let pusher = match Pusher::start(config) {
        Ok(pusher) => pusher,
        Err(e) => {
            error!(error = %e, "Failed to start Loki pusher");
            std::process::exit(1);
        }
    };

    let sink = pusher.sink();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut forwarded: u64 = 0;
    let mut rejected: u64 = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match sink.write_raw(line.as_bytes()).await {
                    Ok(_) => forwarded += 1,
                    Err(SinkError::Parse(e)) => {
                        rejected += 1;
                        warn!(error = %e, "Skipping line that is not a JSON log record");
                    }
                    Err(e) => {
                        warn!(error = %e, "Pusher no longer accepting lines");
                        break;
                    }
                },
                Ok(None) => {
                    info!("End of input");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read stdin");
                    break;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping...");
                break;
            }
        }
    }

    info!(forwarded, rejected, "Flushing buffered lines");

    if let Some(stats) = pusher.stop().await {
        info!(
            batches_sent = stats.batches_sent,
            batches_failed = stats.batches_failed,
            entries_dropped = stats.entries_dropped,
            "Loki pusher stopped"
        );
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
///
/// Diagnostics go to stderr so they never mix with piped log data.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}
