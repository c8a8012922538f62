//! Pusher module: the ingestion queue and the batching worker.
//!
//! A [`Pusher`] owns a bounded tokio mpsc queue and one background task. The
//! task accumulates entries into a batch and flushes it when either:
//! - the batch reaches `batch_max_size` entries (size-based flush)
//! - the `batch_max_wait` ticker fires with a non-empty batch (time-based flush)
//!
//! On shutdown the queue is closed, whatever is still queued is drained into
//! batches, and a final flush sends the residue. Failed batches are logged and
//! dropped; nothing is retried.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::{ClientError, LokiClient};
use crate::config::{Config, ConfigError};
use crate::encoder::{self, EncodeError};
use crate::entry::LogEntry;
use crate::sink::LokiSink;

/// Shortest flush interval `batch_loop` will tick at.
const MIN_BATCH_MAX_WAIT: Duration = Duration::from_millis(1);

/// What caused a batch to be flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The batch reached `batch_max_size`
    Size,

    /// The `batch_max_wait` ticker fired
    Interval,

    /// Final flush while shutting down
    Shutdown,
}

/// Counters collected by the worker over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PusherStats {
    /// Entries taken off the ingestion queue
    pub entries_received: u64,

    /// Entries in batches that were delivered
    pub entries_flushed: u64,

    /// Entries in batches that failed to encode or deliver
    pub entries_dropped: u64,

    pub batches_sent: u64,
    pub batches_failed: u64,

    pub size_flushes: u64,
    pub interval_flushes: u64,
    pub shutdown_flushes: u64,
}

/// Errors returned to producers pushing entries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    /// `stop()` has been called; no more entries are accepted
    #[error("Loki pusher is shutting down")]
    ShuttingDown,

    /// The worker is gone without a shutdown having been requested
    #[error("Loki pusher worker has exited")]
    Closed,
}

/// Errors starting a pusher.
#[derive(Debug, thiserror::Error)]
pub enum PusherError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Loki pusher must be started from within a tokio runtime")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Errors that end a single batch.
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Delivery(#[from] ClientError),
}

struct Inner {
    tx: mpsc::Sender<LogEntry>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<PusherStats>>>,
}

/// Handle to a running batching worker.
///
/// Cloning is cheap; all clones feed the same queue. If every handle is
/// dropped without calling [`Pusher::stop`], the worker drains and flushes on
/// its own.
///
/// # Example
///
/// ```no_run
/// use std::collections::BTreeMap;
/// use loki_pusher::{Config, Pusher};
///
/// #[tokio::main]
/// async fn main() {
///     let labels = BTreeMap::from([("app".to_string(), "demo".to_string())]);
///     let pusher = Pusher::start(Config::new("http://localhost:3100", labels))
///         .expect("Failed to start pusher");
///
///     pusher
///         .push_structured("info", "service started", chrono::Utc::now(), None)
///         .await
///         .ok();
///
///     pusher.stop().await;
/// }
/// ```
#[derive(Clone)]
pub struct Pusher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Pusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pusher")
            .field("shutting_down", &self.is_shutting_down())
            .field("queued", &(self.inner.tx.max_capacity() - self.inner.tx.capacity()))
            .finish()
    }
}

impl Pusher {
    /// Validate `config` and spawn the worker on the current tokio runtime.
    pub fn start(config: Config) -> Result<Self, PusherError> {
        Self::start_with_token(config, CancellationToken::new())
    }

    /// Like [`Pusher::start`], but the worker also shuts down when `parent`
    /// is cancelled.
    pub fn start_with_token(config: Config, parent: CancellationToken) -> Result<Self, PusherError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()?;
        let client = LokiClient::new(&config)?;

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let shutdown = parent.child_token();
        let labels = Arc::new(config.labels.clone());

        info!(
            push_url = %client.push_url(),
            batch_max_size = config.batch_max_size,
            batch_max_wait_ms = config.batch_max_wait.as_millis() as u64,
            queue_capacity = config.queue_capacity,
            "Starting Loki pusher"
        );

        let worker = runtime.spawn(batch_loop(
            rx,
            config.batch_max_size,
            config.batch_max_wait,
            shutdown.clone(),
            move |batch, _trigger| {
                let client = client.clone();
                let labels = labels.clone();
                async move { deliver(&client, &labels, batch).await }
            },
        ));

        Ok(Self {
            inner: Arc::new(Inner {
                tx,
                shutdown,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    /// Queue an entry, waiting while the queue is full.
    ///
    /// A producer waiting on a full queue is released with
    /// [`PushError::ShuttingDown`] as soon as shutdown begins.
    pub async fn push(&self, entry: LogEntry) -> Result<(), PushError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(PushError::ShuttingDown);
        }

        tokio::select! {
            biased;
            _ = self.inner.shutdown.cancelled() => Err(PushError::ShuttingDown),
            result = self.inner.tx.send(entry) => result.map_err(|_| self.closed_error()),
        }
    }

    /// Structured hook: queue a line from already-parsed fields.
    pub async fn push_structured(
        &self,
        level: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
        caller: Option<String>,
    ) -> Result<(), PushError> {
        let mut entry = LogEntry::new(level, message, timestamp);
        entry.caller = caller;
        self.push(entry).await
    }

    /// Queue an entry from a synchronous thread, blocking while the queue is
    /// full.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context; use
    /// [`Pusher::push`] there.
    pub fn blocking_push(&self, entry: LogEntry) -> Result<(), PushError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(PushError::ShuttingDown);
        }

        self.inner
            .tx
            .blocking_send(entry)
            .map_err(|_| self.closed_error())
    }

    /// Byte-stream ingestion surface backed by this pusher.
    pub fn sink(&self) -> LokiSink {
        LokiSink::new(self.clone())
    }

    /// Whether shutdown has been requested (by `stop()` or the parent token).
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Signal shutdown and wait for the worker to drain and exit.
    ///
    /// Safe to call any number of times. The first call returns the worker's
    /// stats; later calls wait for the same shutdown and return `None`.
    pub async fn stop(&self) -> Option<PusherStats> {
        let mut worker = self.inner.worker.lock().await;
        self.inner.shutdown.cancel();

        let Some(handle) = worker.take() else {
            debug!("Loki pusher already stopped");
            return None;
        };

        info!("Stopping Loki pusher, flushing remaining entries");

        match handle.await {
            Ok(stats) => {
                info!(
                    entries_received = stats.entries_received,
                    entries_flushed = stats.entries_flushed,
                    entries_dropped = stats.entries_dropped,
                    batches_sent = stats.batches_sent,
                    batches_failed = stats.batches_failed,
                    "Loki pusher stopped"
                );
                Some(stats)
            }
            Err(e) => {
                error!(error = %e, "Loki pusher worker did not exit cleanly");
                None
            }
        }
    }

    fn closed_error(&self) -> PushError {
        if self.inner.shutdown.is_cancelled() {
            PushError::ShuttingDown
        } else {
            PushError::Closed
        }
    }
}

/// Encode one batch and send it.
async fn deliver(
    client: &LokiClient,
    labels: &BTreeMap<String, String>,
    batch: Vec<LogEntry>,
) -> Result<(), FlushError> {
    let body = encoder::encode(&batch, labels)?;
    client.send(body).await?;
    Ok(())
}

/// The flush-policy loop run by the worker task.
///
/// Receives entries from `rx` and hands batches to `on_flush` when either
/// threshold is reached. The ticker runs at a fixed period; size-based
/// flushes do not reset it. Once `shutdown` fires (or every sender is
/// dropped) the queue is closed and drained, the residue is flushed, and the
/// collected stats are returned.
///
/// A `batch_max_size` of 0 is treated as 1 and a zero `batch_max_wait` as
/// one millisecond.
pub async fn batch_loop<F, Fut>(
    mut rx: mpsc::Receiver<LogEntry>,
    batch_max_size: usize,
    batch_max_wait: Duration,
    shutdown: CancellationToken,
    mut on_flush: F,
) -> PusherStats
where
    F: FnMut(Vec<LogEntry>, FlushTrigger) -> Fut,
    Fut: Future<Output = Result<(), FlushError>>,
{
    let batch_max_size = batch_max_size.max(1);
    let batch_max_wait = batch_max_wait.max(MIN_BATCH_MAX_WAIT);
    let mut batch: Vec<LogEntry> = Vec::with_capacity(batch_max_size);
    let mut stats = PusherStats::default();

    let mut ticker = interval(batch_max_wait);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush(&mut batch, batch_max_size, FlushTrigger::Interval, &mut on_flush, &mut stats).await;
                }
            }

            maybe_entry = rx.recv() => {
                let Some(entry) = maybe_entry else { break };

                stats.entries_received += 1;
                batch.push(entry);

                if batch.len() >= batch_max_size {
                    flush(&mut batch, batch_max_size, FlushTrigger::Size, &mut on_flush, &mut stats).await;
                }
            }
        }
    }

    rx.close();
    while let Some(entry) = rx.recv().await {
        stats.entries_received += 1;
        batch.push(entry);

        if batch.len() >= batch_max_size {
            flush(&mut batch, batch_max_size, FlushTrigger::Size, &mut on_flush, &mut stats).await;
        }
    }

    if !batch.is_empty() {
        info!(remaining = batch.len(), "Shutting down, flushing remaining entries");
        flush(&mut batch, batch_max_size, FlushTrigger::Shutdown, &mut on_flush, &mut stats).await;
    }

    stats
}

async fn flush<F, Fut>(
    batch: &mut Vec<LogEntry>,
    batch_max_size: usize,
    trigger: FlushTrigger,
    on_flush: &mut F,
    stats: &mut PusherStats,
) where
    F: FnMut(Vec<LogEntry>, FlushTrigger) -> Fut,
    Fut: Future<Output = Result<(), FlushError>>,
{
    let entries = std::mem::replace(batch, Vec::with_capacity(batch_max_size));
    let batch_len = entries.len() as u64;
    let batch_id = Uuid::new_v4();

    match trigger {
        FlushTrigger::Size => stats.size_flushes += 1,
        FlushTrigger::Interval => stats.interval_flushes += 1,
        FlushTrigger::Shutdown => stats.shutdown_flushes += 1,
    }

    debug!(%batch_id, batch_size = batch_len, ?trigger, "Flushing batch");

    match on_flush(entries, trigger).await {
        Ok(()) => {
            stats.batches_sent += 1;
            stats.entries_flushed += batch_len;
        }
        Err(e) => {
            stats.batches_failed += 1;
            stats.entries_dropped += batch_len;
            warn!(%batch_id, batch_size = batch_len, error = %e, "Failed to flush batch, dropping it");
        }
    }
}
