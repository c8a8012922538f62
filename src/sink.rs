//! Byte-stream sink.
//!
//! [`LokiSink`] accepts pre-serialized JSON log lines, as written by a
//! structured logging front-end, and queues them on its [`Pusher`]. Delivery
//! timing belongs to the pusher's batching policy, so `flush` and `close` do
//! nothing.

use std::io;

use tracing::trace;

use crate::entry::LogEntry;
use crate::pusher::{PushError, Pusher};

/// Errors returned by sink writes.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The buffer did not contain valid JSON log lines; nothing was queued
    #[error("failed to parse log line: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Push(#[from] PushError),
}

impl From<SinkError> for io::Error {
    fn from(err: SinkError) -> Self {
        let kind = match &err {
            SinkError::Parse(_) => io::ErrorKind::InvalidData,
            SinkError::Push(_) => io::ErrorKind::BrokenPipe,
        };
        io::Error::new(kind, err)
    }
}

/// Writer that turns JSON log lines into queued entries.
///
/// Each write must hold whole lines. A buffer with several newline-separated
/// lines queues one entry per line; if any line fails to parse, none are
/// queued. Blank buffers are accepted and ignored.
///
/// Every JSON object must sit on a single line. A pretty-printed object
/// spanning several lines is split at its newlines and rejected.
#[derive(Debug, Clone)]
pub struct LokiSink {
    pusher: Pusher,
}

impl LokiSink {
    pub(crate) fn new(pusher: Pusher) -> Self {
        Self { pusher }
    }

    /// Parse `buf` and queue its lines, waiting while the queue is full.
    ///
    /// Returns the number of bytes consumed, which is always `buf.len()` on
    /// success.
    pub async fn write_raw(&self, buf: &[u8]) -> Result<usize, SinkError> {
        for entry in parse_lines(buf)? {
            self.pusher.push(entry).await?;
        }
        Ok(buf.len())
    }

    /// Blocking variant of [`LokiSink::write_raw`] for synchronous callers.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_write_raw(&self, buf: &[u8]) -> Result<usize, SinkError> {
        for entry in parse_lines(buf)? {
            self.pusher.blocking_push(entry)?;
        }
        Ok(buf.len())
    }

    /// No-op; batches are flushed by the pusher's own size and time policy.
    pub fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// No-op; the pusher is stopped through [`Pusher::stop`].
    pub fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl io::Write for LokiSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.blocking_write_raw(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn parse_lines(buf: &[u8]) -> Result<Vec<LogEntry>, serde_json::Error> {
    let entries = buf
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(LogEntry::from_json_line)
        .collect::<Result<Vec<_>, _>>()?;

    trace!(lines = entries.len(), bytes = buf.len(), "Parsed sink write");
    Ok(entries)
}
