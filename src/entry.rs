//! Log entry module.
//!
//! A [`LogEntry`] is one log line ready for shipment. Entries come either from
//! the structured hook (level, message, timestamp and caller supplied directly)
//! or from the byte-stream sink, which parses a pre-serialized JSON line and
//! keeps the original text so it can be shipped verbatim.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// A single log line queued for delivery.
///
/// Entries are immutable once queued.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Log severity level, as named by the producing front-end
    pub level: String,

    /// Log message content
    pub message: String,

    /// Time the line was produced (or ingested, for the byte-stream path)
    pub timestamp: DateTime<Utc>,

    /// Source location of the log call, if known
    pub caller: Option<String>,

    /// Original serialized line, shipped verbatim when present
    pub raw: Option<String>,
}

/// Shape of a JSON log line as written by structured front-ends.
///
/// Every field is optional and `null` counts as missing. The line's own
/// `ts` is not parsed since it is replaced by the ingestion time.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonLine {
    level: Option<String>,
    #[serde(alias = "message")]
    msg: Option<String>,
    caller: Option<String>,
}

/// Serialized form used as the line value for entries without `raw`.
#[derive(Serialize)]
struct LineRef<'a> {
    level: &'a str,
    ts: f64,
    msg: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    caller: Option<&'a str>,
}

impl LogEntry {
    /// Create a new structured entry.
    pub fn new(
        level: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            timestamp,
            caller: None,
            raw: None,
        }
    }

    /// Attach a caller / source location.
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// Parse one JSON-encoded log line.
    ///
    /// The original bytes (minus any trailing line break) are kept as `raw`
    /// and the timestamp is stamped with the ingestion time; whatever `ts`
    /// the line carries travels inside `raw`.
    pub fn from_json_line(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        // Only objects are log records; a derived struct would also accept arrays.
        let object: Map<String, Value> = serde_json::from_slice(bytes)?;
        let parsed: JsonLine = serde_json::from_value(Value::Object(object))?;

        let raw = String::from_utf8_lossy(bytes);
        let raw = raw.trim_end_matches(['\n', '\r']).to_string();

        Ok(Self {
            level: parsed.level.unwrap_or_default(),
            message: parsed.msg.unwrap_or_default(),
            timestamp: Utc::now(),
            caller: parsed.caller,
            raw: Some(raw),
        })
    }

    /// Timestamp as a decimal string of nanoseconds since the Unix epoch.
    pub fn timestamp_nanos(&self) -> String {
        match self.timestamp.timestamp_nanos_opt() {
            Some(nanos) => nanos.to_string(),
            None => {
                warn!(
                    timestamp = %self.timestamp,
                    "Timestamp outside nanosecond range, sending 0"
                );
                "0".to_string()
            }
        }
    }

    /// The line value sent on the wire.
    pub fn line(&self) -> Cow<'_, str> {
        if let Some(raw) = &self.raw {
            return Cow::Borrowed(raw.as_str());
        }

        let line = LineRef {
            level: &self.level,
            ts: self.timestamp.timestamp_micros() as f64 / 1_000_000.0,
            msg: &self.message,
            caller: self.caller.as_deref(),
        };

        // A struct of strings and a finite float always serializes.
        Cow::Owned(serde_json::to_string(&line).unwrap_or_default())
    }
}
