//! Batch encoder.
//!
//! Turns a batch of [`LogEntry`] values into the body of a Loki push request:
//! a single stream carrying the pusher's label set, JSON-serialized and then
//! gzip-compressed.

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::entry::LogEntry;

/// Body of `POST /loki/api/v1/push`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub streams: Vec<Stream>,
}

/// A label set plus its ordered `[timestamp_ns, line]` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub stream: BTreeMap<String, String>,
    pub values: Vec<[String; 2]>,
}

/// Errors that can occur while building a payload.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to marshal json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to gzip json: {0}")]
    Compress(#[from] std::io::Error),
}

/// Build the push request for one batch. Entry order is preserved.
pub fn build_request(batch: &[LogEntry], labels: &BTreeMap<String, String>) -> PushRequest {
    let values = batch
        .iter()
        .map(|entry| [entry.timestamp_nanos(), entry.line().into_owned()])
        .collect();

    PushRequest {
        streams: vec![Stream {
            stream: labels.clone(),
            values,
        }],
    }
}

/// Encode a batch into a gzip-compressed JSON body.
pub fn encode(batch: &[LogEntry], labels: &BTreeMap<String, String>) -> Result<Vec<u8>, EncodeError> {
    let request = build_request(batch, labels);
    let json = serde_json::to_vec(&request)?;

    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}
