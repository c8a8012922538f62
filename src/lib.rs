//! Loki Pusher Library
//!
//! Buffers structured log records and ships them, batched and gzip-compressed,
//! to a Loki push endpoint:
//!
//! - **entry**: the queued log line and JSON-line parsing
//! - **auth**: request authenticators (basic auth, API key header)
//! - **encoder**: label-grouped stream payloads, JSON + gzip
//! - **client**: single-attempt HTTP delivery
//! - **pusher**: bounded ingestion queue and the size/time batching worker
//! - **sink**: byte-stream writer for pre-serialized JSON lines
//! - **config**: pusher settings and environment loading
//!
//! Delivery is best effort: a batch that fails to encode or send is logged
//! and dropped.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::time::Duration;
//!
//! use loki_pusher::{BasicAuthenticator, Config, Pusher};
//!
//! #[tokio::main]
//! async fn main() {
//!     let labels = BTreeMap::from([
//!         ("app".to_string(), "checkout".to_string()),
//!         ("env".to_string(), "prod".to_string()),
//!     ]);
//!
//!     let config = Config::new("https://logs.example.com", labels)
//!         .with_batch_max_size(500)
//!         .with_batch_max_wait(Duration::from_secs(2))
//!         .with_auth(BasicAuthenticator::new("tenant", "secret"));
//!
//!     let pusher = Pusher::start(config).expect("Failed to start pusher");
//!
//!     // Structured hook
//!     pusher
//!         .push_structured("info", "order placed", chrono::Utc::now(), Some("orders.rs:42".into()))
//!         .await
//!         .ok();
//!
//!     // Pre-serialized JSON lines
//!     let sink = pusher.sink();
//!     sink.write_raw(br#"{"level":"warn","msg":"slow query"}"#).await.ok();
//!
//!     pusher.stop().await;
//! }
//! ```

// Module declarations
pub mod auth;
pub mod client;
pub mod config;
pub mod encoder;
pub mod entry;
pub mod pusher;
pub mod sink;

// Re-export commonly used types at crate root for convenience
pub use auth::{ApiKeyAuthenticator, Authenticator, BasicAuthenticator};
pub use client::{ClientError, LokiClient};
pub use config::{Config, ConfigError};
pub use encoder::{EncodeError, PushRequest, Stream};
pub use entry::LogEntry;
pub use pusher::{FlushError, FlushTrigger, PushError, Pusher, PusherError, PusherStats};
pub use sink::{LokiSink, SinkError};
