//! Configuration module for the Loki pusher.
//!
//! A [`Config`] is normally built in code by the embedding application and
//! handed to [`Pusher::start`](crate::pusher::Pusher::start). The binary
//! loads one from the environment with [`Config::from_env`].

use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{ApiKeyAuthenticator, Authenticator, BasicAuthenticator};

/// Path of the Loki push API, appended to the base URL.
pub const PUSH_PATH: &str = "/loki/api/v1/push";

/// Default API URL for a local Loki instance
const DEFAULT_URL: &str = "http://localhost:3100";

/// Default batch size (number of entries per push)
const DEFAULT_BATCH_MAX_SIZE: usize = 100;

/// Default time before a partial batch is flushed
const DEFAULT_BATCH_MAX_WAIT: Duration = Duration::from_secs(5);

/// Default ingestion queue capacity
const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Maximum allowed batch size to prevent memory issues
const MAX_BATCH_SIZE: usize = 10_000;

/// Configuration for a [`Pusher`](crate::pusher::Pusher).
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Loki server
    pub url: String,

    /// Labels attached to every stream sent by this pusher
    pub labels: BTreeMap<String, String>,

    /// Number of entries that triggers an immediate flush
    pub batch_max_size: usize,

    /// Interval at which a partial batch is flushed
    pub batch_max_wait: Duration,

    /// Capacity of the ingestion queue; producers block when it is full
    pub queue_capacity: usize,

    /// Per-request timeout. `None` leaves requests unbounded.
    pub request_timeout: Option<Duration>,

    /// Optional request authentication
    pub auth: Option<Arc<dyn Authenticator>>,
}

/// Error type for configuration failures.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: None,
        }
    }

    fn for_var(env_var: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: Some(env_var.to_string()),
        }
    }
}

impl Config {
    /// Full URL of the push endpoint, derived from `url`.
    pub fn push_url(&self) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), PUSH_PATH)
    }

    /// Create a configuration for the given base URL and label set, with
    /// default batching settings.
    pub fn new(url: impl AsRef<str>, labels: BTreeMap<String, String>) -> Self {
        let url = url.as_ref().trim_end_matches('/').to_string();

        Self {
            url,
            labels,
            batch_max_size: DEFAULT_BATCH_MAX_SIZE,
            batch_max_wait: DEFAULT_BATCH_MAX_WAIT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            request_timeout: None,
            auth: None,
        }
    }

    pub fn with_batch_max_size(mut self, batch_max_size: usize) -> Self {
        self.batch_max_size = batch_max_size;
        self
    }

    pub fn with_batch_max_wait(mut self, batch_max_wait: Duration) -> Self {
        self.batch_max_wait = batch_max_wait;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_auth(mut self, auth: impl Authenticator + 'static) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    /// Check that the settings describe a usable pusher.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::new(format!(
                "url '{}' must start with http:// or https://",
                self.url
            )));
        }

        if self.batch_max_size == 0 {
            return Err(ConfigError::new("batch max size must be greater than 0"));
        }

        if self.batch_max_size > MAX_BATCH_SIZE {
            return Err(ConfigError::new(format!(
                "batch max size {} exceeds maximum allowed ({})",
                self.batch_max_size, MAX_BATCH_SIZE
            )));
        }

        if self.batch_max_wait.is_zero() {
            return Err(ConfigError::new("batch max wait must be greater than 0"));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::new("queue capacity must be greater than 0"));
        }

        Ok(())
    }

    /// Load configuration from environment variables.
    ///
    /// - `LOKI_PUSHER_URL`: Loki base URL (default: http://localhost:3100)
    /// - `LOKI_PUSHER_LABELS`: comma separated `key=value` pairs
    /// - `LOKI_PUSHER_BATCH_MAX_SIZE`: entries per batch (default: 100)
    /// - `LOKI_PUSHER_BATCH_MAX_WAIT_MS`: flush interval (default: 5000)
    /// - `LOKI_PUSHER_QUEUE_CAPACITY`: ingestion queue size (default: 100)
    /// - `LOKI_PUSHER_REQUEST_TIMEOUT_SECS`: HTTP timeout (default: none)
    /// - `LOKI_PUSHER_USERNAME` / `LOKI_PUSHER_PASSWORD`: basic auth
    /// - `LOKI_PUSHER_API_KEY_HEADER` / `LOKI_PUSHER_API_KEY`: API key auth
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable cannot be parsed or the resulting
    /// configuration fails [`Config::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("LOKI_PUSHER_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());

        let labels = match env::var("LOKI_PUSHER_LABELS") {
            Ok(value) => parse_labels(&value)
                .map_err(|message| ConfigError::for_var("LOKI_PUSHER_LABELS", message))?,
            Err(_) => BTreeMap::new(),
        };

        let mut config = Self::new(url, labels);

        if let Some(size) = parse_var::<usize>("LOKI_PUSHER_BATCH_MAX_SIZE")? {
            config.batch_max_size = size;
        }

        if let Some(ms) = parse_var::<u64>("LOKI_PUSHER_BATCH_MAX_WAIT_MS")? {
            config.batch_max_wait = Duration::from_millis(ms);
        }

        if let Some(capacity) = parse_var::<usize>("LOKI_PUSHER_QUEUE_CAPACITY")? {
            config.queue_capacity = capacity;
        }

        if let Some(secs) = parse_var::<u64>("LOKI_PUSHER_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Some(Duration::from_secs(secs));
        }

        config.auth = auth_from_env()?;

        config.validate()?;
        Ok(config)
    }
}

/// Parse an optional numeric environment variable.
fn parse_var<T: std::str::FromStr>(env_var: &str) -> Result<Option<T>, ConfigError> {
    match env::var(env_var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::for_var(env_var, format!("'{}' is not a valid number", value))),
        Err(_) => Ok(None),
    }
}

fn auth_from_env() -> Result<Option<Arc<dyn Authenticator>>, ConfigError> {
    let username = env::var("LOKI_PUSHER_USERNAME").ok();
    let password = env::var("LOKI_PUSHER_PASSWORD").ok();
    let key_name = env::var("LOKI_PUSHER_API_KEY_HEADER").ok();
    let api_key = env::var("LOKI_PUSHER_API_KEY").ok();

    match (username, password, key_name, api_key) {
        (None, None, None, None) => Ok(None),
        (Some(username), Some(password), None, None) => {
            Ok(Some(Arc::new(BasicAuthenticator::new(username, password))))
        }
        (None, None, Some(key_name), Some(api_key)) => {
            Ok(Some(Arc::new(ApiKeyAuthenticator::new(key_name, api_key))))
        }
        (Some(_), None, _, _) | (None, Some(_), _, _) => Err(ConfigError::for_var(
            "LOKI_PUSHER_PASSWORD",
            "username and password must be set together",
        )),
        (None, None, _, _) => Err(ConfigError::for_var(
            "LOKI_PUSHER_API_KEY",
            "api key header and api key must be set together",
        )),
        _ => Err(ConfigError::new(
            "basic auth and api key auth cannot both be configured",
        )),
    }
}

/// Parse `key=value,key=value` into a label set.
fn parse_labels(value: &str) -> Result<BTreeMap<String, String>, String> {
    let mut labels = BTreeMap::new();

    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, val) = pair
            .split_once('=')
            .ok_or_else(|| format!("label '{}' is not in key=value form", pair))?;

        let key = key.trim();
        if key.is_empty() {
            return Err(format!("label '{}' has an empty name", pair));
        }

        labels.insert(key.to_string(), val.trim().to_string());
    }

    Ok(labels)
}
