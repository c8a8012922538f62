//! HTTP client module for delivering encoded batches to Loki.
//!
//! Delivery is a single attempt: any transport failure or non-204 response
//! is returned to the caller and the batch is not retried.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::auth::Authenticator;
use crate::config::Config;

/// Errors that can occur while delivering a batch.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed before a response was received
    #[error("failed to send request: {0}")]
    Request(#[from] reqwest::Error),

    /// Loki answered with something other than 204 No Content
    #[error("received unexpected response code from Loki ({code}): {message}")]
    Status { code: StatusCode, message: String },

    /// Client configuration error
    #[error("client configuration error: {0}")]
    Config(String),
}

/// HTTP client for the Loki push endpoint.
///
/// The underlying `reqwest::Client` is built once and reused so connections
/// are pooled across batches.
#[derive(Debug, Clone)]
pub struct LokiClient {
    client: Client,
    push_url: String,
    auth: Option<Arc<dyn Authenticator>>,
}

impl LokiClient {
    /// Create a client for the push URL and authenticator in `config`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let mut builder = Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90));

        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Self {
            client,
            push_url: config.push_url(),
            auth: config.auth.clone(),
        })
    }

    /// POST one gzip-compressed JSON body.
    pub async fn send(&self, body: Vec<u8>) -> Result<(), ClientError> {
        let body_len = body.len();

        let mut request = self
            .client
            .post(&self.push_url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(body);

        if let Some(auth) = &self.auth {
            request = auth.apply(request);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            debug!(bytes = body_len, url = %self.push_url, "Batch delivered");
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(ClientError::Status {
            code: status,
            message: message.trim().to_string(),
        })
    }

    /// Get the configured push URL.
    pub fn push_url(&self) -> &str {
        &self.push_url
    }
}
