//! Request authentication.
//!
//! An [`Authenticator`] attaches credentials to an outgoing push request.
//! New variants only need to implement the trait; the pusher and encoder are
//! unaware of them.

use std::fmt;

use reqwest::RequestBuilder;

/// Capability that decorates an outgoing request with credentials.
pub trait Authenticator: fmt::Debug + Send + Sync {
    /// Attach credentials to the request.
    fn apply(&self, request: RequestBuilder) -> RequestBuilder;
}

/// HTTP basic authentication.
#[derive(Clone)]
pub struct BasicAuthenticator {
    pub username: String,
    pub password: String,
}

impl BasicAuthenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthenticator")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Authenticator for BasicAuthenticator {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(&self.password))
    }
}

/// Fixed API key sent in a named header.
#[derive(Clone)]
pub struct ApiKeyAuthenticator {
    /// Header name, e.g. `X-API-Key`
    pub key_name: String,

    /// Header value
    pub api_key: String,
}

impl ApiKeyAuthenticator {
    pub fn new(key_name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            key_name: key_name.into(),
            api_key: api_key.into(),
        }
    }
}

impl fmt::Debug for ApiKeyAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyAuthenticator")
            .field("key_name", &self.key_name)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Authenticator for ApiKeyAuthenticator {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(self.key_name.as_str(), self.api_key.as_str())
    }
}
