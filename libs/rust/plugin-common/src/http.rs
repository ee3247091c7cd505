//! HTTP client configuration and building for upstream APIs.
//!
//! Clients are built per request from freshly read credentials, so nothing
//! here caches connections or handles across requests.

use crate::error::{HostError, HostResult};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout (default: 10s)
    pub timeout: Duration,
    /// Connection timeout (default: 5s)
    pub connect_timeout: Duration,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: concat!("secrets-plugin/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    /// Set request timeout. The connect timeout never exceeds it.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.connect_timeout = self.connect_timeout.min(timeout);
        self
    }

    /// Set user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Build an HTTP client that authenticates every request with `bearer`.
///
/// The `Authorization` header is marked sensitive so it never shows up in
/// debug output.
pub fn build_http_client(config: &HttpConfig, bearer: &SecretString) -> HostResult<Client> {
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", bearer.expose_secret()))
        .map_err(|_| {
            HostError::InvalidCredential("bearer token is not a valid header value".into())
        })?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth);

    ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .use_rustls_tls()
        .build()
        .map_err(|e| HostError::HttpClient(e.to_string()))
}
