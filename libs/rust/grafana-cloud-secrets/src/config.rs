//! Backend settings.

use crate::error::{GrafanaError, GrafanaResult};
use plugin_common::HttpConfig;
use plugin_common::env::{env_or, load_dotenv, parse_env};
use std::time::Duration;
use url::Url;

/// Default Grafana Cloud API endpoint.
pub const DEFAULT_API_URL: &str = "https://grafana.com/api/v1";

/// Backend settings.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Grafana Cloud API base URL
    pub api_url: Url,
    /// Upstream request timeout
    pub timeout: Duration,
    /// Prefix of every token name this backend mints
    pub token_name_prefix: String,
    /// Lifetime of rotated root credentials
    pub root_token_ttl: Duration,
    /// User agent sent upstream
    pub user_agent: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout: Duration::from_secs(10),
            token_name_prefix: "vault".to_string(),
            root_token_ttl: Duration::from_secs(365 * 86400),
            user_agent: concat!("grafana-cloud-secrets/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl BackendSettings {
    /// Load settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but invalid.
    pub fn from_env() -> GrafanaResult<Self> {
        load_dotenv();
        let defaults = Self::default();

        let api_url = Url::parse(&env_or("GRAFANA_CLOUD_API_URL", DEFAULT_API_URL))
            .map_err(|e| GrafanaError::InvalidSettings(format!("Invalid GRAFANA_CLOUD_API_URL: {e}")))?;
        let timeout = Duration::from_secs(parse_env(
            "GRAFANA_CLOUD_TIMEOUT_SECS",
            defaults.timeout.as_secs(),
        )?);
        let token_name_prefix =
            env_or("GRAFANA_CLOUD_TOKEN_PREFIX", &defaults.token_name_prefix).to_lowercase();
        let root_token_ttl = Duration::from_secs(parse_env(
            "GRAFANA_CLOUD_ROOT_TOKEN_TTL_SECS",
            defaults.root_token_ttl.as_secs(),
        )?);

        let settings = Self {
            api_url,
            timeout,
            token_name_prefix,
            root_token_ttl,
            ..defaults
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check invariants between fields.
    pub fn validate(&self) -> GrafanaResult<()> {
        if self.timeout.is_zero() {
            return Err(GrafanaError::InvalidSettings("timeout must be positive".into()));
        }
        if self.root_token_ttl.is_zero() {
            return Err(GrafanaError::InvalidSettings(
                "root token TTL must be positive".into(),
            ));
        }
        if self.token_name_prefix.is_empty() {
            return Err(GrafanaError::InvalidSettings(
                "token name prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Set API base URL.
    #[must_use]
    pub fn with_api_url(mut self, api_url: Url) -> Self {
        self.api_url = api_url;
        self
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set root token lifetime.
    #[must_use]
    pub const fn with_root_token_ttl(mut self, ttl: Duration) -> Self {
        self.root_token_ttl = ttl;
        self
    }

    /// Set the token name prefix.
    #[must_use]
    pub fn with_token_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.token_name_prefix = prefix.into().to_lowercase();
        self
    }

    /// HTTP settings for upstream clients.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::default()
            .with_timeout(self.timeout)
            .with_user_agent(self.user_agent.clone())
    }

    /// Endpoint URL for an API path such as `tokens/abc`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn default_api_url() -> Url {
    // DEFAULT_API_URL is a valid literal.
    Url::parse(DEFAULT_API_URL).unwrap_or_else(|_| unreachable!("default API URL is valid"))
}
