//! Error types using thiserror 2.0.
//!
//! Every failure the backend can produce is one variant of [`GrafanaError`].
//! Storage faults propagate to the host as hard errors; all other variants are
//! rendered as user-facing error responses.

use crate::credential::DecodeError;
use plugin_common::HostError;
use thiserror::Error;

/// Grafana Cloud backend errors.
#[derive(Error, Debug)]
pub enum GrafanaError {
    /// No root credential has been configured
    #[error("configuration does not exist. did you configure 'config/token'?")]
    NotConfigured,

    /// The stored root credential lacks required fields
    #[error("cannot rotate: incomplete configuration, missing {0}")]
    IncompleteConfig(String),

    /// Request fields failed validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Lease bookkeeping handed back by the host is unusable
    #[error("invalid lease: {0}")]
    InvalidLease(String),

    /// Root credential could not be decoded
    #[error("failed to decode token, please check that the token is valid: {0}")]
    Decode(#[from] DecodeError),

    /// Grafana Cloud rejected the request
    #[error("error returned from grafana cloud (status {status}) code: {code}, err: {message}")]
    UpstreamApi {
        /// HTTP status
        status: u16,
        /// Upstream error code
        code: String,
        /// Upstream error message
        message: String,
    },

    /// Grafana Cloud could not be reached
    #[error("grafana cloud unreachable: {0}")]
    Transport(String),

    /// Grafana Cloud answered with a body we could not understand
    #[error("unexpected response from grafana cloud: {0}")]
    InvalidResponse(String),

    /// Upstream record does not exist
    #[error("{kind} '{id}' not found in grafana cloud")]
    NotFound {
        /// Record kind
        kind: &'static str,
        /// Identifier looked up
        id: String,
    },

    /// A by-name lookup did not yield exactly one record
    #[error("found an unexpected number of tokens with name '{name}': {count}")]
    AmbiguousLookup {
        /// Name looked up
        name: String,
        /// Number of matches
        count: usize,
    },

    /// The root credential lacks admin scopes
    #[error("token '{name}' is missing required admin scopes: {missing}")]
    NotAdmin {
        /// Token name
        name: String,
        /// Comma separated missing scopes
        missing: String,
    },

    /// Host refused to compute a lease TTL
    #[error("failed to calculate ttl: {0}")]
    Lease(#[source] HostError),

    /// Backing storage failed
    #[error("storage fault: {0}")]
    Storage(#[source] HostError),

    /// Backend settings are invalid
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// Result type for backend operations.
pub type GrafanaResult<T> = Result<T, GrafanaError>;

impl From<HostError> for GrafanaError {
    fn from(err: HostError) -> Self {
        if err.is_fault() {
            return Self::Storage(err);
        }
        match err {
            HostError::PastMaxTtl | HostError::ZeroTtl => Self::Lease(err),
            HostError::InvalidCredential(msg) => Self::InvalidRequest(msg),
            HostError::HttpClient(msg) | HostError::InvalidConfig(msg) => Self::InvalidSettings(msg),
            HostError::Storage(_) | HostError::Serialization(_) => Self::Storage(err),
        }
    }
}

impl From<reqwest::Error> for GrafanaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.without_url().to_string())
        } else {
            Self::Transport(err.without_url().to_string())
        }
    }
}

impl GrafanaError {
    /// Whether the error is shown to the caller as an operational failure.
    ///
    /// Storage faults are the only errors that abort the request.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }

    /// Whether the upstream reported the record as absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an invalid lease error.
    #[must_use]
    pub fn invalid_lease(msg: impl Into<String>) -> Self {
        Self::InvalidLease(msg.into())
    }

    /// Create an upstream API error.
    #[must_use]
    pub fn upstream(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamApi {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
