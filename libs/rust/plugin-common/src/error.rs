//! Error types for host collaborator operations.
//!
//! Storage and serialization failures indicate the backing store itself is
//! broken and are treated as faults by plugins. TTL errors are the host's
//! lease-calculation refusals and are surfaced to callers.

use thiserror::Error;

/// Errors raised by host-side collaborators.
#[derive(Error, Debug)]
pub enum HostError {
    /// Backing storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The lease window has already been exhausted
    #[error("past the max TTL, cannot renew")]
    PastMaxTtl,

    /// The computed TTL would expire immediately
    #[error("computed TTL is zero, refusing to issue an already expired lease")]
    ZeroTtl,

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Credential cannot be sent as a request header
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Environment configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for host collaborator operations.
pub type HostResult<T> = Result<T, HostError>;

impl HostError {
    /// Check if this error is a storage fault.
    ///
    /// Faults abort the request instead of being rendered as a user-facing
    /// error response.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Serialization(_))
    }

    /// Create a storage error with the given message.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid configuration error with the given message.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
