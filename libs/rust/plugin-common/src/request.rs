//! Request and response envelopes exchanged with the host.

use crate::lease::Lease;
use serde_json::{Map, Value};

/// Operation requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read a path
    Read,
    /// Create a path
    Create,
    /// Update a path
    Update,
    /// Delete a path
    Delete,
    /// List keys under a path
    List,
    /// Renew a previously issued lease
    Renew,
    /// Revoke a previously issued lease
    Revoke,
}

impl Operation {
    /// Whether the operation writes data at its path.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

/// A request routed to a plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Requested operation
    pub operation: Operation,
    /// Path relative to the plugin mount
    pub path: String,
    /// Named request fields
    pub data: Map<String, Value>,
    /// Lease being renewed or revoked
    pub secret: Option<Lease>,
}

impl Request {
    /// Create a request without data.
    #[must_use]
    pub fn new(operation: Operation, path: impl Into<String>) -> Self {
        Self {
            operation,
            path: path.into(),
            data: Map::new(),
            secret: None,
        }
    }

    /// Attach request data. Non-object values are ignored.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data = map;
        }
        self
    }

    /// Attach the lease for renew and revoke.
    #[must_use]
    pub fn with_secret(mut self, lease: Lease) -> Self {
        self.secret = Some(lease);
        self
    }
}

/// A plugin response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    /// Response payload
    pub data: Map<String, Value>,
    /// Lease attached to a dynamically issued secret
    pub secret: Option<Lease>,
    /// Non-fatal notices for the caller
    pub warnings: Vec<String>,
}

impl Response {
    /// Response carrying only data.
    #[must_use]
    pub fn with_data(data: Map<String, Value>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// User-facing error response.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("error".to_string(), Value::String(message.into()));
        Self::with_data(data)
    }

    /// Response for a list operation.
    #[must_use]
    pub fn list(keys: Vec<String>) -> Self {
        let mut data = Map::new();
        data.insert(
            "keys".to_string(),
            Value::Array(keys.into_iter().map(Value::String).collect()),
        );
        Self::with_data(data)
    }

    /// Whether this is a user-facing error response.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.data.contains_key("error")
    }

    /// The error message, if this is an error response.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.data.get("error").and_then(Value::as_str)
    }

    /// Add a warning.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}
