//! Environment-driven configuration helpers.

use crate::error::{HostError, HostResult};
use std::env;

/// Load a `.env` file when one is present. Missing files are ignored.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Parse environment variable with default value.
pub fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> HostResult<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| HostError::invalid_config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Read an environment variable, falling back to `default`.
#[must_use]
pub fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}
