//! Grafana Cloud secrets backend.
//!
//! Brokers short-lived Grafana Cloud access policy tokens on behalf of a
//! secrets-management host. One administrator credential is configured per
//! mount; consumers ask for a token bound to a named access policy and get
//! back a leased credential the host renews and revokes.
//!
//! The host supplies storage, request dispatch, and lease tracking through
//! the contracts in `plugin_common`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod access_policies;
pub mod backend;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod issuance;
pub mod lease_policy;
pub mod lifecycle;
pub mod models;
pub mod root_config;
pub mod rotation;

pub use backend::GrafanaCloudBackend;
pub use client::GrafanaCloudClient;
pub use config::BackendSettings;
pub use error::{GrafanaError, GrafanaResult};
pub use lease_policy::{LeaseConfig, LeasePolicy};
pub use root_config::{ConfigStore, RootCredentialConfig};
pub use rotation::{RotatedCredential, RotationOutcome};
