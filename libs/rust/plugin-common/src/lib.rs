//! Host collaborator contracts shared by secrets-engine plugins.
//!
//! This crate provides:
//! - Key-value storage contract and an in-memory implementation
//! - Request, response, and lease envelopes
//! - The host's TTL calculation rules
//! - HTTP client building for upstream APIs
//! - Tracing initialization and environment helpers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod http;
pub mod lease;
pub mod request;
pub mod storage;
pub mod tracing_config;

pub use error::{HostError, HostResult};
pub use http::{HttpConfig, build_http_client};
pub use lease::{Lease, SystemView, TtlCalculation, calculate_ttl};
pub use request::{Operation, Request, Response};
pub use storage::{InMemoryStorage, Storage, StorageEntry};
pub use tracing_config::{TracingConfig, init_tracing};
