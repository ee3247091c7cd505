//! Shared test utilities for the Grafana Cloud secrets backend.
//!
//! This crate provides:
//! - Proptest generators for credential and naming inputs
//! - A wiremock-backed fake of the Grafana Cloud API
//! - Test fixtures with sample tokens and API records

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::MockGrafanaCloud;
