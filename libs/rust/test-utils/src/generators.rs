//! Shared proptest generators.

use proptest::prelude::*;
use std::time::Duration;

/// Organisation identifiers.
pub fn org_strategy() -> impl Strategy<Value = String> {
    "[0-9]{1,9}"
}

/// Upstream token names.
pub fn token_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,30}[a-z0-9]"
}

/// Grafana Cloud regions.
pub fn region_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("prod-us-east-0".to_string()),
        Just("prod-eu-west-0".to_string()),
        Just("prod-ap-southeast-0".to_string()),
        "[a-z]{2,6}-[a-z]{2,6}-[0-9]",
    ]
}

/// Access policy names accepted by the backend.
pub fn policy_name_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_]([A-Za-z0-9_.@-]{0,20}[A-Za-z0-9_])?"
}

/// Key material.
pub fn key_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9+/=]{8,64}"
}

/// Lease TTLs between one second and thirty days.
pub fn ttl_strategy() -> impl Strategy<Value = Duration> {
    (1u64..=30 * 86400).prop_map(Duration::from_secs)
}
