//! Test fixtures with sample data.
//!
//! Records are plain JSON in the Grafana Cloud API's camelCase shape so they
//! can be served by the mock server or deserialized directly.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Value, json};

/// Scopes an administrator access policy grants.
pub const ADMIN_SCOPES: [&str; 3] = [
    "accesspolicies:read",
    "accesspolicies:write",
    "accesspolicies:delete",
];

/// Default region used by fixtures.
pub const REGION: &str = "prod-eu-west-0";

/// Build an access policy token for `org`, `name`, and `region`.
#[must_use]
pub fn root_token(org: &str, name: &str, region: &str) -> String {
    root_token_with_key(org, name, region, "secret-key")
}

/// Build an access policy token with explicit key material.
#[must_use]
pub fn root_token_with_key(org: &str, name: &str, region: &str, key: &str) -> String {
    let payload = json!({"o": org, "n": name, "k": key, "m": {"r": region}});
    format!("glc_{}", STANDARD.encode(payload.to_string()))
}

/// Build a token in the retired organisation-slug API key format.
#[must_use]
pub fn legacy_token() -> String {
    STANDARD.encode(json!({"k": "abc123", "n": "vault", "id": 42}).to_string())
}

/// Expiry one hour ahead of now.
#[must_use]
pub fn default_expiry() -> DateTime<Utc> {
    Utc::now() + TimeDelta::hours(1)
}

/// Token record without its secret, as returned by lookups.
#[must_use]
pub fn token_record_json(id: &str, name: &str, access_policy_id: &str) -> Value {
    json!({
        "id": id,
        "accessPolicyId": access_policy_id,
        "name": name,
        "displayName": name,
        "expiresAt": default_expiry().to_rfc3339(),
        "createdAt": "2024-01-01T00:00:00Z",
        "updatedAt": "2024-01-01T00:00:00Z"
    })
}

/// Token record including its one-time secret, as returned on create.
#[must_use]
pub fn created_token_json(id: &str, name: &str, access_policy_id: &str, token: &str) -> Value {
    let mut record = token_record_json(id, name, access_policy_id);
    record["token"] = Value::String(token.to_string());
    record
}

/// Access policy record.
#[must_use]
pub fn access_policy_json(id: &str, name: &str, scopes: &[&str]) -> Value {
    json!({
        "id": id,
        "orgId": "1",
        "name": name,
        "displayName": name,
        "scopes": scopes,
        "realms": [{"type": "org", "identifier": "1", "labelPolicies": []}],
        "conditions": {"allowedSubnets": []},
        "createdAt": "2024-01-01T00:00:00Z",
        "updatedAt": "2024-01-01T00:00:00Z"
    })
}

/// Upstream error body.
#[must_use]
pub fn api_error_json(code: &str, message: &str) -> Value {
    json!({"code": code, "message": message})
}
