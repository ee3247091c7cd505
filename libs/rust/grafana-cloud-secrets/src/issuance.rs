//! Token issuance.

use crate::{
    access_policies::AccessPolicyStore,
    client::GrafanaCloudClient,
    config::BackendSettings,
    error::{GrafanaError, GrafanaResult},
    lease_policy::LeasePolicy,
    models::CreateTokenRequest,
    root_config::ConfigStore,
};
use chrono::{DateTime, Utc};
use plugin_common::{Lease, Storage, SystemView, lease::expiry_after};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use tracing::{info, instrument};

/// Secret type registered for issued tokens.
pub const SECRET_TYPE_TOKEN: &str = "token";

/// Unique upstream name for a token issued under `policy`.
///
/// `{prefix}-{policy}-{unix nanos}`, lowercased.
#[must_use]
pub fn create_token_name(prefix: &str, policy: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        prefix.to_lowercase(),
        policy.to_lowercase(),
        unix_nanos(now)
    )
}

pub(crate) fn unix_nanos(now: DateTime<Utc>) -> i64 {
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000))
}

/// A freshly minted token and its lease.
#[derive(Debug)]
pub struct IssuedToken {
    /// Upstream token ID
    pub id: String,
    /// Access policy the token is bound to
    pub access_policy_id: String,
    /// Upstream token name
    pub name: String,
    /// Token secret, only ever returned here
    pub token: SecretString,
    /// Upstream expiry
    pub expires_at: DateTime<Utc>,
    /// Lease the host tracks for renew and revoke
    pub lease: Lease,
    /// TTL adjustments made by the host limits
    pub warnings: Vec<String>,
}

impl IssuedToken {
    /// Response payload, the only place the secret leaves the backend.
    #[must_use]
    pub fn response_data(&self) -> Map<String, Value> {
        let value = json!({
            "id": self.id,
            "access_policy_id": self.access_policy_id,
            "name": self.name,
            "token": self.token.expose_secret(),
            "expires_at": self.expires_at.to_rfc3339(),
        });
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Lease bookkeeping for an issued token. Never holds the secret.
#[must_use]
pub fn lease_internal_data(id: &str, name: &str, access_policy_id: &str) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("id".to_string(), Value::String(id.to_string()));
    data.insert("name".to_string(), Value::String(name.to_string()));
    data.insert(
        "access_policy_id".to_string(),
        Value::String(access_policy_id.to_string()),
    );
    data
}

/// Mint a token bound to the access policy stored as `policy_name`.
///
/// Fails before any upstream call when the backend is unconfigured or
/// the policy is unknown. Upstream errors are not retried.
#[instrument(skip(storage, settings, system, now))]
pub async fn issue_token(
    storage: &dyn Storage,
    settings: &BackendSettings,
    system: &SystemView,
    policy_name: &str,
    now: DateTime<Utc>,
) -> GrafanaResult<IssuedToken> {
    let config = ConfigStore::new(storage).require().await?;
    let policy = AccessPolicyStore::new(storage).require(policy_name).await?;
    let ttl = LeasePolicy::new(storage, system)
        .effective_ttl(None, now)
        .await?;
    let client = GrafanaCloudClient::new(&config.token, settings)?;

    let name = create_token_name(&settings.token_name_prefix, policy_name, now);
    let expires_at = expiry_after(now, ttl.ttl)?;

    info!(policy = %policy_name, token_name = %name, "Creating grafana cloud token");
    let record = client
        .create_token(&CreateTokenRequest {
            access_policy_id: policy.id.clone(),
            name: name.clone(),
            display_name: name,
            expires_at,
        })
        .await?;

    let token = record.token.ok_or_else(|| {
        GrafanaError::InvalidResponse(format!("token '{}' was created without a secret", record.id))
    })?;

    let lease = Lease::new(
        SECRET_TYPE_TOKEN,
        lease_internal_data(&record.id, &record.name, &record.access_policy_id),
        now,
    )
    .with_ttl(ttl.ttl, ttl.max_ttl)
    .with_renewable(!ttl.clamped);

    Ok(IssuedToken {
        id: record.id,
        access_policy_id: record.access_policy_id,
        name: record.name,
        token,
        expires_at: record.expires_at.unwrap_or(expires_at),
        lease,
        warnings: ttl.warnings,
    })
}
