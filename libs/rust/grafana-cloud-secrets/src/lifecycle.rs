//! Renew and revoke handlers for issued tokens.

use crate::{
    client::GrafanaCloudClient,
    config::BackendSettings,
    error::{GrafanaError, GrafanaResult},
    lease_policy::LeasePolicy,
    root_config::ConfigStore,
};
use chrono::{DateTime, Utc};
use plugin_common::{Lease, Storage, SystemView, lease::expiry_after};
use tracing::{info, instrument};

fn required<'l>(lease: &'l Lease, key: &str) -> GrafanaResult<&'l str> {
    lease
        .internal_str(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GrafanaError::invalid_lease(format!("{key} is missing on the lease")))
}

/// Extend a token's upstream expiry.
///
/// The TTL is recomputed against the lease's original issue time, so the
/// max TTL window is never extended. Once clamped, the lease stops being
/// renewable.
#[instrument(skip_all, fields(token_id = tracing::field::Empty))]
pub async fn renew_token(
    storage: &dyn Storage,
    settings: &BackendSettings,
    system: &SystemView,
    lease: &Lease,
    now: DateTime<Utc>,
) -> GrafanaResult<Lease> {
    let id = required(lease, "id")?;
    tracing::Span::current().record("token_id", id);

    let config = ConfigStore::new(storage).require().await?;
    let ttl = LeasePolicy::new(storage, system)
        .effective_ttl(Some(lease.issue_time), now)
        .await?;
    let client = GrafanaCloudClient::new(&config.token, settings)?;

    client
        .update_token_expiry(id, expiry_after(now, ttl.ttl)?)
        .await?;

    info!(ttl_secs = ttl.ttl.as_secs(), clamped = ttl.clamped, "Renewed grafana cloud token");
    Ok(lease
        .clone()
        .with_ttl(ttl.ttl, ttl.max_ttl)
        .with_renewable(!ttl.clamped))
}

/// Delete a token upstream. A token that is already gone counts as revoked.
#[instrument(skip_all)]
pub async fn revoke_token(
    storage: &dyn Storage,
    settings: &BackendSettings,
    lease: &Lease,
) -> GrafanaResult<()> {
    let id = required(lease, "id")?;
    let name = required(lease, "name")?;

    let config = ConfigStore::new(storage).require().await?;
    let client = GrafanaCloudClient::new(&config.token, settings)?;

    info!(token_id = %id, token_name = %name, "Revoking grafana cloud token");
    client.delete_token(id).await
}
