//! Access policy administration.
//!
//! Each named policy is mirrored locally under `access_policies/<name>` with
//! the upstream record it maps to, so issuance can resolve a name to an
//! upstream policy ID without a round trip.

use crate::{
    client::GrafanaCloudClient,
    config::BackendSettings,
    error::{GrafanaError, GrafanaResult},
    models::{AccessPolicy, AccessPolicySpec},
    root_config::ConfigStore,
};
use plugin_common::{Storage, StorageEntry};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, instrument};

/// Storage prefix of mirrored access policies.
pub const ACCESS_POLICY_PREFIX: &str = "access_policies/";

static POLICY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w(([\w.@-]+)?\w)?$").unwrap_or_else(|e| unreachable!("invalid pattern: {e}"))
});

/// Check a policy name against the allowed pattern.
pub fn validate_policy_name(name: &str) -> GrafanaResult<()> {
    if POLICY_NAME.is_match(name) {
        Ok(())
    } else {
        Err(GrafanaError::invalid_request(format!(
            "invalid access policy name '{name}'"
        )))
    }
}

/// Local mirror of access policies.
pub struct AccessPolicyStore<'a> {
    storage: &'a dyn Storage,
}

impl<'a> AccessPolicyStore<'a> {
    /// Wrap host storage.
    #[must_use]
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    /// Read a mirrored policy.
    pub async fn read(&self, name: &str) -> GrafanaResult<Option<AccessPolicy>> {
        match self.storage.get(&key(name)).await? {
            Some(entry) => Ok(Some(entry.decode_json()?)),
            None => Ok(None),
        }
    }

    /// Read a mirrored policy, failing when it does not exist.
    pub async fn require(&self, name: &str) -> GrafanaResult<AccessPolicy> {
        self.read(name).await?.ok_or_else(|| {
            GrafanaError::invalid_request(format!("access policy '{name}' does not exist"))
        })
    }

    /// Store a policy.
    pub async fn write(&self, name: &str, policy: &AccessPolicy) -> GrafanaResult<()> {
        self.storage
            .put(StorageEntry::json(key(name), policy)?)
            .await?;
        Ok(())
    }

    /// Drop a policy from the mirror.
    pub async fn delete(&self, name: &str) -> GrafanaResult<()> {
        self.storage.delete(&key(name)).await?;
        Ok(())
    }

    /// Names of all mirrored policies, sorted.
    pub async fn list(&self) -> GrafanaResult<Vec<String>> {
        Ok(self.storage.list(ACCESS_POLICY_PREFIX).await?)
    }
}

fn key(name: &str) -> String {
    format!("{ACCESS_POLICY_PREFIX}{name}")
}

/// Create the policy upstream, or update it when it is already mirrored.
///
/// The upstream policy always carries the local name; the display name
/// defaults to it.
#[instrument(skip(storage, settings, spec))]
pub async fn write_access_policy(
    storage: &dyn Storage,
    settings: &BackendSettings,
    name: &str,
    mut spec: AccessPolicySpec,
) -> GrafanaResult<AccessPolicy> {
    validate_policy_name(name)?;
    if spec.scopes.is_empty() {
        return Err(GrafanaError::invalid_request(
            "access policy must grant at least one scope",
        ));
    }
    name.clone_into(&mut spec.name);
    if spec.display_name.is_empty() {
        name.clone_into(&mut spec.display_name);
    }

    let config = ConfigStore::new(storage).require().await?;
    let client = GrafanaCloudClient::new(&config.token, settings)?;
    let store = AccessPolicyStore::new(storage);

    let policy = match store.read(name).await? {
        Some(existing) => client.update_access_policy(&existing.id, &spec).await?,
        None => client.create_access_policy(&spec).await?,
    };
    store.write(name, &policy).await?;

    info!(policy = %name, policy_id = %policy.id, "Stored access policy");
    Ok(policy)
}

/// Delete the policy upstream, then locally.
///
/// Returns the removed record, or `None` when nothing was mirrored.
#[instrument(skip(storage, settings))]
pub async fn delete_access_policy(
    storage: &dyn Storage,
    settings: &BackendSettings,
    name: &str,
) -> GrafanaResult<Option<AccessPolicy>> {
    let store = AccessPolicyStore::new(storage);
    let Some(policy) = store.read(name).await? else {
        return Ok(None);
    };

    let config = ConfigStore::new(storage).require().await?;
    let client = GrafanaCloudClient::new(&config.token, settings)?;
    client.delete_access_policy(&policy.id).await?;
    store.delete(name).await?;

    info!(policy = %name, policy_id = %policy.id, "Deleted access policy");
    Ok(Some(policy))
}
