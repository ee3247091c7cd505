//! Root credential configuration store.
//!
//! Exactly one logical slot holds the administrator credential. Only this
//! module persists it; every operation reads it fresh from host storage.

use crate::{
    client::GrafanaCloudClient,
    config::BackendSettings,
    credential,
    error::{GrafanaError, GrafanaResult},
    models::secret_string,
};
use plugin_common::{Storage, StorageEntry};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, info, instrument};

/// Storage key of the root credential slot.
pub const CONFIG_TOKEN_KEY: &str = "config/token";

/// Scopes a root credential's access policy must grant.
pub const ADMIN_SCOPES: [&str; 3] = [
    "accesspolicies:read",
    "accesspolicies:write",
    "accesspolicies:delete",
];

/// The active administrator credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCredentialConfig {
    /// Opaque root token
    #[serde(with = "secret_string")]
    pub token: SecretString,
    /// Upstream ID of the root token
    #[serde(default)]
    pub token_id: String,
    /// Access policy the root token belongs to
    #[serde(default)]
    pub access_policy_id: String,
    /// Organisation embedded in the token
    #[serde(default)]
    pub org: String,
    /// Region embedded in the token
    #[serde(default)]
    pub region: String,
    /// Upstream token name
    #[serde(default)]
    pub name: String,
}

impl RootCredentialConfig {
    /// Names of required fields that are empty.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        use secrecy::ExposeSecret;

        let mut missing = Vec::new();
        if self.token.expose_secret().is_empty() {
            missing.push("token");
        }
        if self.token_id.is_empty() {
            missing.push("token_id");
        }
        if self.access_policy_id.is_empty() {
            missing.push("access_policy_id");
        }
        missing
    }

    /// Whether every required field is set.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Non-secret view returned by reads.
    #[must_use]
    pub fn public_data(&self) -> Map<String, Value> {
        let value = json!({
            "token_id": self.token_id,
            "access_policy_id": self.access_policy_id,
            "org": self.org,
            "region": self.region,
            "name": self.name,
        });
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Read/write access to the root credential slot.
pub struct ConfigStore<'a> {
    storage: &'a dyn Storage,
}

impl<'a> ConfigStore<'a> {
    /// Wrap host storage.
    #[must_use]
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    /// Read the slot, `None` when nothing is configured.
    pub async fn read(&self) -> GrafanaResult<Option<RootCredentialConfig>> {
        match self.storage.get(CONFIG_TOKEN_KEY).await? {
            Some(entry) => Ok(Some(entry.decode_json()?)),
            None => Ok(None),
        }
    }

    /// Read the slot, failing with "not configured" when empty.
    pub async fn require(&self) -> GrafanaResult<RootCredentialConfig> {
        self.read().await?.ok_or(GrafanaError::NotConfigured)
    }

    /// Replace the slot.
    pub async fn write(&self, config: &RootCredentialConfig) -> GrafanaResult<()> {
        self.storage
            .put(StorageEntry::json(CONFIG_TOKEN_KEY, config)?)
            .await?;
        Ok(())
    }

    /// Clear the slot.
    pub async fn delete(&self) -> GrafanaResult<()> {
        self.storage.delete(CONFIG_TOKEN_KEY).await?;
        Ok(())
    }
}

/// Configure the root credential.
///
/// The token is trimmed and decoded before anything is written. It is then persisted,
/// read back, authenticated upstream, and checked for admin scopes. Any
/// failure after the first write restores the previous slot contents.
#[instrument(skip_all)]
pub async fn configure(
    storage: &dyn Storage,
    settings: &BackendSettings,
    token: SecretString,
) -> GrafanaResult<RootCredentialConfig> {
    use secrecy::ExposeSecret;

    let token = SecretString::from(token.expose_secret().trim().to_owned());
    let decoded = credential::decode(token.expose_secret())?;
    let store = ConfigStore::new(storage);
    let previous = store.read().await?;

    store
        .write(&RootCredentialConfig {
            token,
            token_id: String::new(),
            access_policy_id: String::new(),
            org: decoded.org,
            region: decoded.region,
            name: decoded.name,
        })
        .await?;

    match verify_and_complete(&store, settings).await {
        Ok(config) => {
            info!(
                token_id = %config.token_id,
                access_policy_id = %config.access_policy_id,
                "Configured root credential"
            );
            Ok(config)
        }
        Err(err) => {
            let restored = match &previous {
                Some(config) => store.write(config).await,
                None => store.delete().await,
            };
            if let Err(rollback) = restored {
                error!(error = %rollback, "Failed to roll back root credential configuration");
                return Err(rollback);
            }
            Err(err)
        }
    }
}

async fn verify_and_complete(
    store: &ConfigStore<'_>,
    settings: &BackendSettings,
) -> GrafanaResult<RootCredentialConfig> {
    let mut config = store.require().await?;
    let (client, record) = GrafanaCloudClient::authenticate(&config.token, settings).await?;

    let policy = client.get_access_policy(&record.access_policy_id).await?;
    let missing: Vec<&str> = ADMIN_SCOPES
        .iter()
        .copied()
        .filter(|scope| !policy.scopes.iter().any(|s| s == scope))
        .collect();
    if !missing.is_empty() {
        return Err(GrafanaError::NotAdmin {
            name: record.name,
            missing: missing.join(","),
        });
    }

    config.token_id = record.id;
    config.access_policy_id = record.access_policy_id;
    store.write(&config).await?;
    Ok(config)
}
