//! Root credential rotation.
//!
//! Ordering is what keeps the mount from locking itself out: the
//! replacement is minted and persisted before the old credential is
//! deleted upstream. A failure before the persist leaves the previous
//! configuration untouched; a failure deleting the old credential leaves
//! the new one active and reports the orphan.

use crate::{
    client::GrafanaCloudClient,
    config::BackendSettings,
    credential,
    error::{GrafanaError, GrafanaResult},
    issuance::unix_nanos,
    models::CreateTokenRequest,
    root_config::{ConfigStore, RootCredentialConfig},
};
use chrono::{DateTime, Utc};
use plugin_common::{Storage, lease::expiry_after};
use secrecy::ExposeSecret;
use serde_json::{Map, Value, json};
use tracing::{error, info, instrument, warn};

/// Identifiers of the credential now in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedCredential {
    /// Upstream token ID
    pub token_id: String,
    /// Upstream token name
    pub name: String,
    /// Access policy of the token
    pub access_policy_id: String,
}

impl RotatedCredential {
    /// Response payload.
    #[must_use]
    pub fn response_data(&self) -> Map<String, Value> {
        let value = json!({
            "token_id": self.token_id,
            "name": self.name,
            "access_policy_id": self.access_policy_id,
        });
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// Result of a rotation that got as far as persisting the new credential.
#[derive(Debug)]
pub enum RotationOutcome {
    /// New credential active, old one deleted
    Rotated(RotatedCredential),
    /// New credential active, old one could not be deleted upstream
    RotatedWithOrphan {
        /// The credential now in use
        rotated: RotatedCredential,
        /// Old token left behind upstream
        orphan_token_id: String,
        /// Why the old token could not be deleted
        error: GrafanaError,
    },
}

impl RotationOutcome {
    /// The credential now in use.
    #[must_use]
    pub const fn rotated(&self) -> &RotatedCredential {
        match self {
            Self::Rotated(rotated) | Self::RotatedWithOrphan { rotated, .. } => rotated,
        }
    }
}

/// Name of a rotated root token.
#[must_use]
pub fn rotation_token_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}-plugin-conf-{}", prefix.to_lowercase(), unix_nanos(now))
}

/// Replace the root credential with a newly minted one.
#[instrument(skip_all)]
pub async fn rotate_root(
    storage: &dyn Storage,
    settings: &BackendSettings,
    now: DateTime<Utc>,
) -> GrafanaResult<RotationOutcome> {
    let store = ConfigStore::new(storage);
    let current = store.require().await?;
    let (client, _) = GrafanaCloudClient::authenticate(&current.token, settings).await?;

    let missing = current.missing_fields();
    if !missing.is_empty() {
        return Err(GrafanaError::IncompleteConfig(missing.join(", ")));
    }

    let name = rotation_token_name(&settings.token_name_prefix, now);
    let record = client
        .create_token(&CreateTokenRequest {
            access_policy_id: current.access_policy_id.clone(),
            name: name.clone(),
            display_name: name,
            expires_at: expiry_after(now, settings.root_token_ttl)?,
        })
        .await?;

    let replacement = match replacement_config(&record.id, &record.access_policy_id, record.token) {
        Ok(config) => config,
        Err(err) => {
            discard_minted(&client, &record.id).await;
            return Err(err);
        }
    };

    if let Err(err) = store.write(&replacement).await {
        discard_minted(&client, &record.id).await;
        return Err(err);
    }

    let rotated = RotatedCredential {
        token_id: replacement.token_id.clone(),
        name: replacement.name.clone(),
        access_policy_id: replacement.access_policy_id.clone(),
    };
    info!(token_id = %rotated.token_id, token_name = %rotated.name, "Rotated root credential");

    match client.delete_token(&current.token_id).await {
        Ok(()) => Ok(RotationOutcome::Rotated(rotated)),
        Err(err) => {
            error!(
                orphan_token_id = %current.token_id,
                error = %err,
                "Rotated root credential but failed to delete the old token"
            );
            Ok(RotationOutcome::RotatedWithOrphan {
                rotated,
                orphan_token_id: current.token_id,
                error: err,
            })
        }
    }
}

fn replacement_config(
    token_id: &str,
    access_policy_id: &str,
    token: Option<secrecy::SecretString>,
) -> GrafanaResult<RootCredentialConfig> {
    let token = token.ok_or_else(|| {
        GrafanaError::InvalidResponse(format!("token '{token_id}' was created without a secret"))
    })?;
    let decoded = credential::decode(token.expose_secret())?;

    Ok(RootCredentialConfig {
        token,
        token_id: token_id.to_string(),
        access_policy_id: access_policy_id.to_string(),
        org: decoded.org,
        region: decoded.region,
        name: decoded.name,
    })
}

/// Best-effort cleanup of a token minted by a rotation that did not commit.
async fn discard_minted(client: &GrafanaCloudClient, token_id: &str) {
    if let Err(err) = client.delete_token(token_id).await {
        warn!(token_id = %token_id, error = %err, "Failed to discard uncommitted root token");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_common::InMemoryStorage;

    #[test]
    fn test_rotation_name_marker() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(
            rotation_token_name("vault", now),
            "vault-plugin-conf-1700000000000000000"
        );
    }

    #[test]
    fn test_replacement_requires_secret() {
        let err = replacement_config("t-2", "ap-1", None).unwrap_err();
        assert!(matches!(err, GrafanaError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_rotate_unconfigured() {
        let storage = InMemoryStorage::new();
        let err = rotate_root(&storage, &BackendSettings::default(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, GrafanaError::NotConfigured));
        assert!(storage.is_empty().await);
    }

    #[test]
    fn test_outcome_exposes_rotated_credential() {
        let rotated = RotatedCredential {
            token_id: "t-2".into(),
            name: "vault-plugin-conf-1".into(),
            access_policy_id: "ap-1".into(),
        };
        let outcome = RotationOutcome::RotatedWithOrphan {
            rotated: rotated.clone(),
            orphan_token_id: "t-1".into(),
            error: GrafanaError::Transport("timeout".into()),
        };
        assert_eq!(outcome.rotated(), &rotated);
        assert_eq!(rotated.response_data()["token_id"], "t-2");
    }
}
