//! Grafana Cloud API wire types.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

/// Create token request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest {
    /// Policy the token is bound to
    pub access_policy_id: String,
    /// Unique token name
    pub name: String,
    /// Human readable name
    pub display_name: String,
    /// Absolute expiry
    pub expires_at: DateTime<Utc>,
}

/// Update token request body. Only the expiry is mutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTokenRequest {
    /// New absolute expiry
    pub expires_at: DateTime<Utc>,
}

/// Token record as returned by the API.
///
/// `token` is only present in the create response; the API never returns a
/// token's secret again afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    /// Upstream token id
    pub id: String,
    /// Policy the token is bound to
    pub access_policy_id: String,
    /// Token name, unique within the org
    pub name: String,
    /// Human readable name
    #[serde(default)]
    pub display_name: String,
    /// Expiry, absent for non-expiring tokens
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// First use
    #[serde(default)]
    pub first_used_at: Option<DateTime<Utc>>,
    /// Most recent use
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Secret value, create responses only
    #[serde(default, deserialize_with = "secret_string::deserialize_optional")]
    pub token: Option<SecretString>,
}

/// Token listing response.
#[derive(Debug, Deserialize)]
pub struct TokenList {
    /// Matching tokens
    #[serde(default)]
    pub items: Vec<TokenRecord>,
}

/// Realm an access policy applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Realm {
    /// Realm type, `org` or `stack`
    #[serde(rename = "type")]
    pub kind: String,
    /// Org or stack id
    pub identifier: String,
    /// Label selectors narrowing the realm
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_policies: Vec<LabelPolicy>,
}

/// Label selector restricting a realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPolicy {
    /// PromQL style label selector
    pub selector: String,
}

/// Network conditions on an access policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conditions {
    /// CIDRs allowed to use tokens of the policy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_subnets: Vec<String>,
}

impl Conditions {
    /// Whether no condition is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed_subnets.is_empty()
    }
}

/// Operator-supplied access policy definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AccessPolicySpec {
    /// Upstream policy name, overwritten with the path name
    #[serde(default)]
    pub name: String,
    /// Human readable name
    #[serde(default)]
    pub display_name: String,
    /// Granted scopes, e.g. `metrics:read`
    pub scopes: Vec<String>,
    /// Realms the policy applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub realms: Vec<Realm>,
    /// Network conditions
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

/// Access policy as stored upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicy {
    /// Upstream policy id
    pub id: String,
    /// Owning org
    #[serde(default)]
    pub org_id: String,
    /// Policy name
    pub name: String,
    /// Human readable name
    #[serde(default)]
    pub display_name: String,
    /// Granted scopes
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Realms the policy applies to
    #[serde(default)]
    pub realms: Vec<Realm>,
    /// Network conditions
    #[serde(default)]
    pub conditions: Conditions,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Error payload of non-success responses.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    /// Machine readable code
    #[serde(default)]
    pub code: String,
    /// Human readable message
    #[serde(default)]
    pub message: String,
}

/// Serde helpers for secrets persisted or received as plain strings.
pub(crate) mod secret_string {
    use super::{Deserialize, Deserializer, SecretString};
    use secrecy::ExposeSecret;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(secret.expose_secret())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
        String::deserialize(deserializer).map(SecretString::from)
    }

    pub fn deserialize_optional<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<SecretString>, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?
            .filter(|s| !s.is_empty())
            .map(SecretString::from))
    }
}
