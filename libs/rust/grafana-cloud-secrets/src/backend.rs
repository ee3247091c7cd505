//! Request dispatch.
//!
//! Paths served, relative to the mount:
//!
//! | path | operations |
//! |------|------------|
//! | `config/token` | read, write, delete |
//! | `config/lease` | read, write, delete |
//! | `config/rotate-root` | write |
//! | `access_policies/` | list |
//! | `access_policies/<name>` | read, write, delete |
//! | `creds/<name>` | read |
//!
//! Renew and revoke are routed by the lease's secret type.

use crate::{
    access_policies::{self, AccessPolicyStore, validate_policy_name},
    config::BackendSettings,
    error::{GrafanaError, GrafanaResult},
    issuance::{SECRET_TYPE_TOKEN, issue_token},
    lease_policy::{LeaseConfig, LeasePolicy},
    lifecycle::{renew_token, revoke_token},
    models::AccessPolicySpec,
    root_config::{self, ConfigStore},
    rotation::{RotationOutcome, rotate_root},
};
use chrono::Utc;
use plugin_common::{HostError, Lease, Operation, Request, Response, Storage, SystemView};
use regex::Regex;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{instrument, warn};

static ACCESS_POLICY_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^access_policies/(?P<name>.+)$").unwrap_or_else(|e| unreachable!("invalid pattern: {e}"))
});

static CREDS_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^creds/(?P<name>.+)$").unwrap_or_else(|e| unreachable!("invalid pattern: {e}"))
});

#[derive(Debug, PartialEq, Eq)]
enum Route<'p> {
    ConfigToken,
    ConfigLease,
    RotateRoot,
    AccessPolicyList,
    AccessPolicy(&'p str),
    Creds(&'p str),
}

impl<'p> Route<'p> {
    fn parse(path: &'p str) -> Option<Self> {
        match path.trim_start_matches('/') {
            "config/token" => Some(Self::ConfigToken),
            "config/lease" => Some(Self::ConfigLease),
            "config/rotate-root" => Some(Self::RotateRoot),
            "access_policies" | "access_policies/" => Some(Self::AccessPolicyList),
            p => {
                if let Some(caps) = ACCESS_POLICY_PATH.captures(p) {
                    caps.name("name").map(|m| Self::AccessPolicy(m.as_str()))
                } else {
                    CREDS_PATH
                        .captures(p)
                        .and_then(|caps| caps.name("name"))
                        .map(|m| Self::Creds(m.as_str()))
                }
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenInput {
    token: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LeaseInput {
    #[serde(default, deserialize_with = "lease_duration")]
    ttl: Option<Duration>,
    #[serde(default, deserialize_with = "lease_duration")]
    max_ttl: Option<Duration>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyInput {
    policy: PolicyField,
}

/// The policy document, sent either as a JSON string or inline.
#[derive(Deserialize)]
#[serde(untagged)]
enum PolicyField {
    Encoded(String),
    Inline(AccessPolicySpec),
}

impl PolicyField {
    fn into_spec(self) -> GrafanaResult<AccessPolicySpec> {
        match self {
            Self::Inline(spec) => Ok(spec),
            Self::Encoded(raw) => serde_json::from_str(&raw).map_err(|e| {
                GrafanaError::invalid_request(format!("cannot parse policy: {e}"))
            }),
        }
    }
}

/// Seconds as a number, or a string with an optional `s`/`m`/`h`/`d` suffix.
fn lease_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Secs(secs)) => Ok(Some(Duration::from_secs(secs))),
        Some(Raw::Text(text)) => parse_duration(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration '{text}'"))),
    }
}

/// Parse `"90"`, `"90s"`, `"15m"`, `"1h"` or `"7d"`.
#[must_use]
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let (digits, unit) = match text.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => text.split_at(idx),
        None => (text, "s"),
    };
    let value: u64 = digits.parse().ok()?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return None,
    };
    value.checked_mul(multiplier).map(Duration::from_secs)
}

fn parse_input<T: DeserializeOwned>(data: &Map<String, Value>) -> GrafanaResult<T> {
    serde_json::from_value(Value::Object(data.clone()))
        .map_err(|e| GrafanaError::invalid_request(e.to_string()))
}

fn to_map<T: Serialize>(value: &T) -> GrafanaResult<Map<String, Value>> {
    match serde_json::to_value(value).map_err(HostError::from)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

fn unsupported(request: &Request) -> GrafanaError {
    GrafanaError::invalid_request(format!(
        "unsupported operation {:?} on path '{}'",
        request.operation, request.path
    ))
}

/// Grafana Cloud secrets backend.
///
/// Holds no per-request state. Every call reads configuration fresh from
/// the storage it is handed and builds its own upstream client.
#[derive(Debug, Clone, Default)]
pub struct GrafanaCloudBackend {
    settings: BackendSettings,
    system: SystemView,
}

impl GrafanaCloudBackend {
    /// Create a backend.
    #[must_use]
    pub const fn new(settings: BackendSettings, system: SystemView) -> Self {
        Self { settings, system }
    }

    /// Create a backend from environment variables.
    pub fn from_env() -> GrafanaResult<Self> {
        Ok(Self::new(BackendSettings::from_env()?, SystemView::from_env()?))
    }

    /// Backend settings.
    #[must_use]
    pub const fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Host TTL limits.
    #[must_use]
    pub const fn system(&self) -> &SystemView {
        &self.system
    }

    /// Handle one host request.
    ///
    /// Operational failures come back as error responses. Only storage
    /// faults are returned as `Err`.
    #[instrument(skip(self, storage, request), fields(path = %request.path, operation = ?request.operation))]
    pub async fn handle_request(
        &self,
        storage: &dyn Storage,
        request: Request,
    ) -> GrafanaResult<Response> {
        match self.dispatch(storage, &request).await {
            Ok(response) => Ok(response),
            Err(err) if err.is_user_facing() => {
                warn!(error = %err, "Request failed");
                Ok(Response::error(err.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    async fn dispatch(&self, storage: &dyn Storage, request: &Request) -> GrafanaResult<Response> {
        if matches!(request.operation, Operation::Renew | Operation::Revoke) {
            return self.lease_operation(storage, request).await;
        }

        let Some(route) = Route::parse(&request.path) else {
            return Err(GrafanaError::invalid_request(format!(
                "unsupported path '{}'",
                request.path
            )));
        };

        match route {
            Route::ConfigToken => self.config_token(storage, request).await,
            Route::ConfigLease => self.config_lease(storage, request).await,
            Route::RotateRoot if request.operation.is_write() => self.rotate(storage).await,
            Route::AccessPolicyList if request.operation == Operation::List => {
                Ok(Response::list(AccessPolicyStore::new(storage).list().await?))
            }
            Route::AccessPolicy(name) => self.access_policy(storage, request, name).await,
            Route::Creds(name) if request.operation == Operation::Read => {
                validate_policy_name(name)?;
                let issued =
                    issue_token(storage, &self.settings, &self.system, name, Utc::now()).await?;
                Ok(Response {
                    data: issued.response_data(),
                    secret: Some(issued.lease),
                    warnings: issued.warnings,
                })
            }
            _ => Err(unsupported(request)),
        }
    }

    async fn lease_operation(&self, storage: &dyn Storage, request: &Request) -> GrafanaResult<Response> {
        let lease: &Lease = request
            .secret
            .as_ref()
            .ok_or_else(|| GrafanaError::invalid_lease("request carries no lease"))?;
        if lease.secret_type != SECRET_TYPE_TOKEN {
            return Err(GrafanaError::invalid_lease(format!(
                "unknown secret type '{}'",
                lease.secret_type
            )));
        }

        if request.operation == Operation::Renew {
            let renewed =
                renew_token(storage, &self.settings, &self.system, lease, Utc::now()).await?;
            Ok(Response {
                secret: Some(renewed),
                ..Response::default()
            })
        } else {
            revoke_token(storage, &self.settings, lease).await?;
            Ok(Response::default())
        }
    }

    async fn config_token(&self, storage: &dyn Storage, request: &Request) -> GrafanaResult<Response> {
        let store = ConfigStore::new(storage);
        match request.operation {
            Operation::Read => Ok(Response::with_data(store.require().await?.public_data())),
            op if op.is_write() => {
                let input: TokenInput = parse_input(&request.data)?;
                if input.token.trim().is_empty() {
                    return Err(GrafanaError::invalid_request("token is required"));
                }
                let config =
                    root_config::configure(storage, &self.settings, SecretString::from(input.token))
                        .await?;
                Ok(Response::with_data(config.public_data()))
            }
            Operation::Delete => {
                store.delete().await?;
                Ok(Response::default())
            }
            _ => Err(unsupported(request)),
        }
    }

    async fn config_lease(&self, storage: &dyn Storage, request: &Request) -> GrafanaResult<Response> {
        let policy = LeasePolicy::new(storage, &self.system);
        match request.operation {
            Operation::Read => match policy.read().await? {
                Some(config) => Ok(Response::with_data(to_map(&config)?)),
                None => Ok(Response::default()),
            },
            op if op.is_write() => {
                let input: LeaseInput = parse_input(&request.data)?;
                let current = policy.read().await?.unwrap_or_default();
                let config = LeaseConfig::new(
                    input.ttl.unwrap_or(current.ttl),
                    input.max_ttl.unwrap_or(current.max_ttl),
                )?;
                policy.write(&config).await?;
                let mut response = Response::with_data(to_map(&config)?);
                if config.max_ttl > self.system.max_lease_ttl {
                    response.add_warning(format!(
                        "max_ttl of {}s exceeds the mount max TTL of {}s and will be capped",
                        config.max_ttl.as_secs(),
                        self.system.max_lease_ttl.as_secs()
                    ));
                }
                Ok(response)
            }
            Operation::Delete => {
                policy.delete().await?;
                Ok(Response::default())
            }
            _ => Err(unsupported(request)),
        }
    }

    async fn rotate(&self, storage: &dyn Storage) -> GrafanaResult<Response> {
        match rotate_root(storage, &self.settings, Utc::now()).await? {
            RotationOutcome::Rotated(rotated) => Ok(Response::with_data(rotated.response_data())),
            RotationOutcome::RotatedWithOrphan {
                rotated,
                orphan_token_id,
                error,
            } => {
                let mut response = Response::error(format!(
                    "root credential rotated, but deleting the previous token '{orphan_token_id}' failed: {error}"
                ));
                response.data.extend(rotated.response_data());
                response
                    .data
                    .insert("orphan_token_id".to_string(), Value::String(orphan_token_id));
                Ok(response)
            }
        }
    }

    async fn access_policy(
        &self,
        storage: &dyn Storage,
        request: &Request,
        name: &str,
    ) -> GrafanaResult<Response> {
        validate_policy_name(name)?;
        match request.operation {
            Operation::Read => match AccessPolicyStore::new(storage).read(name).await? {
                Some(policy) => Ok(Response::with_data(to_map(&policy)?)),
                None => Ok(Response::default()),
            },
            op if op.is_write() => {
                let input: PolicyInput = parse_input(&request.data)?;
                let policy = access_policies::write_access_policy(
                    storage,
                    &self.settings,
                    name,
                    input.policy.into_spec()?,
                )
                .await?;
                Ok(Response::with_data(to_map(&policy)?))
            }
            Operation::Delete => {
                access_policies::delete_access_policy(storage, &self.settings, name).await?;
                Ok(Response::default())
            }
            _ => Err(unsupported(request)),
        }
    }
}
