//! Grafana Cloud HTTP client.
//!
//! One client is built per request from freshly read configuration. Calls
//! are single-shot with a bounded timeout; callers decide whether to retry.

use crate::{
    config::BackendSettings,
    credential::{self, DecodedCredential},
    error::{GrafanaError, GrafanaResult},
    models::{
        AccessPolicy, AccessPolicySpec, ApiErrorBody, CreateTokenRequest, TokenList, TokenRecord,
        UpdateTokenRequest,
    },
};
use chrono::{DateTime, Utc};
use plugin_common::build_http_client;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, instrument, warn};

/// Grafana Cloud API client bound to one root credential.
#[derive(Debug)]
pub struct GrafanaCloudClient {
    http: Client,
    settings: BackendSettings,
    identity: DecodedCredential,
}

impl GrafanaCloudClient {
    /// Build a client for `root_token`.
    ///
    /// Decodes the credential to learn its region; no request is sent.
    pub fn new(root_token: &SecretString, settings: &BackendSettings) -> GrafanaResult<Self> {
        let identity = credential::decode(root_token.expose_secret())?;
        let http = build_http_client(&settings.http_config(), root_token)?;

        Ok(Self {
            http,
            settings: settings.clone(),
            identity,
        })
    }

    /// Build a client and prove the credential is accepted upstream.
    ///
    /// Resolves the credential's own token record by name, which also
    /// yields its upstream ID and access policy.
    #[instrument(skip_all)]
    pub async fn authenticate(
        root_token: &SecretString,
        settings: &BackendSettings,
    ) -> GrafanaResult<(Self, TokenRecord)> {
        let client = Self::new(root_token, settings)?;
        let record = client.get_token_by_name(&client.identity.name).await?;
        debug!(
            token_id = %record.id,
            region = %client.identity.region,
            "Authenticated with Grafana Cloud"
        );
        Ok((client, record))
    }

    /// Identity decoded from the root credential.
    #[must_use]
    pub const fn identity(&self) -> &DecodedCredential {
        &self.identity
    }

    /// Region every call is scoped to.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.identity.region
    }

    /// Create a token.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_token(&self, request: &CreateTokenRequest) -> GrafanaResult<TokenRecord> {
        self.request(Method::POST, "tokens", &[], Some(request))
            .await?
            .ok_or_else(|| GrafanaError::not_found("access policy", &request.access_policy_id))
    }

    /// Fetch a token by ID.
    pub async fn get_token(&self, id: &str) -> GrafanaResult<TokenRecord> {
        self.request::<TokenRecord, ()>(Method::GET, &format!("tokens/{id}"), &[], None)
            .await?
            .ok_or_else(|| GrafanaError::not_found("token", id))
    }

    /// Fetch the single token named `name`.
    ///
    /// Zero or several matches are an error; no match is ever picked
    /// arbitrarily.
    pub async fn get_token_by_name(&self, name: &str) -> GrafanaResult<TokenRecord> {
        let list: TokenList = self
            .request::<TokenList, ()>(Method::GET, "tokens", &[("name", name)], None)
            .await?
            .unwrap_or(TokenList { items: Vec::new() });

        let mut matches: Vec<TokenRecord> =
            list.items.into_iter().filter(|t| t.name == name).collect();
        match matches.len() {
            1 => Ok(matches.remove(0)),
            count => Err(GrafanaError::AmbiguousLookup {
                name: name.to_string(),
                count,
            }),
        }
    }

    /// Rewrite a token's expiry. Identity and policy binding are unchanged.
    pub async fn update_token_expiry(&self, id: &str, expires_at: DateTime<Utc>) -> GrafanaResult<()> {
        let body = UpdateTokenRequest { expires_at };
        self.request::<serde_json::Value, _>(Method::POST, &format!("tokens/{id}"), &[], Some(&body))
            .await?
            .map(|_| ())
            .ok_or_else(|| GrafanaError::not_found("token", id))
    }

    /// Delete a token. Deleting an absent token succeeds.
    pub async fn delete_token(&self, id: &str) -> GrafanaResult<()> {
        if self
            .request::<serde_json::Value, ()>(Method::DELETE, &format!("tokens/{id}"), &[], None)
            .await?
            .is_none()
        {
            debug!(token_id = %id, "Token already absent");
        }
        Ok(())
    }

    /// Create an access policy.
    pub async fn create_access_policy(&self, spec: &AccessPolicySpec) -> GrafanaResult<AccessPolicy> {
        self.request(Method::POST, "accesspolicies", &[], Some(spec))
            .await?
            .ok_or_else(|| GrafanaError::InvalidResponse("create access policy returned 404".into()))
    }

    /// Replace an existing access policy.
    pub async fn update_access_policy(
        &self,
        id: &str,
        spec: &AccessPolicySpec,
    ) -> GrafanaResult<AccessPolicy> {
        self.request(Method::POST, &format!("accesspolicies/{id}"), &[], Some(spec))
            .await?
            .ok_or_else(|| GrafanaError::not_found("access policy", id))
    }

    /// Fetch an access policy by ID.
    pub async fn get_access_policy(&self, id: &str) -> GrafanaResult<AccessPolicy> {
        self.request::<AccessPolicy, ()>(Method::GET, &format!("accesspolicies/{id}"), &[], None)
            .await?
            .ok_or_else(|| GrafanaError::not_found("access policy", id))
    }

    /// Delete an access policy. Deleting an absent policy succeeds.
    pub async fn delete_access_policy(&self, id: &str) -> GrafanaResult<()> {
        self.request::<serde_json::Value, ()>(
            Method::DELETE,
            &format!("accesspolicies/{id}"),
            &[],
            None,
        )
        .await?;
        Ok(())
    }

    /// Send a request; `Ok(None)` when the upstream answers 404.
    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> GrafanaResult<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.settings.endpoint(path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .query(&[("region", self.identity.region.as_str())])
            .query(query);
        if let Some(b) = body {
            request = request.json(b);
        }

        let response = request.send().await.map_err(|e| {
            warn!(%method, path, error = %e, "Grafana Cloud request failed");
            GrafanaError::from(e)
        })?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                // 204 and empty 200 bodies decode as JSON null.
                let text = read_body(response).await?;
                let text = if text.trim().is_empty() { "null" } else { &text };
                serde_json::from_str(text)
                    .map(Some)
                    .map_err(|e| GrafanaError::InvalidResponse(format!("{path}: {e}")))
            }
            _ => Err(api_error(status, read_body(response).await?)),
        }
    }
}

/// Read a response body. A connection dropped mid-body is a transport failure.
async fn read_body(response: reqwest::Response) -> GrafanaResult<String> {
    response
        .text()
        .await
        .map_err(|e| GrafanaError::Transport(e.without_url().to_string()))
}

/// Decode an error body into a structured upstream error.
fn api_error(status: StatusCode, text: String) -> GrafanaError {
    let body: ApiErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let code = if body.code.is_empty() {
        status.canonical_reason().unwrap_or("Unknown").to_string()
    } else {
        body.code
    };
    let message = if body.message.is_empty() { text } else { body.message };
    GrafanaError::upstream(status.as_u16(), code, message)
}
