//! Mock Grafana Cloud API.
//!
//! Wraps a wiremock server with helpers that mount the endpoints the backend
//! calls. Every helper returns `&Self` so mounts can be chained.

use crate::fixtures::{
    access_policy_json, api_error_json, created_token_json, token_record_json,
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// A fake Grafana Cloud API.
pub struct MockGrafanaCloud {
    server: MockServer,
}

impl MockGrafanaCloud {
    /// Start a new server.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to point the backend at.
    #[must_use]
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// The underlying server, for custom mounts.
    #[must_use]
    pub const fn server(&self) -> &MockServer {
        &self.server
    }

    /// Serve `GET /tokens?name=<name>` with one matching record.
    pub async fn mount_token_lookup(&self, name: &str, id: &str, access_policy_id: &str) -> &Self {
        self.mount_token_list(name, vec![token_record_json(id, name, access_policy_id)])
            .await
    }

    /// Serve `GET /tokens?name=<name>` with an arbitrary item list.
    pub async fn mount_token_list(&self, name: &str, items: Vec<Value>) -> &Self {
        Mock::given(method("GET"))
            .and(path("/tokens"))
            .and(query_param("name", name))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": items })))
            .mount(&self.server)
            .await;
        self
    }

    /// Serve `GET /accesspolicies/<id>`.
    pub async fn mount_access_policy(&self, id: &str, name: &str, scopes: &[&str]) -> &Self {
        Mock::given(method("GET"))
            .and(path(format!("/accesspolicies/{id}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(access_policy_json(id, name, scopes)),
            )
            .mount(&self.server)
            .await;
        self
    }

    /// Serve `POST /accesspolicies` with a created record.
    pub async fn mount_create_access_policy(&self, id: &str, name: &str, scopes: &[&str]) -> &Self {
        Mock::given(method("POST"))
            .and(path("/accesspolicies"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(access_policy_json(id, name, scopes)),
            )
            .mount(&self.server)
            .await;
        self
    }

    /// Serve `POST /accesspolicies/<id>` with an updated record.
    pub async fn mount_update_access_policy(&self, id: &str, name: &str, scopes: &[&str]) -> &Self {
        Mock::given(method("POST"))
            .and(path(format!("/accesspolicies/{id}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(access_policy_json(id, name, scopes)),
            )
            .mount(&self.server)
            .await;
        self
    }

    /// Serve `DELETE /accesspolicies/<id>` with `status`.
    pub async fn mount_delete_access_policy(&self, id: &str, status: u16) -> &Self {
        Mock::given(method("DELETE"))
            .and(path(format!("/accesspolicies/{id}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
        self
    }

    /// Serve `POST /tokens` with a created record carrying `token`.
    ///
    /// Name and access policy are echoed from the request body.
    pub async fn mount_create_token(&self, id: &str, token: &str) -> &Self {
        Mock::given(method("POST"))
            .and(path("/tokens"))
            .respond_with(CreatedToken {
                id: id.to_string(),
                token: token.to_string(),
            })
            .mount(&self.server)
            .await;
        self
    }

    /// Serve `POST /tokens/<id>` (expiry update).
    pub async fn mount_update_token(&self, id: &str, access_policy_id: &str) -> &Self {
        Mock::given(method("POST"))
            .and(path(format!("/tokens/{id}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(token_record_json(id, id, access_policy_id)),
            )
            .mount(&self.server)
            .await;
        self
    }

    /// Serve `DELETE /tokens/<id>` with `status`.
    pub async fn mount_delete_token(&self, id: &str, status: u16) -> &Self {
        Mock::given(method("DELETE"))
            .and(path(format!("/tokens/{id}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
        self
    }

    /// Answer every `method` request on `route` with an API error.
    pub async fn mount_api_error(
        &self,
        http_method: &str,
        route: &str,
        status: u16,
        code: &str,
        message: &str,
    ) -> &Self {
        Mock::given(method(http_method))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(api_error_json(code, message)))
            .mount(&self.server)
            .await;
        self
    }

    /// Number of requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }

    /// JSON bodies of requests received for `method` on `route`.
    pub async fn received_bodies(&self, http_method: &str, route: &str) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.method.as_str() == http_method && r.url.path() == route)
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }
}

/// Echoes a token create request back as the created record.
struct CreatedToken {
    id: String,
    token: String,
}

impl Respond for CreatedToken {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let field = |name: &str| body.get(name).and_then(Value::as_str).unwrap_or_default().to_string();
        let mut record = created_token_json(
            &self.id,
            &field("name"),
            &field("accessPolicyId"),
            &self.token,
        );
        record["expiresAt"] = body.get("expiresAt").cloned().unwrap_or(Value::Null);
        ResponseTemplate::new(200).set_body_json(record)
    }
}
