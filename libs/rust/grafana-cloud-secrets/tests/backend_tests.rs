//! End-to-end tests of the backend against a mock Grafana Cloud API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grafana_cloud_secrets::{
    BackendSettings, ConfigStore, GrafanaCloudBackend, GrafanaError, RootCredentialConfig,
};
use plugin_common::{
    HostError, HostResult, InMemoryStorage, Lease, Operation, Request, Response, Storage,
    StorageEntry, SystemView, TracingConfig, init_tracing,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;
use test_utils::MockGrafanaCloud;
use test_utils::fixtures::{ADMIN_SCOPES, REGION, legacy_token, root_token, token_record_json};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const ROOT_NAME: &str = "vault-root";
const ROOT_ID: &str = "root-1";
const ADMIN_POLICY: &str = "ap-admin";

fn backend_for(mock: &MockGrafanaCloud) -> GrafanaCloudBackend {
    init_tracing(&TracingConfig::default().with_log_level("debug"));
    let settings = BackendSettings::default()
        .with_api_url(Url::parse(&mock.uri()).unwrap())
        .with_timeout(Duration::from_secs(5))
        .with_root_token_ttl(Duration::from_secs(30 * 86400));
    GrafanaCloudBackend::new(settings, SystemView::default())
}

fn admin_token() -> String {
    root_token("1", ROOT_NAME, REGION)
}

async fn send(
    backend: &GrafanaCloudBackend,
    storage: &dyn Storage,
    request: Request,
) -> Response {
    backend.handle_request(storage, request).await.unwrap()
}

async fn mount_admin(mock: &MockGrafanaCloud) {
    mock.mount_token_lookup(ROOT_NAME, ROOT_ID, ADMIN_POLICY)
        .await
        .mount_access_policy(ADMIN_POLICY, "admin", &ADMIN_SCOPES)
        .await;
}

async fn configured() -> (MockGrafanaCloud, GrafanaCloudBackend, InMemoryStorage) {
    let mock = MockGrafanaCloud::start().await;
    mount_admin(&mock).await;
    let backend = backend_for(&mock);
    let storage = InMemoryStorage::new();

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Update, "config/token").with_data(json!({"token": admin_token()})),
    )
    .await;
    assert!(!resp.is_error(), "{:?}", resp.error_message());
    (mock, backend, storage)
}

async fn create_policy(backend: &GrafanaCloudBackend, storage: &dyn Storage, mock: &MockGrafanaCloud) {
    mock.mount_create_access_policy("ap-readers", "stack-readers", &["metrics:read"])
        .await;
    let resp = send(
        backend,
        storage,
        Request::new(Operation::Update, "access_policies/stack-readers")
            .with_data(json!({"policy": r#"{"displayName":"Stack readers","scopes":["metrics:read"]}"#})),
    )
    .await;
    assert!(!resp.is_error(), "{:?}", resp.error_message());
}

async fn issue(
    backend: &GrafanaCloudBackend,
    storage: &dyn Storage,
    mock: &MockGrafanaCloud,
) -> Response {
    mock.mount_create_token("tok-1", "glc_derived").await;
    send(backend, storage, Request::new(Operation::Read, "creds/stack-readers")).await
}

// Configuration

#[tokio::test]
async fn test_configure_persists_identity_without_exposing_token() {
    let (_mock, backend, storage) = configured().await;

    let resp = send(&backend, &storage, Request::new(Operation::Read, "config/token")).await;
    assert_eq!(resp.data["token_id"], ROOT_ID);
    assert_eq!(resp.data["access_policy_id"], ADMIN_POLICY);
    assert_eq!(resp.data["region"], REGION);
    assert_eq!(resp.data["name"], ROOT_NAME);
    assert!(!resp.data.contains_key("token"));
}

#[tokio::test]
async fn test_configure_trims_surrounding_whitespace() {
    let mock = MockGrafanaCloud::start().await;
    mount_admin(&mock).await;
    let backend = backend_for(&mock);
    let storage = InMemoryStorage::new();

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Update, "config/token")
            .with_data(json!({"token": format!("  {}\n", admin_token())})),
    )
    .await;
    assert!(!resp.is_error(), "{:?}", resp.error_message());

    let config = ConfigStore::new(&storage).require().await.unwrap();
    assert_eq!(config.token.expose_secret(), admin_token());
    assert_eq!(config.token_id, ROOT_ID);
}

#[tokio::test]
async fn test_configure_rejects_invalid_base64() {
    let mock = MockGrafanaCloud::start().await;
    let backend = backend_for(&mock);
    let storage = InMemoryStorage::new();

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Update, "config/token").with_data(json!({"token": "%%not-base64%%"})),
    )
    .await;

    assert!(resp.is_error());
    assert!(storage.is_empty().await);
    assert_eq!(mock.request_count().await, 0);
}

#[tokio::test]
async fn test_configure_rejects_legacy_key() {
    let mock = MockGrafanaCloud::start().await;
    let backend = backend_for(&mock);
    let storage = InMemoryStorage::new();

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Update, "config/token").with_data(json!({"token": legacy_token()})),
    )
    .await;

    assert!(resp.error_message().unwrap().contains("legacy"));
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn test_configure_upstream_rejection_rolls_back() {
    let mock = MockGrafanaCloud::start().await;
    mock.mount_api_error("GET", "/tokens", 401, "InvalidCredentials", "Token invalid")
        .await;
    let backend = backend_for(&mock);
    let storage = InMemoryStorage::new();

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Update, "config/token").with_data(json!({"token": admin_token()})),
    )
    .await;

    let message = resp.error_message().unwrap();
    assert!(message.contains("InvalidCredentials"));
    assert!(message.contains("Token invalid"));
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn test_configure_requires_admin_scopes() {
    let mock = MockGrafanaCloud::start().await;
    mock.mount_token_lookup(ROOT_NAME, ROOT_ID, ADMIN_POLICY)
        .await
        .mount_access_policy(ADMIN_POLICY, "readers", &["metrics:read"])
        .await;
    let backend = backend_for(&mock);
    let storage = InMemoryStorage::new();

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Update, "config/token").with_data(json!({"token": admin_token()})),
    )
    .await;

    assert!(resp.error_message().unwrap().contains("accesspolicies:write"));
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn test_failed_reconfigure_keeps_previous_config() {
    let (mock, backend, storage) = configured().await;
    mock.mount_token_list("other-root", Vec::new()).await;

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Update, "config/token")
            .with_data(json!({"token": root_token("1", "other-root", REGION)})),
    )
    .await;
    assert!(resp.is_error());

    let config = ConfigStore::new(&storage).require().await.unwrap();
    assert_eq!(config.name, ROOT_NAME);
    assert_eq!(config.token_id, ROOT_ID);
}

#[tokio::test]
async fn test_configure_ambiguous_root_name() {
    let mock = MockGrafanaCloud::start().await;
    mock.mount_token_list(
        ROOT_NAME,
        vec![
            token_record_json("a", ROOT_NAME, ADMIN_POLICY),
            token_record_json("b", ROOT_NAME, ADMIN_POLICY),
        ],
    )
    .await;
    let backend = backend_for(&mock);
    let storage = InMemoryStorage::new();

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Update, "config/token").with_data(json!({"token": admin_token()})),
    )
    .await;

    assert!(resp.error_message().unwrap().contains("unexpected number of tokens"));
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn test_lease_max_above_mount_limit_warns() {
    let mock = MockGrafanaCloud::start().await;
    let backend = backend_for(&mock);
    let storage = InMemoryStorage::new();

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Update, "config/lease").with_data(json!({"max_ttl": "30d"})),
    )
    .await;
    assert!(!resp.is_error());
    assert_eq!(resp.warnings.len(), 1);
}

#[tokio::test]
async fn test_delete_config() {
    let (_mock, backend, storage) = configured().await;

    let resp = send(&backend, &storage, Request::new(Operation::Delete, "config/token")).await;
    assert!(!resp.is_error());
    assert!(ConfigStore::new(&storage).read().await.unwrap().is_none());
}

// Access policies

#[tokio::test]
async fn test_access_policy_create_update_list_delete() {
    let (mock, backend, storage) = configured().await;
    create_policy(&backend, &storage, &mock).await;

    let created = mock.received_bodies("POST", "/accesspolicies").await;
    assert_eq!(created[0]["name"], "stack-readers");
    assert_eq!(created[0]["displayName"], "Stack readers");

    mock.mount_update_access_policy("ap-readers", "stack-readers", &["metrics:read", "logs:read"])
        .await;
    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Update, "access_policies/stack-readers")
            .with_data(json!({"policy": {"scopes": ["metrics:read", "logs:read"]}})),
    )
    .await;
    assert_eq!(resp.data["scopes"], json!(["metrics:read", "logs:read"]));
    assert_eq!(mock.received_bodies("POST", "/accesspolicies").await.len(), 1);
    assert_eq!(
        mock.received_bodies("POST", "/accesspolicies/ap-readers").await.len(),
        1
    );

    let resp = send(&backend, &storage, Request::new(Operation::List, "access_policies/")).await;
    assert_eq!(resp.data["keys"], json!(["stack-readers"]));

    mock.mount_delete_access_policy("ap-readers", 204).await;
    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Delete, "access_policies/stack-readers"),
    )
    .await;
    assert!(!resp.is_error());

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Read, "access_policies/stack-readers"),
    )
    .await;
    assert!(resp.data.is_empty());
}

#[tokio::test]
async fn test_access_policy_invalid_name() {
    let (_mock, backend, storage) = configured().await;

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Update, "access_policies/-bad")
            .with_data(json!({"policy": {"scopes": ["metrics:read"]}})),
    )
    .await;
    assert!(resp.error_message().unwrap().contains("invalid access policy name"));
}

#[tokio::test]
async fn test_access_policy_upstream_delete_failure_keeps_local_record() {
    let (mock, backend, storage) = configured().await;
    create_policy(&backend, &storage, &mock).await;
    mock.mount_api_error("DELETE", "/accesspolicies/ap-readers", 500, "Internal", "boom")
        .await;

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Delete, "access_policies/stack-readers"),
    )
    .await;
    assert!(resp.is_error());

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Read, "access_policies/stack-readers"),
    )
    .await;
    assert_eq!(resp.data["id"], "ap-readers");
}

// Issuance

#[tokio::test]
async fn test_creds_unconfigured_makes_no_upstream_call() {
    let mock = MockGrafanaCloud::start().await;
    let backend = backend_for(&mock);
    let storage = InMemoryStorage::new();

    let resp = send(&backend, &storage, Request::new(Operation::Read, "creds/stack-readers")).await;

    assert_eq!(
        resp.error_message(),
        Some("configuration does not exist. did you configure 'config/token'?")
    );
    assert_eq!(mock.request_count().await, 0);
}

#[tokio::test]
async fn test_creds_bound_to_policy_within_ttl() {
    let (mock, backend, storage) = configured().await;
    create_policy(&backend, &storage, &mock).await;
    send(
        &backend,
        &storage,
        Request::new(Operation::Update, "config/lease").with_data(json!({"ttl": 600, "max_ttl": 1200})),
    )
    .await;

    let before = Utc::now();
    let resp = issue(&backend, &storage, &mock).await;
    assert!(!resp.is_error(), "{:?}", resp.error_message());

    assert_eq!(resp.data["id"], "tok-1");
    assert_eq!(resp.data["access_policy_id"], "ap-readers");
    assert_eq!(resp.data["token"], "glc_derived");
    assert!(
        resp.data["name"]
            .as_str()
            .unwrap()
            .starts_with("vault-stack-readers-")
    );

    let expires_at: DateTime<Utc> = resp.data["expires_at"].as_str().unwrap().parse().unwrap();
    assert!(expires_at >= before);
    assert!(expires_at <= Utc::now() + chrono::TimeDelta::seconds(600));

    let lease = resp.secret.unwrap();
    assert_eq!(lease.secret_type, "token");
    assert_eq!(lease.ttl, Duration::from_secs(600));
    assert_eq!(lease.max_ttl, Duration::from_secs(1200));
    assert_eq!(lease.internal_str("id"), Some("tok-1"));
    assert!(!lease.internal_data.contains_key("token"));

    let sent = mock.received_bodies("POST", "/tokens").await;
    assert_eq!(sent[0]["accessPolicyId"], "ap-readers");
}

#[tokio::test]
async fn test_repeated_issuance_uses_unique_names() {
    let (mock, backend, storage) = configured().await;
    create_policy(&backend, &storage, &mock).await;

    let first = issue(&backend, &storage, &mock).await;
    let second = send(&backend, &storage, Request::new(Operation::Read, "creds/stack-readers")).await;
    assert_ne!(first.data["name"], second.data["name"]);
}

#[tokio::test]
async fn test_creds_unknown_policy() {
    let (mock, backend, storage) = configured().await;

    let resp = send(&backend, &storage, Request::new(Operation::Read, "creds/ghost")).await;
    assert!(resp.error_message().unwrap().contains("ghost"));
    assert!(mock.received_bodies("POST", "/tokens").await.is_empty());
}

#[tokio::test]
async fn test_creds_upstream_error_surfaces_code() {
    let (mock, backend, storage) = configured().await;
    create_policy(&backend, &storage, &mock).await;
    mock.mount_api_error("POST", "/tokens", 409, "Conflict", "name taken")
        .await;

    let resp = send(&backend, &storage, Request::new(Operation::Read, "creds/stack-readers")).await;
    let message = resp.error_message().unwrap();
    assert!(message.contains("Conflict"));
    assert!(message.contains("name taken"));
}

// Lifecycle

#[tokio::test]
async fn test_renew_updates_upstream_expiry() {
    let (mock, backend, storage) = configured().await;
    create_policy(&backend, &storage, &mock).await;
    let lease = issue(&backend, &storage, &mock).await.secret.unwrap();
    mock.mount_update_token("tok-1", "ap-readers").await;

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Renew, "creds/stack-readers").with_secret(lease.clone()),
    )
    .await;
    assert!(!resp.is_error(), "{:?}", resp.error_message());

    let renewed = resp.secret.unwrap();
    assert_eq!(renewed.internal_data, lease.internal_data);
    assert_eq!(renewed.issue_time, lease.issue_time);
    assert!(renewed.ttl <= Duration::from_secs(3600));

    let sent = mock.received_bodies("POST", "/tokens/tok-1").await;
    assert!(sent[0]["expiresAt"].is_string());
}

#[tokio::test]
async fn test_renew_past_max_ttl_fails() {
    let (mock, backend, storage) = configured().await;
    let mut data = serde_json::Map::new();
    data.insert("id".into(), "tok-1".into());
    data.insert("name".into(), "n".into());
    let lease = Lease::new("token", data, Utc::now() - chrono::TimeDelta::days(2));

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Renew, "creds/x").with_secret(lease),
    )
    .await;
    assert!(resp.is_error());
    assert!(mock.received_bodies("POST", "/tokens/tok-1").await.is_empty());
}

#[tokio::test]
async fn test_revoke_twice_is_idempotent() {
    let (mock, backend, storage) = configured().await;
    create_policy(&backend, &storage, &mock).await;
    let lease = issue(&backend, &storage, &mock).await.secret.unwrap();

    Mock::given(method("DELETE"))
        .and(path("/tokens/tok-1"))
        .respond_with(ResponseTemplate::new(204))
        .up_to_n_times(1)
        .mount(mock.server())
        .await;
    mock.mount_delete_token("tok-1", 404).await;

    for _ in 0..2 {
        let resp = send(
            &backend,
            &storage,
            Request::new(Operation::Revoke, "creds/stack-readers").with_secret(lease.clone()),
        )
        .await;
        assert!(!resp.is_error(), "{:?}", resp.error_message());
    }
}

#[tokio::test]
async fn test_revoke_upstream_failure_is_reported() {
    let (mock, backend, storage) = configured().await;
    create_policy(&backend, &storage, &mock).await;
    let lease = issue(&backend, &storage, &mock).await.secret.unwrap();
    mock.mount_api_error("DELETE", "/tokens/tok-1", 503, "Unavailable", "try later")
        .await;

    let resp = send(
        &backend,
        &storage,
        Request::new(Operation::Revoke, "creds/stack-readers").with_secret(lease),
    )
    .await;
    assert!(resp.error_message().unwrap().contains("Unavailable"));
}

// Rotation

async fn mount_rotation(mock: &MockGrafanaCloud, old_delete_status: u16) {
    mock.mount_create_token("root-2", &root_token("1", "vault-plugin-conf-1", REGION))
        .await;
    if old_delete_status < 300 {
        mock.mount_delete_token(ROOT_ID, old_delete_status).await;
    } else {
        mock.mount_api_error("DELETE", "/tokens/root-1", old_delete_status, "Internal", "boom")
            .await;
    }
}

#[tokio::test]
async fn test_rotate_root_replaces_config() {
    let (mock, backend, storage) = configured().await;
    mount_rotation(&mock, 204).await;

    let resp = send(&backend, &storage, Request::new(Operation::Update, "config/rotate-root")).await;
    assert!(!resp.is_error(), "{:?}", resp.error_message());
    assert_eq!(resp.data["token_id"], "root-2");
    assert_eq!(resp.data["access_policy_id"], ADMIN_POLICY);
    assert!(!resp.data.contains_key("token"));

    let config = ConfigStore::new(&storage).require().await.unwrap();
    assert_eq!(config.token_id, "root-2");
    assert_eq!(config.name, "vault-plugin-conf-1");

    let minted = mock.received_bodies("POST", "/tokens").await;
    assert_eq!(minted[0]["accessPolicyId"], ADMIN_POLICY);
    assert!(
        minted[0]["name"]
            .as_str()
            .unwrap()
            .starts_with("vault-plugin-conf-")
    );
    let expires_at: DateTime<Utc> = minted[0]["expiresAt"].as_str().unwrap().parse().unwrap();
    assert!(expires_at > Utc::now() + chrono::TimeDelta::days(29));
    assert!(expires_at <= Utc::now() + chrono::TimeDelta::days(30));
}

#[tokio::test]
async fn test_rotate_root_orphaned_old_token() {
    let (mock, backend, storage) = configured().await;
    mount_rotation(&mock, 500).await;

    let resp = send(&backend, &storage, Request::new(Operation::Update, "config/rotate-root")).await;

    assert!(resp.is_error());
    assert_eq!(resp.data["token_id"], "root-2");
    assert_eq!(resp.data["orphan_token_id"], ROOT_ID);

    let config = ConfigStore::new(&storage).require().await.unwrap();
    assert_eq!(config.token_id, "root-2");
}

#[tokio::test]
async fn test_rotate_root_mint_failure_leaves_config() {
    let (mock, backend, storage) = configured().await;
    mock.mount_api_error("POST", "/tokens", 400, "InvalidArgument", "bad")
        .await;

    let resp = send(&backend, &storage, Request::new(Operation::Update, "config/rotate-root")).await;
    assert!(resp.is_error());

    let config = ConfigStore::new(&storage).require().await.unwrap();
    assert_eq!(config.token_id, ROOT_ID);
}

#[tokio::test]
async fn test_rotate_root_expiry_out_of_range() {
    let (mock, backend, storage) = configured().await;
    mount_rotation(&mock, 204).await;
    let backend = GrafanaCloudBackend::new(
        backend
            .settings()
            .clone()
            .with_root_token_ttl(Duration::from_secs(1 << 45)),
        SystemView::default(),
    );

    let resp = send(&backend, &storage, Request::new(Operation::Update, "config/rotate-root")).await;
    assert!(resp.is_error());
    assert!(mock.received_bodies("POST", "/tokens").await.is_empty());

    let config = ConfigStore::new(&storage).require().await.unwrap();
    assert_eq!(config.token_id, ROOT_ID);
}

#[tokio::test]
async fn test_rotate_root_incomplete_config() {
    let mock = MockGrafanaCloud::start().await;
    mount_admin(&mock).await;
    let backend = backend_for(&mock);
    let storage = InMemoryStorage::new();
    ConfigStore::new(&storage)
        .write(&RootCredentialConfig {
            token: SecretString::from(admin_token()),
            token_id: String::new(),
            access_policy_id: String::new(),
            org: "1".into(),
            region: REGION.into(),
            name: ROOT_NAME.into(),
        })
        .await
        .unwrap();

    let resp = send(&backend, &storage, Request::new(Operation::Update, "config/rotate-root")).await;
    assert!(
        resp.error_message()
            .unwrap()
            .contains("cannot rotate: incomplete configuration")
    );
    assert!(mock.received_bodies("POST", "/tokens").await.is_empty());
}

// Faults

struct BrokenStorage;

#[async_trait]
impl Storage for BrokenStorage {
    async fn get(&self, _key: &str) -> HostResult<Option<StorageEntry>> {
        Err(HostError::storage("disk unavailable"))
    }

    async fn put(&self, _entry: StorageEntry) -> HostResult<()> {
        Err(HostError::storage("disk unavailable"))
    }

    async fn delete(&self, _key: &str) -> HostResult<()> {
        Err(HostError::storage("disk unavailable"))
    }

    async fn list(&self, _prefix: &str) -> HostResult<Vec<String>> {
        Err(HostError::storage("disk unavailable"))
    }
}

#[tokio::test]
async fn test_storage_fault_is_not_an_error_response() {
    let backend = GrafanaCloudBackend::default();

    let result = backend
        .handle_request(&BrokenStorage, Request::new(Operation::Read, "config/token"))
        .await;
    assert!(matches!(result, Err(GrafanaError::Storage(_))));
}
