//! Durable key-value storage provided by the host.
//!
//! Plugins never own a storage engine. They receive a [`Storage`] handle per
//! request and read, write, and list keys through it.

use crate::error::{HostError, HostResult};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// A raw storage entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    /// Storage key
    pub key: String,
    /// Stored bytes
    pub value: Vec<u8>,
}

impl StorageEntry {
    /// Encode a value as a JSON storage entry.
    pub fn json<T: Serialize + ?Sized>(key: impl Into<String>, value: &T) -> HostResult<Self> {
        Ok(Self {
            key: key.into(),
            value: serde_json::to_vec(value)?,
        })
    }

    /// Decode the stored bytes as JSON.
    pub fn decode_json<T: DeserializeOwned>(&self) -> HostResult<T> {
        serde_json::from_slice(&self.value).map_err(HostError::from)
    }
}

/// Host storage contract.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read an entry, `None` when the key is absent.
    async fn get(&self, key: &str) -> HostResult<Option<StorageEntry>>;

    /// Write an entry, replacing any existing value.
    async fn put(&self, entry: StorageEntry) -> HostResult<()>;

    /// Delete an entry. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> HostResult<()>;

    /// List the keys directly under `prefix`, relative to it and sorted.
    ///
    /// Nested keys are folded into their first path segment followed by `/`.
    async fn list(&self, prefix: &str) -> HostResult<Vec<String>>;
}

/// In-memory [`Storage`] used for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get(&self, key: &str) -> HostResult<Option<StorageEntry>> {
        Ok(self.entries.read().await.get(key).map(|value| StorageEntry {
            key: key.to_string(),
            value: value.clone(),
        }))
    }

    async fn put(&self, entry: StorageEntry) -> HostResult<()> {
        if entry.key.is_empty() {
            return Err(HostError::storage("missing key"));
        }
        self.entries.write().await.insert(entry.key, entry.value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> HostResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> HostResult<Vec<String>> {
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .keys()
            .filter_map(|key| key.strip_prefix(prefix))
            .map(|rest| match rest.find('/') {
                Some(idx) => rest[..=idx].to_string(),
                None => rest.to_string(),
            })
            .collect();
        keys.dedup();
        Ok(keys)
    }
}
