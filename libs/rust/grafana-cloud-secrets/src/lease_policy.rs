//! Operator lease settings and effective TTL computation.

use crate::error::{GrafanaError, GrafanaResult};
use chrono::{DateTime, Utc};
use plugin_common::{Storage, StorageEntry, SystemView, TtlCalculation, calculate_ttl};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Storage key of the lease settings.
pub const CONFIG_LEASE_KEY: &str = "config/lease";

/// Operator TTL settings for issued tokens. Zero means "use the host default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Default TTL, in seconds on the wire
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
    /// Max TTL, in seconds on the wire
    #[serde(with = "duration_secs")]
    pub max_ttl: Duration,
}

impl LeaseConfig {
    /// Create lease settings, rejecting a TTL above a set max TTL.
    pub fn new(ttl: Duration, max_ttl: Duration) -> GrafanaResult<Self> {
        if !max_ttl.is_zero() && ttl > max_ttl {
            return Err(GrafanaError::invalid_request(format!(
                "ttl ({}s) cannot be greater than max_ttl ({}s)",
                ttl.as_secs(),
                max_ttl.as_secs()
            )));
        }
        Ok(Self { ttl, max_ttl })
    }
}

/// Lease settings bound to host storage and limits.
pub struct LeasePolicy<'a> {
    storage: &'a dyn Storage,
    system: &'a SystemView,
}

impl<'a> LeasePolicy<'a> {
    /// Bind to storage and the host's system view.
    #[must_use]
    pub fn new(storage: &'a dyn Storage, system: &'a SystemView) -> Self {
        Self { storage, system }
    }

    /// Read the stored settings, `None` when unset.
    pub async fn read(&self) -> GrafanaResult<Option<LeaseConfig>> {
        match self.storage.get(CONFIG_LEASE_KEY).await? {
            Some(entry) => Ok(Some(entry.decode_json()?)),
            None => Ok(None),
        }
    }

    /// Persist settings.
    pub async fn write(&self, config: &LeaseConfig) -> GrafanaResult<()> {
        self.storage
            .put(StorageEntry::json(CONFIG_LEASE_KEY, config)?)
            .await?;
        Ok(())
    }

    /// Remove settings, reverting to host defaults.
    pub async fn delete(&self) -> GrafanaResult<()> {
        self.storage.delete(CONFIG_LEASE_KEY).await?;
        Ok(())
    }

    /// Effective TTL for a lease started at `start` (or now when `None`).
    ///
    /// Never exceeds the max TTL window and never returns a zero TTL.
    pub async fn effective_ttl(
        &self,
        start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> GrafanaResult<TtlCalculation> {
        let config = self.read().await?.unwrap_or_default();
        let calculation = calculate_ttl(
            self.system,
            Duration::ZERO,
            config.ttl,
            config.max_ttl,
            start,
            now,
        )?;
        Ok(calculation)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
