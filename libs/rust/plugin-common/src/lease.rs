//! Lease model and the host's TTL calculation rules.
//!
//! A lease wraps a dynamically issued secret. The host owns its renew and
//! revoke cadence and hands the plugin's `internal_data` back untouched.

use crate::env::parse_env;
use crate::error::{HostError, HostResult};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::warn;

/// Mount-wide TTL limits enforced by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemView {
    /// TTL applied when neither the request nor the plugin sets one
    pub default_lease_ttl: Duration,
    /// Ceiling no lease may exceed
    pub max_lease_ttl: Duration,
}

impl Default for SystemView {
    fn default() -> Self {
        Self {
            default_lease_ttl: Duration::from_secs(3600),
            max_lease_ttl: Duration::from_secs(86400),
        }
    }
}

impl SystemView {
    /// Create a system view with explicit limits.
    #[must_use]
    pub const fn new(default_lease_ttl: Duration, max_lease_ttl: Duration) -> Self {
        Self {
            default_lease_ttl,
            max_lease_ttl,
        }
    }

    /// Load limits from `DEFAULT_LEASE_TTL_SECS` and `MAX_LEASE_TTL_SECS`.
    pub fn from_env() -> HostResult<Self> {
        let defaults = Self::default();
        let default_lease_ttl = Duration::from_secs(parse_env(
            "DEFAULT_LEASE_TTL_SECS",
            defaults.default_lease_ttl.as_secs(),
        )?);
        let max_lease_ttl = Duration::from_secs(parse_env(
            "MAX_LEASE_TTL_SECS",
            defaults.max_lease_ttl.as_secs(),
        )?);

        if default_lease_ttl > max_lease_ttl {
            return Err(HostError::invalid_config(
                "DEFAULT_LEASE_TTL_SECS must not exceed MAX_LEASE_TTL_SECS",
            ));
        }

        Ok(Self::new(default_lease_ttl, max_lease_ttl))
    }
}

/// Outcome of [`calculate_ttl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlCalculation {
    /// Effective TTL from now
    pub ttl: Duration,
    /// Effective max TTL measured from the lease start
    pub max_ttl: Duration,
    /// Whether the TTL was cut short by the max TTL window
    pub clamped: bool,
    /// Non-fatal adjustments made along the way
    pub warnings: Vec<String>,
}

/// Compute the effective TTL for a lease.
///
/// Zero durations mean "unset". The max TTL falls back to the system
/// ceiling and is clamped to it; the TTL falls back from `increment` to
/// `backend_ttl` to the system default. The result never reaches past
/// `start_time + max_ttl`, where a missing start time means `now`.
pub fn calculate_ttl(
    system: &SystemView,
    increment: Duration,
    backend_ttl: Duration,
    backend_max_ttl: Duration,
    start_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> HostResult<TtlCalculation> {
    let mut warnings = Vec::new();

    let max_ttl = if backend_max_ttl.is_zero() {
        system.max_lease_ttl
    } else if backend_max_ttl > system.max_lease_ttl {
        warn!(
            requested_secs = backend_max_ttl.as_secs(),
            ceiling_secs = system.max_lease_ttl.as_secs(),
            "max TTL exceeds the system ceiling, clamping"
        );
        warnings.push(format!(
            "max TTL of {}s is greater than the system max TTL of {}s, capping",
            backend_max_ttl.as_secs(),
            system.max_lease_ttl.as_secs()
        ));
        system.max_lease_ttl
    } else {
        backend_max_ttl
    };

    let mut ttl = if !increment.is_zero() {
        increment
    } else if !backend_ttl.is_zero() {
        backend_ttl
    } else {
        system.default_lease_ttl
    };

    let start = start_time.unwrap_or(now);
    let max_valid_time = expiry_after(start, max_ttl)?;
    let remaining = (max_valid_time - now)
        .to_std()
        .map_err(|_| HostError::PastMaxTtl)?;
    if remaining.is_zero() {
        return Err(HostError::PastMaxTtl);
    }

    let clamped = ttl > remaining;
    if clamped {
        ttl = remaining;
    }

    if ttl.is_zero() {
        return Err(HostError::ZeroTtl);
    }

    Ok(TtlCalculation {
        ttl,
        max_ttl,
        clamped,
        warnings,
    })
}

/// Convert a std duration into a chrono delta.
pub fn to_time_delta(duration: Duration) -> HostResult<TimeDelta> {
    TimeDelta::from_std(duration)
        .map_err(|_| HostError::invalid_config(format!("duration {duration:?} out of range")))
}

/// The instant `duration` after `at`, refusing instants chrono cannot represent.
pub fn expiry_after(at: DateTime<Utc>, duration: Duration) -> HostResult<DateTime<Utc>> {
    at.checked_add_signed(to_time_delta(duration)?)
        .ok_or_else(|| HostError::invalid_config(format!("{duration:?} after {at} is out of range")))
}

/// A lease attached to a dynamically issued secret.
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    /// Secret type the plugin registered for renew/revoke dispatch
    pub secret_type: String,
    /// Current TTL
    pub ttl: Duration,
    /// Max TTL measured from `issue_time`
    pub max_ttl: Duration,
    /// Whether the host may renew this lease
    pub renewable: bool,
    /// When the secret was first issued
    pub issue_time: DateTime<Utc>,
    /// Plugin bookkeeping, returned untouched on renew and revoke
    pub internal_data: Map<String, Value>,
}

impl Lease {
    /// Create a lease issued at `issue_time` with no TTL yet.
    #[must_use]
    pub fn new(
        secret_type: impl Into<String>,
        internal_data: Map<String, Value>,
        issue_time: DateTime<Utc>,
    ) -> Self {
        Self {
            secret_type: secret_type.into(),
            ttl: Duration::ZERO,
            max_ttl: Duration::ZERO,
            renewable: false,
            issue_time,
            internal_data,
        }
    }

    /// Set TTL bounds.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration, max_ttl: Duration) -> Self {
        self.ttl = ttl;
        self.max_ttl = max_ttl;
        self
    }

    /// Set renewability.
    #[must_use]
    pub const fn with_renewable(mut self, renewable: bool) -> Self {
        self.renewable = renewable;
        self
    }

    /// Read a string value from the internal data.
    #[must_use]
    pub fn internal_str(&self, key: &str) -> Option<&str> {
        self.internal_data.get(key).and_then(Value::as_str)
    }
}
