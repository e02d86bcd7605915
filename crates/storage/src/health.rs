//! Health check types for storage adapters.
//!
//! [`StorageAdapter::health`](crate::StorageAdapter::health) never fails:
//! backend trouble is conveyed as [`HealthStatus::Unhealthy`] with a reason,
//! so the readiness endpoint can always render a response. The check itself
//! is a lightweight round-trip (`SELECT 1`, `PING`).
//!
//! # Mapping to HTTP
//!
//! | `HealthStatus` | `/v1/readyz` |
//! |----------------|--------------|
//! | `Healthy`      | 200 `{ok:true,…}` |
//! | `Unhealthy`    | 503 `{ok:false,…}` |

use std::{collections::HashMap, fmt, time::Duration};

/// Health of a storage adapter's backend connection.
#[derive(Debug, Clone)]
pub enum HealthStatus {
    /// The backend answered the round-trip.
    Healthy(HealthMetadata),
    /// The backend could not be reached or answered incorrectly.
    ///
    /// The `String` describes the failure reason.
    Unhealthy(HealthMetadata, String),
}

impl HealthStatus {
    /// Creates a `Healthy` status.
    #[must_use]
    pub fn healthy(metadata: HealthMetadata) -> Self {
        Self::Healthy(metadata)
    }

    /// Creates an `Unhealthy` status with a reason.
    #[must_use]
    pub fn unhealthy(metadata: HealthMetadata, reason: impl Into<String>) -> Self {
        Self::Unhealthy(metadata, reason.into())
    }

    /// Returns `true` if the backend is healthy.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Healthy(_))
    }

    /// Returns the metadata associated with this status.
    #[must_use]
    pub fn metadata(&self) -> &HealthMetadata {
        match self {
            Self::Healthy(m) | Self::Unhealthy(m, _) => m,
        }
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Healthy(_) => None,
            Self::Unhealthy(_, reason) => Some(reason),
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy(m) => write!(f, "healthy ({}ms)", m.check_duration.as_millis()),
            Self::Unhealthy(m, reason) => {
                write!(f, "unhealthy: {} ({}ms)", reason, m.check_duration.as_millis())
            },
        }
    }
}

/// Metadata about a health check result.
///
/// Contains timing, the adapter identifier, and an extensible key-value map
/// for backend-specific details (pool size, server version, entry counts).
#[derive(Debug, Clone)]
pub struct HealthMetadata {
    /// How long the round-trip took.
    pub check_duration: Duration,
    /// Identifier for the backend type (e.g. "sqlite", "postgres", "redis").
    pub backend: String,
    /// Backend-specific details.
    pub details: HashMap<String, String>,
}

impl HealthMetadata {
    /// Creates new metadata with the given check duration and backend name.
    #[must_use]
    pub fn new(check_duration: Duration, backend: impl Into<String>) -> Self {
        Self { check_duration, backend: backend.into(), details: HashMap::new() }
    }

    /// Adds a detail entry, returning `self` for chaining.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}
