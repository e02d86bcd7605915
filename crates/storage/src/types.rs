//! Core data model: scopes, stored items, and adapter operation inputs.
//!
//! Every item lives under a three-level [`Scope`] and is addressed by a
//! string key; the composite primary key `(tenant_id, namespace, user_id,
//! key)` is identical across all backends. Items carry a monotonically
//! increasing version used as the optimistic-concurrency token, wall-clock
//! create/update timestamps, and an optional expiry.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// The isolation unit for all storage operations.
///
/// A scope is the 3-tuple `(tenant_id, namespace, user_id)`. Items under
/// different scopes are never observable to each other, no matter which
/// component differs. All three components are required and non-empty;
/// construction is the only way to obtain a `Scope`, so adapters can rely on
/// the invariant.
///
/// # Examples
///
/// ```
/// use stash_storage::Scope;
///
/// let scope = Scope::new("acme", "web", "user-17").unwrap();
/// assert_eq!(scope.tenant_id(), "acme");
///
/// assert!(Scope::new("acme", "", "user-17").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    tenant_id: String,
    namespace: String,
    user_id: String,
}

impl Scope {
    /// Creates a scope, rejecting empty components.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if any component is empty.
    pub fn new(
        tenant_id: impl Into<String>,
        namespace: impl Into<String>,
        user_id: impl Into<String>,
    ) -> StoreResult<Self> {
        let scope =
            Self { tenant_id: tenant_id.into(), namespace: namespace.into(), user_id: user_id.into() };
        if scope.tenant_id.is_empty() {
            return Err(StoreError::validation("tenantId must not be empty"));
        }
        if scope.namespace.is_empty() {
            return Err(StoreError::validation("namespace must not be empty"));
        }
        if scope.user_id.is_empty() {
            return Err(StoreError::validation("userId must not be empty"));
        }
        Ok(scope)
    }

    /// Returns the tenant component.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Returns the namespace component.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the user component.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.namespace, self.user_id)
    }
}

/// A versioned JSON item as stored under a scope and key.
///
/// The ETag is derived from `version` (see [`StoredItem::etag`]) and never
/// stored separately. Timestamps are UTC; `created_at` is preserved across
/// in-place updates and reset when the primary key is re-created after a
/// delete or an expiry.
///
/// Serialization (used by the key-value backend's envelope and by the HTTP
/// edge) emits RFC 3339 timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredItem {
    /// Caller-supplied key, unique within the scope.
    pub key: String,
    /// Opaque JSON value; never interpreted or mutated by the store.
    pub value: Value,
    /// Monotonic positive version, starting at 1.
    pub version: i64,
    /// Time of first insertion into the current logical row.
    pub created_at: DateTime<Utc>,
    /// Time of the most recent successful write.
    pub updated_at: DateTime<Utc>,
    /// Expiry instant, or `None` for items that never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredItem {
    /// Returns the concurrency token for this item: the quoted decimal
    /// version, byte-for-byte `"<version>"`.
    #[must_use]
    pub fn etag(&self) -> String {
        crate::etag::format_etag(self.version)
    }

    /// Returns `true` if the item is active at `now`: not expired, or never
    /// expiring.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }

    /// Returns `true` if the item is active at the current wall-clock time.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }
}

/// Options for a single `put` at the adapter level.
///
/// `if_match_version` carries an already-parsed `If-Match` precondition; the
/// service is responsible for parsing the header form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Time-to-live in whole seconds; `None` stores the item without expiry
    /// **and clears any prior expiry** on update.
    pub ttl_seconds: Option<i64>,
    /// Required current version for the write to proceed.
    pub if_match_version: Option<i64>,
}

/// Options for a single `delete` at the adapter level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Required current version for the delete to proceed.
    pub if_match_version: Option<i64>,
}

/// One entry of a `batch_put`, applied in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct PutEntry {
    /// Target key within the scope.
    pub key: String,
    /// JSON value to store.
    pub value: Value,
    /// Per-entry TTL and precondition.
    pub options: PutOptions,
}

/// Parameters for a `list` at the adapter level.
///
/// `after_key` is the cursor already decoded by the service; adapters return
/// only keys strictly greater than it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Restrict results to keys starting with this prefix.
    pub prefix: Option<String>,
    /// Return only keys strictly greater than this one.
    pub after_key: Option<String>,
    /// Maximum number of items to return. The service clamps this to its
    /// configured bounds before the adapter sees it.
    pub limit: i64,
}

/// One page of `list` results.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    /// Active items in ascending lexicographic key order.
    pub items: Vec<StoredItem>,
    /// Opaque cursor for the next page; `None` when no active key greater
    /// than the last emitted key exists.
    pub next_cursor: Option<String>,
}

/// Converts epoch milliseconds (the SQL backends' storage representation)
/// into a UTC timestamp.
///
/// # Errors
///
/// Returns [`StoreError::Internal`] for values outside the representable
/// range, which indicates a corrupt row.
pub fn datetime_from_millis(millis: i64) -> StoreResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StoreError::internal(format!("timestamp out of range: {millis}")))
}

/// Computes the expiry instant for a write performed at `now` with the given
/// TTL; `None` TTL means no expiry.
#[must_use]
pub fn expiry_from_ttl(now: DateTime<Utc>, ttl_seconds: Option<i64>) -> Option<DateTime<Utc>> {
    ttl_seconds.map(|secs| now + chrono::Duration::seconds(secs))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn item(version: i64, expires_at: Option<DateTime<Utc>>) -> StoredItem {
        let now = Utc::now();
        StoredItem {
            key: "k".to_owned(),
            value: json!({"enabled": true}),
            version,
            created_at: now,
            updated_at: now,
            expires_at,
        }
    }

    #[rstest]
    #[case::empty_tenant("", "ns", "u")]
    #[case::empty_namespace("t", "", "u")]
    #[case::empty_user("t", "ns", "")]
    fn scope_rejects_empty_components(#[case] t: &str, #[case] n: &str, #[case] u: &str) {
        let err = Scope::new(t, n, u).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }), "got: {err:?}");
    }

    #[test]
    fn scope_display_joins_components() {
        let scope = Scope::new("acme", "web", "u1").unwrap();
        assert_eq!(scope.to_string(), "acme/web/u1");
    }

    #[test]
    fn etag_is_quoted_version() {
        assert_eq!(item(1, None).etag(), "\"1\"");
        assert_eq!(item(412, None).etag(), "\"412\"");
    }

    #[test]
    fn item_without_expiry_is_active() {
        assert!(item(1, None).is_active());
    }

    #[test]
    fn item_expiring_in_future_is_active() {
        let it = item(1, Some(Utc::now() + chrono::Duration::seconds(60)));
        assert!(it.is_active());
    }

    #[test]
    fn item_expired_in_past_is_not_active() {
        let it = item(1, Some(Utc::now() - chrono::Duration::seconds(1)));
        assert!(!it.is_active());
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let it = item(1, Some(now));
        // An item whose expiry equals "now" is no longer active.
        assert!(!it.is_active_at(now));
    }

    #[test]
    fn serde_round_trip_preserves_value_and_omits_null_expiry() {
        let it = item(3, None);
        let encoded = serde_json::to_string(&it).unwrap();
        assert!(!encoded.contains("expiresAt"), "null expiry should be omitted: {encoded}");
        let decoded: StoredItem = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, it);
    }

    #[test]
    fn datetime_millis_round_trip() {
        let now = Utc::now();
        let restored = datetime_from_millis(now.timestamp_millis()).unwrap();
        // Round-tripping through millis truncates sub-millisecond precision.
        assert_eq!(restored.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn expiry_from_ttl_adds_seconds() {
        let now = Utc::now();
        assert_eq!(expiry_from_ttl(now, None), None);
        assert_eq!(expiry_from_ttl(now, Some(30)), Some(now + chrono::Duration::seconds(30)));
    }
}
