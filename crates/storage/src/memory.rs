//! In-memory storage adapter.
//!
//! [`MemoryAdapter`] is the reference implementation of
//! [`StorageAdapter`]: every contract subtlety (version arithmetic, expiry
//! visibility, precondition atomicity, cursor paging) is expressed here in
//! plain Rust, guarded by a single [`parking_lot::RwLock`]. It backs the
//! service tests and the conformance suite, and is suitable for development
//! use where persistence is not required.
//!
//! Expiry is purely lazy: expired entries become invisible to reads and are
//! physically removed when overwritten or deleted.

use std::{collections::BTreeMap, ops::Bound, sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;

use crate::{
    adapter::StorageAdapter,
    cursor,
    error::{StoreError, StoreResult},
    health::{HealthMetadata, HealthStatus},
    types::{
        DeleteOptions, ListPage, ListQuery, PutEntry, PutOptions, Scope, StoredItem,
        expiry_from_ttl,
    },
};

/// Composite map key: `(tenant_id, namespace, user_id, key)`.
///
/// Tuple ordering gives per-scope ascending key order for free.
type MemKey = (String, String, String, String);

/// In-memory [`StorageAdapter`] backed by a [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryAdapter` is cheaply cloneable via [`Arc`]; all clones share the
/// same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    items: Arc<RwLock<BTreeMap<MemKey, StoredItem>>>,
}

impl MemoryAdapter {
    /// Creates an empty in-memory adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn mem_key(scope: &Scope, key: &str) -> MemKey {
        (
            scope.tenant_id().to_owned(),
            scope.namespace().to_owned(),
            scope.user_id().to_owned(),
            key.to_owned(),
        )
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn get(&self, scope: &Scope, key: &str) -> StoreResult<Option<StoredItem>> {
        let items = self.items.read();
        Ok(items.get(&Self::mem_key(scope, key)).filter(|item| item.is_active()).cloned())
    }

    async fn put(
        &self,
        scope: &Scope,
        key: &str,
        value: Value,
        options: PutOptions,
    ) -> StoreResult<StoredItem> {
        let now = Utc::now();
        let mem_key = Self::mem_key(scope, key);
        let mut items = self.items.write();

        // An expired row counts as absent for both the precondition and the
        // version/created_at computation.
        let current = items.get(&mem_key).filter(|item| item.is_active_at(now));

        if let Some(expected) = options.if_match_version {
            match current {
                None => return Err(StoreError::version_mismatch(expected, None)),
                Some(item) if item.version != expected => {
                    return Err(StoreError::version_mismatch(expected, Some(item.version)));
                },
                Some(_) => {},
            }
        }

        let item = StoredItem {
            key: key.to_owned(),
            value,
            version: current.map_or(1, |item| item.version + 1),
            created_at: current.map_or(now, |item| item.created_at),
            updated_at: now,
            expires_at: expiry_from_ttl(now, options.ttl_seconds),
        };
        items.insert(mem_key, item.clone());
        Ok(item)
    }

    async fn delete(&self, scope: &Scope, key: &str, options: DeleteOptions) -> StoreResult<bool> {
        let now = Utc::now();
        let mem_key = Self::mem_key(scope, key);
        let mut items = self.items.write();

        match items.get(&mem_key) {
            None => Ok(false),
            Some(item) if !item.is_active_at(now) => {
                // Expired rows behave as absent; removing one here is the
                // permitted opportunistic cleanup.
                items.remove(&mem_key);
                Ok(false)
            },
            Some(item) => {
                if let Some(expected) = options.if_match_version {
                    if item.version != expected {
                        return Err(StoreError::version_mismatch(expected, Some(item.version)));
                    }
                }
                items.remove(&mem_key);
                Ok(true)
            },
        }
    }

    async fn batch_get(
        &self,
        scope: &Scope,
        keys: &[String],
    ) -> StoreResult<BTreeMap<String, Option<StoredItem>>> {
        let items = self.items.read();
        let mut result = BTreeMap::new();
        for key in keys {
            let found =
                items.get(&Self::mem_key(scope, key)).filter(|item| item.is_active()).cloned();
            result.insert(key.clone(), found);
        }
        Ok(result)
    }

    async fn batch_put(
        &self,
        scope: &Scope,
        entries: &[PutEntry],
    ) -> StoreResult<BTreeMap<String, StoredItem>> {
        let mut result = BTreeMap::new();
        for entry in entries {
            let item = self.put(scope, &entry.key, entry.value.clone(), entry.options).await?;
            result.insert(entry.key.clone(), item);
        }
        Ok(result)
    }

    async fn list(&self, scope: &Scope, query: ListQuery) -> StoreResult<ListPage> {
        let now = Utc::now();
        let items = self.items.read();

        let scope_tuple = (
            scope.tenant_id().to_owned(),
            scope.namespace().to_owned(),
            scope.user_id().to_owned(),
        );
        let start = match &query.after_key {
            // `Excluded` gives the strictly-greater-than cursor semantics.
            Some(after) => Bound::Excluded((
                scope_tuple.0.clone(),
                scope_tuple.1.clone(),
                scope_tuple.2.clone(),
                after.clone(),
            )),
            None => Bound::Included((
                scope_tuple.0.clone(),
                scope_tuple.1.clone(),
                scope_tuple.2.clone(),
                String::new(),
            )),
        };

        let limit = usize::try_from(query.limit.max(0))
            .map_err(|_| StoreError::internal("list limit does not fit in usize"))?;
        let mut page: Vec<StoredItem> = items
            .range((start, Bound::Unbounded))
            .take_while(|((tenant, namespace, user, _), _)| {
                (tenant.as_str(), namespace.as_str(), user.as_str())
                    == (scope.tenant_id(), scope.namespace(), scope.user_id())
            })
            .filter(|((_, _, _, key), _)| {
                query.prefix.as_deref().is_none_or(|prefix| key.starts_with(prefix))
            })
            .filter(|(_, item)| item.is_active_at(now))
            .map(|(_, item)| item.clone())
            .take(limit + 1)
            .collect();

        let next_cursor = if page.len() > limit {
            page.truncate(limit);
            page.last().map(|item| cursor::encode(&item.key))
        } else {
            None
        };
        Ok(ListPage { items: page, next_cursor })
    }

    async fn health(&self) -> HealthStatus {
        let start = Instant::now();
        // Acquiring the read lock verifies we are not deadlocked.
        let entry_count = self.items.read().len();
        HealthStatus::healthy(
            HealthMetadata::new(start.elapsed(), "memory")
                .with_detail("entry_count", entry_count.to_string()),
        )
    }

    async fn close(&self) -> StoreResult<()> {
        // Nothing to release; kept for contract symmetry and idempotent by
        // construction.
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    fn scope() -> Scope {
        Scope::new("t1", "ns", "u1").unwrap()
    }

    /// Plants an already-expired item directly in the map, bypassing the
    /// adapter, so expiry tests need no sleeping.
    fn plant_expired(adapter: &MemoryAdapter, scope: &Scope, key: &str, version: i64) {
        let past = Utc::now() - Duration::seconds(10);
        adapter.items.write().insert(
            MemoryAdapter::mem_key(scope, key),
            StoredItem {
                key: key.to_owned(),
                value: json!("stale"),
                version,
                created_at: past,
                updated_at: past,
                expires_at: Some(past + Duration::seconds(1)),
            },
        );
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let adapter = MemoryAdapter::new();
        let item = adapter
            .put(&scope(), "alpha", json!({"enabled": true}), PutOptions::default())
            .await
            .unwrap();
        assert_eq!(item.version, 1);
        assert_eq!(item.etag(), "\"1\"");

        let fetched = adapter.get(&scope(), "alpha").await.unwrap().unwrap();
        assert_eq!(fetched.value, json!({"enabled": true}));
    }

    #[tokio::test]
    async fn versions_increment_and_created_at_is_preserved() {
        let adapter = MemoryAdapter::new();
        let first = adapter.put(&scope(), "k", json!(1), PutOptions::default()).await.unwrap();
        let second = adapter.put(&scope(), "k", json!(2), PutOptions::default()).await.unwrap();

        assert_eq!(second.version, first.version + 1);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn if_match_mismatch_leaves_state_unchanged() {
        let adapter = MemoryAdapter::new();
        adapter.put(&scope(), "k", json!("v1"), PutOptions::default()).await.unwrap();

        let err = adapter
            .put(
                &scope(),
                "k",
                json!("v2"),
                PutOptions { if_match_version: Some(999), ..Default::default() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Precondition { .. }), "got: {err:?}");

        let current = adapter.get(&scope(), "k").await.unwrap().unwrap();
        assert_eq!(current.value, json!("v1"));
        assert_eq!(current.version, 1);
    }

    #[tokio::test]
    async fn if_match_against_missing_key_fails() {
        let adapter = MemoryAdapter::new();
        let err = adapter
            .put(
                &scope(),
                "ghost",
                json!(0),
                PutOptions { if_match_version: Some(1), ..Default::default() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Precondition { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn expired_item_is_invisible_and_put_resets_version() {
        let adapter = MemoryAdapter::new();
        plant_expired(&adapter, &scope(), "ttl", 7);

        assert!(adapter.get(&scope(), "ttl").await.unwrap().is_none());

        let fresh = adapter.put(&scope(), "ttl", json!("new"), PutOptions::default()).await.unwrap();
        assert_eq!(fresh.version, 1, "expired row must behave as a fresh insert");
    }

    #[tokio::test]
    async fn if_match_against_expired_item_fails() {
        let adapter = MemoryAdapter::new();
        plant_expired(&adapter, &scope(), "ttl", 7);

        let err = adapter
            .put(
                &scope(),
                "ttl",
                json!(0),
                PutOptions { if_match_version: Some(7), ..Default::default() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Precondition { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn delete_semantics() {
        let adapter = MemoryAdapter::new();
        assert!(!adapter.delete(&scope(), "none", DeleteOptions::default()).await.unwrap());

        adapter.put(&scope(), "k", json!(1), PutOptions::default()).await.unwrap();
        assert!(adapter.delete(&scope(), "k", DeleteOptions::default()).await.unwrap());
        assert!(!adapter.delete(&scope(), "k", DeleteOptions::default()).await.unwrap());
    }

    #[tokio::test]
    async fn delete_expired_returns_false_and_removes_row() {
        let adapter = MemoryAdapter::new();
        plant_expired(&adapter, &scope(), "ttl", 3);

        assert!(!adapter.delete(&scope(), "ttl", DeleteOptions::default()).await.unwrap());
        assert!(adapter.items.read().is_empty(), "expired row should be cleaned up");
    }

    #[tokio::test]
    async fn delete_with_mismatched_version_fails() {
        let adapter = MemoryAdapter::new();
        adapter.put(&scope(), "k", json!(1), PutOptions::default()).await.unwrap();

        let err = adapter
            .delete(&scope(), "k", DeleteOptions { if_match_version: Some(2) })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Precondition { .. }), "got: {err:?}");
        assert!(adapter.get(&scope(), "k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn scope_isolation() {
        let adapter = MemoryAdapter::new();
        let user_a = Scope::new("t", "n", "user-1").unwrap();
        let user_b = Scope::new("t", "n", "user-2").unwrap();

        adapter.put(&user_a, "foo", json!({"u": 1}), PutOptions::default()).await.unwrap();
        adapter.put(&user_b, "foo", json!({"u": 2}), PutOptions::default()).await.unwrap();

        let a = adapter.get(&user_a, "foo").await.unwrap().unwrap();
        let b = adapter.get(&user_b, "foo").await.unwrap().unwrap();
        assert_eq!(a.value, json!({"u": 1}));
        assert_eq!(b.value, json!({"u": 2}));

        let other_tenant = Scope::new("t2", "n", "user-1").unwrap();
        assert!(adapter.get(&other_tenant, "foo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_pages_in_key_order() {
        let adapter = MemoryAdapter::new();
        for key in ["d", "a", "c", "b"] {
            adapter.put(&scope(), key, json!(key), PutOptions::default()).await.unwrap();
        }

        let first = adapter
            .list(&scope(), ListQuery { limit: 2, ..Default::default() })
            .await
            .unwrap();
        let keys: Vec<&str> = first.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
        let cursor_key = cursor::decode(first.next_cursor.as_deref().unwrap()).unwrap();
        assert_eq!(cursor_key, "b");

        let second = adapter
            .list(
                &scope(),
                ListQuery { after_key: Some(cursor_key), limit: 2, ..Default::default() },
            )
            .await
            .unwrap();
        let keys: Vec<&str> = second.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["c", "d"]);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn list_filters_prefix_and_expired() {
        let adapter = MemoryAdapter::new();
        adapter.put(&scope(), "user:1", json!(1), PutOptions::default()).await.unwrap();
        adapter.put(&scope(), "user:2", json!(2), PutOptions::default()).await.unwrap();
        adapter.put(&scope(), "other", json!(3), PutOptions::default()).await.unwrap();
        plant_expired(&adapter, &scope(), "user:0", 1);

        let page = adapter
            .list(
                &scope(),
                ListQuery { prefix: Some("user:".to_owned()), limit: 10, ..Default::default() },
            )
            .await
            .unwrap();
        let keys: Vec<&str> = page.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["user:1", "user:2"]);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn health_reports_entry_count() {
        let adapter = MemoryAdapter::new();
        adapter.put(&scope(), "k", json!(1), PutOptions::default()).await.unwrap();

        let status = adapter.health().await;
        assert!(status.is_ok());
        assert_eq!(status.metadata().details.get("entry_count").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let adapter = MemoryAdapter::new();
        adapter.close().await.unwrap();
        adapter.close().await.unwrap();
    }
}
