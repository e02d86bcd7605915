//! Storage service: input validation and adapter orchestration.
//!
//! [`StorageService`] is a thin, stateless layer over a
//! [`StorageAdapter`]: it enforces the size and shape limits, translates
//! HTTP-shaped preconditions (`If-Match` strings, opaque cursors) into the
//! adapter contract, and records operation metrics. All validation happens
//! before the adapter call; invalid input never reaches a backend.

use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;

use crate::{
    StorageAdapter, cursor, etag,
    error::{StoreError, StoreResult},
    health::HealthStatus,
    metrics::Metrics,
    types::{DeleteOptions, ListPage, PutEntry, PutOptions, Scope, StoredItem},
};

/// Default maximum key length in bytes.
pub const DEFAULT_MAX_KEY_LENGTH: usize = 255;

/// Default maximum canonical-JSON value size in bytes (1 MiB).
pub const DEFAULT_MAX_VALUE_BYTES: usize = 1024 * 1024;

/// Default maximum number of entries in a batch operation.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Default upper bound for the `list` page size.
pub const DEFAULT_MAX_LIST_LIMIT: i64 = 100;

/// Page size used when a `list` call does not specify one.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Size and shape limits enforced by [`StorageService`].
///
/// # Example
///
/// ```
/// use stash_storage::ServiceLimits;
///
/// let limits = ServiceLimits::builder().max_key_length(64).build();
/// assert_eq!(limits.max_key_length(), 64);
/// assert_eq!(limits.max_batch_size(), 100);
/// ```
#[derive(Debug, Clone)]
pub struct ServiceLimits {
    max_key_length: usize,
    max_value_bytes: usize,
    max_batch_size: usize,
    max_list_limit: i64,
}

#[bon::bon]
impl ServiceLimits {
    /// Creates service limits, defaulting each bound that is not supplied.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_KEY_LENGTH)] max_key_length: usize,
        #[builder(default = DEFAULT_MAX_VALUE_BYTES)] max_value_bytes: usize,
        #[builder(default = DEFAULT_MAX_BATCH_SIZE)] max_batch_size: usize,
        #[builder(default = DEFAULT_MAX_LIST_LIMIT)] max_list_limit: i64,
    ) -> Self {
        Self { max_key_length, max_value_bytes, max_batch_size, max_list_limit }
    }

    /// Returns the maximum key length in bytes.
    #[must_use]
    pub fn max_key_length(&self) -> usize {
        self.max_key_length
    }

    /// Returns the maximum canonical-JSON value size in bytes.
    #[must_use]
    pub fn max_value_bytes(&self) -> usize {
        self.max_value_bytes
    }

    /// Returns the maximum number of entries in a batch operation.
    #[must_use]
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Returns the upper bound for the `list` page size.
    #[must_use]
    pub fn max_list_limit(&self) -> i64 {
        self.max_list_limit
    }
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_list_limit: DEFAULT_MAX_LIST_LIMIT,
        }
    }
}

/// Options for [`StorageService::set_item`], as received from the edge.
#[derive(Debug, Clone, Default)]
pub struct SetItemOptions {
    /// Time-to-live in seconds; must be a positive integer when present.
    pub ttl_seconds: Option<i64>,
    /// Raw `If-Match` header value, quoted or bare.
    pub if_match: Option<String>,
}

/// Options for [`StorageService::remove_item`].
#[derive(Debug, Clone, Default)]
pub struct RemoveItemOptions {
    /// Raw `If-Match` header value, quoted or bare.
    pub if_match: Option<String>,
}

/// One entry of a [`StorageService::batch_put`] request.
#[derive(Debug, Clone)]
pub struct BatchPutItem {
    /// Target key within the scope.
    pub key: String,
    /// JSON value to store.
    pub value: Value,
    /// Time-to-live in seconds; must be a positive integer when present.
    pub ttl_seconds: Option<i64>,
    /// Raw `If-Match` value for this entry.
    pub if_match: Option<String>,
}

/// Options for [`StorageService::list`], as received from the edge.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Restrict results to keys starting with this prefix.
    pub prefix: Option<String>,
    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
    /// Requested page size; clamped to `[1, max_list_limit]`, defaulting to
    /// [`DEFAULT_LIST_LIMIT`] when absent.
    pub limit: Option<i64>,
}

/// Validating front of the storage layer.
///
/// Stateless given its adapter; cheap to clone.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use serde_json::json;
/// use stash_storage::{MemoryAdapter, Scope, SetItemOptions, StorageService};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let service = StorageService::new(Arc::new(MemoryAdapter::new()));
/// let scope = Scope::new("acme", "web", "u1").unwrap();
///
/// let item = service
///     .set_item(&scope, "greeting", json!("hello"), SetItemOptions::default())
///     .await
///     .unwrap();
/// assert_eq!(item.etag(), "\"1\"");
/// # });
/// ```
#[derive(Clone)]
pub struct StorageService {
    adapter: Arc<dyn StorageAdapter>,
    limits: ServiceLimits,
    metrics: Metrics,
}

impl StorageService {
    /// Creates a service over `adapter` with default limits.
    #[must_use]
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self::with_limits(adapter, ServiceLimits::default())
    }

    /// Creates a service over `adapter` with the given limits.
    #[must_use]
    pub fn with_limits(adapter: Arc<dyn StorageAdapter>, limits: ServiceLimits) -> Self {
        Self { adapter, limits, metrics: Metrics::new() }
    }

    /// Returns the configured limits.
    #[must_use]
    pub fn limits(&self) -> &ServiceLimits {
        &self.limits
    }

    /// Returns the operation counters recorded by this service.
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Fetches the active item for `key`, or `None`.
    pub async fn get_item(&self, scope: &Scope, key: &str) -> StoreResult<Option<StoredItem>> {
        self.metrics.record_get();
        self.track(async {
            self.validate_key(key)?;
            self.adapter.get(scope, key).await
        })
        .await
    }

    /// Creates or updates the item at `key`.
    pub async fn set_item(
        &self,
        scope: &Scope,
        key: &str,
        value: Value,
        options: SetItemOptions,
    ) -> StoreResult<StoredItem> {
        self.metrics.record_put();
        self.track(async {
            self.validate_key(key)?;
            self.validate_value(&value)?;
            validate_ttl(options.ttl_seconds)?;
            let if_match_version = etag::parse_if_match(options.if_match.as_deref())?;
            self.adapter
                .put(
                    scope,
                    key,
                    value,
                    PutOptions { ttl_seconds: options.ttl_seconds, if_match_version },
                )
                .await
        })
        .await
    }

    /// Removes the item at `key`; returns `true` iff an active item existed
    /// and was removed.
    pub async fn remove_item(
        &self,
        scope: &Scope,
        key: &str,
        options: RemoveItemOptions,
    ) -> StoreResult<bool> {
        self.metrics.record_delete();
        self.track(async {
            self.validate_key(key)?;
            let if_match_version = etag::parse_if_match(options.if_match.as_deref())?;
            self.adapter.delete(scope, key, DeleteOptions { if_match_version }).await
        })
        .await
    }

    /// Fetches many keys at once; the result has an entry per requested key.
    pub async fn batch_get(
        &self,
        scope: &Scope,
        keys: &[String],
    ) -> StoreResult<BTreeMap<String, Option<StoredItem>>> {
        self.metrics.record_batch_get();
        self.track(async {
            self.validate_batch_len(keys.len())?;
            for key in keys {
                self.validate_key(key)?;
            }
            self.adapter.batch_get(scope, keys).await
        })
        .await
    }

    /// Applies puts in declaration order; a mid-batch failure leaves earlier
    /// entries committed.
    pub async fn batch_put(
        &self,
        scope: &Scope,
        entries: Vec<BatchPutItem>,
    ) -> StoreResult<BTreeMap<String, StoredItem>> {
        self.metrics.record_batch_put();
        self.track(async {
            self.validate_batch_len(entries.len())?;
            let mut validated = Vec::with_capacity(entries.len());
            for entry in entries {
                self.validate_key(&entry.key)?;
                self.validate_value(&entry.value)?;
                validate_ttl(entry.ttl_seconds)?;
                let if_match_version = etag::parse_if_match(entry.if_match.as_deref())?;
                validated.push(PutEntry {
                    key: entry.key,
                    value: entry.value,
                    options: PutOptions { ttl_seconds: entry.ttl_seconds, if_match_version },
                });
            }
            self.adapter.batch_put(scope, &validated).await
        })
        .await
    }

    /// Pages through active items in ascending key order.
    pub async fn list(&self, scope: &Scope, options: ListOptions) -> StoreResult<ListPage> {
        self.metrics.record_list();
        self.track(async {
            if let Some(prefix) = &options.prefix {
                if prefix.len() > self.limits.max_key_length {
                    return Err(StoreError::validation(format!(
                        "prefix exceeds maximum length of {} bytes",
                        self.limits.max_key_length
                    )));
                }
            }
            let after_key = match &options.cursor {
                Some(cursor) => Some(cursor::decode(cursor)?),
                None => None,
            };
            let limit = clamp_limit(options.limit, self.limits.max_list_limit);
            self.adapter
                .list(
                    scope,
                    crate::types::ListQuery { prefix: options.prefix, after_key, limit },
                )
                .await
        })
        .await
    }

    /// Pass-through to the adapter's health check.
    pub async fn health(&self) -> HealthStatus {
        self.adapter.health().await
    }

    /// Pass-through to the adapter's `close`.
    pub async fn close(&self) -> StoreResult<()> {
        self.adapter.close().await
    }

    /// Runs `op`, bumping the error counter when it fails.
    async fn track<T>(&self, op: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        let result = op.await;
        if result.is_err() {
            self.metrics.record_error();
        }
        result
    }

    fn validate_key(&self, key: &str) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::validation("key must not be empty"));
        }
        if key.len() > self.limits.max_key_length {
            return Err(StoreError::validation(format!(
                "key exceeds maximum length of {} bytes",
                self.limits.max_key_length
            )));
        }
        Ok(())
    }

    fn validate_value(&self, value: &Value) -> StoreResult<()> {
        // The limit is measured against the canonical (compact) JSON
        // serialization, the same bytes the SQL backends persist.
        let bytes = serde_json::to_vec(value)
            .map_err(|e| StoreError::internal_with_source("value failed to serialize", e))?;
        if bytes.len() > self.limits.max_value_bytes {
            return Err(StoreError::validation(format!(
                "value of {} bytes exceeds maximum of {} bytes",
                bytes.len(),
                self.limits.max_value_bytes
            )));
        }
        Ok(())
    }

    fn validate_batch_len(&self, len: usize) -> StoreResult<()> {
        if len == 0 {
            return Err(StoreError::validation("batch must not be empty"));
        }
        if len > self.limits.max_batch_size {
            return Err(StoreError::validation(format!(
                "batch of {len} entries exceeds maximum of {} entries",
                self.limits.max_batch_size
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for StorageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageService").field("limits", &self.limits).finish_non_exhaustive()
    }
}

fn validate_ttl(ttl_seconds: Option<i64>) -> StoreResult<()> {
    match ttl_seconds {
        Some(ttl) if ttl < 1 => {
            Err(StoreError::validation("ttlSeconds must be a positive integer"))
        },
        _ => Ok(()),
    }
}

/// Clamps a requested page size into `[1, max]`, defaulting to
/// [`DEFAULT_LIST_LIMIT`] when absent.
fn clamp_limit(limit: Option<i64>, max: i64) -> i64 {
    match limit {
        None => DEFAULT_LIST_LIMIT.min(max),
        Some(l) => l.clamp(1, max),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::absent(None, 50)]
    #[case::zero(Some(0), 1)]
    #[case::negative(Some(-5), 1)]
    #[case::in_range(Some(25), 25)]
    #[case::at_max(Some(100), 100)]
    #[case::over_max(Some(1000), 100)]
    fn clamp_limit_bounds(#[case] requested: Option<i64>, #[case] expected: i64) {
        assert_eq!(clamp_limit(requested, 100), expected);
    }

    #[test]
    fn clamp_limit_default_respects_small_max() {
        assert_eq!(clamp_limit(None, 10), 10);
    }

    #[rstest]
    #[case::positive(Some(1), true)]
    #[case::large(Some(86_400), true)]
    #[case::absent(None, true)]
    #[case::zero(Some(0), false)]
    #[case::negative(Some(-1), false)]
    fn ttl_validation(#[case] ttl: Option<i64>, #[case] ok: bool) {
        assert_eq!(validate_ttl(ttl).is_ok(), ok);
    }

    #[test]
    fn limits_builder_defaults() {
        let limits = ServiceLimits::builder().build();
        assert_eq!(limits.max_key_length(), DEFAULT_MAX_KEY_LENGTH);
        assert_eq!(limits.max_value_bytes(), DEFAULT_MAX_VALUE_BYTES);
        assert_eq!(limits.max_batch_size(), DEFAULT_MAX_BATCH_SIZE);
        assert_eq!(limits.max_list_limit(), DEFAULT_MAX_LIST_LIMIT);
    }
}
