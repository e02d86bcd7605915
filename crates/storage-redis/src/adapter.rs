//! Redis-backed storage adapter.
//!
//! Each item is one record whose value is a JSON envelope carrying the full
//! [`StoredItem`] (value, version, timestamps, expiry). Redis has no
//! transaction shape that covers a read-check-write cycle, so writes run as
//! optimistic WATCH/MULTI/EXEC transactions: watch the key, read the
//! envelope, check the precondition, queue the write, commit. A nil `EXEC`
//! reply means a concurrent writer won; the cycle is retried up to the
//! configured budget and then surfaced as a precondition failure.
//!
//! Expiry is enforced by the envelope's `expiresAt` on every read
//! (authoritative, with delete-on-read cleanup); the native `EXPIRE` set
//! alongside TTL writes lets Redis itself sweep dead records.

use std::{collections::BTreeMap, time::Instant};

use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, aio::ConnectionManager};
use serde_json::Value;
use stash_storage::{
    DeleteOptions, HealthMetadata, HealthStatus, ListPage, ListQuery, PutEntry, PutOptions, Scope,
    StorageAdapter, StoreError, StoreResult, StoredItem, cursor, expiry_from_ttl,
};

use crate::{
    config::RedisConfig,
    keys,
    retry::{CasOutcome, with_cas_retry},
};

/// Redis implementation of [`StorageAdapter`].
///
/// Plain reads go through a shared [`ConnectionManager`]; optimistic writes
/// open a dedicated connection per call, because `WATCH` state is
/// per-connection and must not be shared with concurrent callers.
///
/// # Example
///
/// ```no_run
/// use stash_storage::StorageAdapter;
/// use stash_storage_redis::{RedisAdapter, RedisConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let adapter =
///     RedisAdapter::new(RedisConfig::builder().url("redis://localhost:6379").build()).await?;
/// assert!(adapter.health().await.is_ok());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisAdapter {
    client: redis::Client,
    manager: ConnectionManager,
    config: RedisConfig,
}

impl RedisAdapter {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] when the URL is invalid or the
    /// initial connection fails.
    pub async fn new(config: RedisConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.url())
            .map_err(|e| StoreError::internal_with_source("invalid redis url", e))?;
        let manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| StoreError::internal_with_source("failed to connect to redis", e))?;
        Ok(Self { client, manager, config })
    }

    /// Opens a dedicated connection for a WATCH-based write.
    async fn watch_connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::internal_with_source("failed to open redis connection", e))
    }
}

fn cmd_err(e: redis::RedisError) -> StoreError {
    StoreError::internal_with_source("redis command failed", e)
}

fn decode_envelope(raw: &str) -> StoreResult<StoredItem> {
    serde_json::from_str(raw)
        .map_err(|e| StoreError::internal_with_source("stored envelope is not valid JSON", e))
}

fn encode_envelope(item: &StoredItem) -> StoreResult<String> {
    serde_json::to_string(item)
        .map_err(|e| StoreError::internal_with_source("envelope failed to serialize", e))
}

#[async_trait]
impl StorageAdapter for RedisAdapter {
    #[tracing::instrument(skip(self, scope, key), fields(key_len = key.len()))]
    async fn get(&self, scope: &Scope, key: &str) -> StoreResult<Option<StoredItem>> {
        let bkey = keys::backend_key(scope, key);
        let mut conn = self.manager.clone();

        let raw: Option<String> = conn.get(&bkey).await.map_err(cmd_err)?;
        let Some(raw) = raw else { return Ok(None) };

        let item = decode_envelope(&raw)?;
        if item.is_active() {
            return Ok(Some(item));
        }
        // Delete-on-read: the envelope has expired, drop the record.
        // Best-effort; the record stays invisible either way.
        if let Err(e) = conn.del::<_, ()>(&bkey).await {
            tracing::debug!(error = %e, "failed to clean up expired record");
        }
        Ok(None)
    }

    #[tracing::instrument(skip(self, scope, key, value), fields(key_len = key.len()))]
    async fn put(
        &self,
        scope: &Scope,
        key: &str,
        value: Value,
        options: PutOptions,
    ) -> StoreResult<StoredItem> {
        let bkey = keys::backend_key(scope, key);
        let conn = self.watch_connection().await?;

        with_cas_retry(self.config.cas_attempts(), self.config.cas_base_delay(), || {
            let mut conn = conn.clone();
            let bkey = bkey.clone();
            let value = value.clone();
            async move {
                redis::cmd("WATCH").arg(&bkey).query_async::<()>(&mut conn).await.map_err(cmd_err)?;

                let raw: Option<String> = conn.get(&bkey).await.map_err(cmd_err)?;
                let now = Utc::now();
                let current = raw
                    .as_deref()
                    .map(decode_envelope)
                    .transpose()?
                    .filter(|item| item.is_active_at(now));

                if let Some(expected) = options.if_match_version {
                    let matches = current.as_ref().is_some_and(|item| item.version == expected);
                    if !matches {
                        // Caller-requested precondition mismatches surface
                        // immediately; only watch conflicts are retried.
                        let actual = current.as_ref().map(|item| item.version);
                        redis::cmd("UNWATCH").query_async::<()>(&mut conn).await.map_err(cmd_err)?;
                        return Err(StoreError::version_mismatch(expected, actual));
                    }
                }

                let item = StoredItem {
                    key: key.to_owned(),
                    value,
                    version: current.as_ref().map_or(1, |item| item.version + 1),
                    created_at: current.as_ref().map_or(now, |item| item.created_at),
                    updated_at: now,
                    expires_at: expiry_from_ttl(now, options.ttl_seconds),
                };
                let payload = encode_envelope(&item)?;

                // SET clears any native TTL, matching "omitting TTL on an
                // update clears the expiry"; EXPIRE re-arms it for TTL
                // writes so Redis can sweep the record itself.
                let mut pipe = redis::pipe();
                pipe.atomic();
                pipe.set(&bkey, &payload);
                if let Some(ttl) = options.ttl_seconds {
                    pipe.expire(&bkey, ttl);
                }

                let exec: Option<redis::Value> =
                    pipe.query_async(&mut conn).await.map_err(cmd_err)?;
                match exec {
                    Some(_) => Ok(CasOutcome::Committed(item)),
                    None => Ok(CasOutcome::Conflict),
                }
            }
        })
        .await
    }

    #[tracing::instrument(skip(self, scope, key), fields(key_len = key.len()))]
    async fn delete(&self, scope: &Scope, key: &str, options: DeleteOptions) -> StoreResult<bool> {
        let bkey = keys::backend_key(scope, key);
        let conn = self.watch_connection().await?;

        with_cas_retry(self.config.cas_attempts(), self.config.cas_base_delay(), || {
            let mut conn = conn.clone();
            let bkey = bkey.clone();
            async move {
                redis::cmd("WATCH").arg(&bkey).query_async::<()>(&mut conn).await.map_err(cmd_err)?;

                let raw: Option<String> = conn.get(&bkey).await.map_err(cmd_err)?;
                let now = Utc::now();
                let current = raw
                    .as_deref()
                    .map(decode_envelope)
                    .transpose()?
                    .filter(|item| item.is_active_at(now));

                let Some(current) = current else {
                    // Absent or expired behaves as if no row exists, even
                    // under a precondition.
                    redis::cmd("UNWATCH").query_async::<()>(&mut conn).await.map_err(cmd_err)?;
                    return Ok(CasOutcome::Committed(false));
                };

                if let Some(expected) = options.if_match_version {
                    if current.version != expected {
                        redis::cmd("UNWATCH").query_async::<()>(&mut conn).await.map_err(cmd_err)?;
                        return Err(StoreError::version_mismatch(expected, Some(current.version)));
                    }
                }

                let mut pipe = redis::pipe();
                pipe.atomic();
                pipe.del(&bkey);
                let exec: Option<redis::Value> =
                    pipe.query_async(&mut conn).await.map_err(cmd_err)?;
                match exec {
                    Some(_) => Ok(CasOutcome::Committed(true)),
                    None => Ok(CasOutcome::Conflict),
                }
            }
        })
        .await
    }

    #[tracing::instrument(skip(self, scope, keys), fields(key_count = keys.len()))]
    async fn batch_get(
        &self,
        scope: &Scope,
        keys: &[String],
    ) -> StoreResult<BTreeMap<String, Option<StoredItem>>> {
        if keys.is_empty() {
            return Ok(BTreeMap::new());
        }
        let bkeys: Vec<String> = keys.iter().map(|key| keys::backend_key(scope, key)).collect();
        let mut conn = self.manager.clone();

        // MGET keeps this a single round trip; `get` with a one-element
        // collection would degrade to a plain GET with different semantics.
        let raws: Vec<Option<String>> =
            redis::cmd("MGET").arg(&bkeys).query_async(&mut conn).await.map_err(cmd_err)?;

        let now = Utc::now();
        let mut result = BTreeMap::new();
        for (key, raw) in keys.iter().zip(raws) {
            let item = raw
                .as_deref()
                .map(decode_envelope)
                .transpose()?
                .filter(|item| item.is_active_at(now));
            result.insert(key.clone(), item);
        }
        Ok(result)
    }

    #[tracing::instrument(skip(self, scope, entries), fields(entry_count = entries.len()))]
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

    #[tracing::instrument(skip(self, scope, query))]
    async fn list(&self, scope: &Scope, query: ListQuery) -> StoreResult<ListPage> {
        let pattern = keys::scan_pattern(scope, query.prefix.as_deref());
        let scope_prefix = keys::scope_prefix(scope);
        let mut conn = self.manager.clone();

        // Full SCAN iteration; a single call only returns one bucket's
        // worth of keys.
        let mut backend_keys: Vec<String> = Vec::new();
        let mut scan_cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(scan_cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.config.scan_count())
                .query_async(&mut conn)
                .await
                .map_err(cmd_err)?;
            backend_keys.extend(batch);
            if next == 0 {
                break;
            }
            scan_cursor = next;
        }

        // SCAN may return duplicates and no ordering; recover item keys,
        // sort, and apply the cursor bound before touching any envelope.
        let mut item_keys: Vec<String> = backend_keys
            .iter()
            .filter_map(|bkey| bkey.strip_prefix(&scope_prefix).map(str::to_owned))
            .collect();
        item_keys.sort();
        item_keys.dedup();
        if let Some(prefix) = &query.prefix {
            item_keys.retain(|key| key.starts_with(prefix.as_str()));
        }
        if let Some(after) = &query.after_key {
            item_keys.retain(|key| key.as_str() > after.as_str());
        }

        let limit = usize::try_from(query.limit.max(0))
            .map_err(|_| StoreError::internal("list limit does not fit in usize"))?;
        let now = Utc::now();
        let mut items: Vec<StoredItem> = Vec::new();
        'chunks: for chunk in item_keys.chunks(self.config.scan_count().max(1)) {
            let bkeys: Vec<String> =
                chunk.iter().map(|key| keys::backend_key(scope, key)).collect();
            let raws: Vec<Option<String>> =
                redis::cmd("MGET").arg(&bkeys).query_async(&mut conn).await.map_err(cmd_err)?;
            for raw in raws {
                let item = raw
                    .as_deref()
                    .map(decode_envelope)
                    .transpose()?
                    .filter(|item| item.is_active_at(now));
                if let Some(item) = item {
                    items.push(item);
                    if items.len() > limit {
                        break 'chunks;
                    }
                }
            }
        }

        let next_cursor = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|item| cursor::encode(&item.key))
        } else {
            None
        };
        Ok(ListPage { items, next_cursor })
    }

    #[tracing::instrument(skip(self))]
    async fn health(&self) -> HealthStatus {
        let start = Instant::now();
        let mut conn = self.manager.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(reply) if reply == "PONG" => {
                HealthStatus::healthy(HealthMetadata::new(start.elapsed(), "redis"))
            },
            Ok(reply) => HealthStatus::unhealthy(
                HealthMetadata::new(start.elapsed(), "redis"),
                format!("unexpected PING reply: {reply}"),
            ),
            Err(e) => HealthStatus::unhealthy(
                HealthMetadata::new(start.elapsed(), "redis"),
                e.to_string(),
            ),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn close(&self) -> StoreResult<()> {
        // The ConnectionManager tears its connection down on drop; there is
        // no explicit close in the client API. Kept for contract symmetry.
        Ok(())
    }
}
