//! Remote SQL-over-HTTP storage adapter on the libsql protocol.
//!
//! The table shape matches the embedded SQLite backend; the difference is
//! that every statement travels over HTTP to a libsql server (Turso or
//! sqld), and guarded writes use the protocol's interactive transactions so
//! the precondition check and the write still share one transactional
//! boundary.
//!
//! The prefix filter deliberately avoids `LIKE`: keys sharing a prefix form
//! a contiguous range in byte order, so `key >= prefix` plus a client-side
//! `starts_with` cut-off is exact, byte-wise, and needs no dialect pragmas
//! on the remote server.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::Utc;
use libsql::params;
use serde_json::Value;
use stash_storage::{
    DeleteOptions, HealthMetadata, HealthStatus, ListPage, ListQuery, PutEntry, PutOptions, Scope,
    StorageAdapter, StoreError, StoreResult, StoredItem, cursor, datetime_from_millis,
    expiry_from_ttl,
};

use crate::config::LibsqlConfig;

/// Idempotent schema, applied on every construction.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS items (
        tenant_id  TEXT NOT NULL,
        namespace  TEXT NOT NULL,
        user_id    TEXT NOT NULL,
        key        TEXT NOT NULL,
        value_json TEXT NOT NULL,
        version    INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        expires_at INTEGER,
        PRIMARY KEY (tenant_id, namespace, user_id, key)
    )",
    "CREATE INDEX IF NOT EXISTS idx_items_expiry
        ON items(expires_at) WHERE expires_at IS NOT NULL",
];

/// Remote libsql implementation of [`StorageAdapter`].
///
/// # Example
///
/// ```no_run
/// use stash_storage::StorageAdapter;
/// use stash_storage_libsql::{LibsqlAdapter, LibsqlConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = LibsqlConfig::builder()
///     .url("libsql://stash-prod.example.turso.io")
///     .auth_token(std::env::var("LIBSQL_AUTH_TOKEN")?)
///     .build();
/// let adapter = LibsqlAdapter::new(config).await?;
/// assert!(adapter.health().await.is_ok());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LibsqlAdapter {
    db: Arc<libsql::Database>,
}

impl LibsqlAdapter {
    /// Connects to the remote database and applies the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] if the database handle cannot be
    /// built or the schema cannot be applied.
    pub async fn new(config: LibsqlConfig) -> StoreResult<Self> {
        let db = libsql::Builder::new_remote(config.url.clone(), config.auth_token.clone())
            .build()
            .await
            .map_err(|e| StoreError::internal_with_source("failed to build libsql database", e))?;
        let adapter = Self { db: Arc::new(db) };

        let conn = adapter.connect()?;
        for statement in SCHEMA {
            conn.execute(statement, ())
                .await
                .map_err(|e| StoreError::internal_with_source("failed to apply schema", e))?;
        }
        Ok(adapter)
    }

    /// Opens a connection handle. For remote databases this is cheap; each
    /// operation uses its own handle so interactive transactions never
    /// interleave.
    fn connect(&self) -> StoreResult<libsql::Connection> {
        self.db
            .connect()
            .map_err(|e| StoreError::internal_with_source("failed to open libsql connection", e))
    }
}

fn db_err(e: libsql::Error) -> StoreError {
    StoreError::internal_with_source("libsql query failed", e)
}

fn decode_value(raw: &str) -> StoreResult<Value> {
    serde_json::from_str(raw)
        .map_err(|e| StoreError::internal_with_source("stored value is not valid JSON", e))
}

/// Builds a [`StoredItem`] from a row of `value_json, version, created_at,
/// updated_at, expires_at` columns starting at `base` (the columns before
/// it, e.g. `key`, vary by query).
fn item_from_row(key: &str, row: &libsql::Row, base: i32) -> StoreResult<StoredItem> {
    Ok(StoredItem {
        key: key.to_owned(),
        value: decode_value(&row.get::<String>(base).map_err(db_err)?)?,
        version: row.get::<i64>(base + 1).map_err(db_err)?,
        created_at: datetime_from_millis(row.get::<i64>(base + 2).map_err(db_err)?)?,
        updated_at: datetime_from_millis(row.get::<i64>(base + 3).map_err(db_err)?)?,
        expires_at: row
            .get::<Option<i64>>(base + 4)
            .map_err(db_err)?
            .map(datetime_from_millis)
            .transpose()?,
    })
}

#[async_trait]
impl StorageAdapter for LibsqlAdapter {
    #[tracing::instrument(skip(self, scope, key), fields(key_len = key.len()))]
    async fn get(&self, scope: &Scope, key: &str) -> StoreResult<Option<StoredItem>> {
        let now_ms = Utc::now().timestamp_millis();
        let conn = self.connect()?;

        let mut rows = conn
            .query(
                "SELECT value_json, version, created_at, updated_at, expires_at FROM items
                 WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?
                   AND (expires_at IS NULL OR expires_at > ?)",
                params![
                    scope.tenant_id(),
                    scope.namespace(),
                    scope.user_id(),
                    key,
                    now_ms
                ],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(item_from_row(key, &row, 0)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self, scope, key, value), fields(key_len = key.len()))]
    async fn put(
        &self,
        scope: &Scope,
        key: &str,
        value: Value,
        options: PutOptions,
    ) -> StoreResult<StoredItem> {
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let expires_at = expiry_from_ttl(now, options.ttl_seconds);
        let expires_ms = expires_at.map(|e| e.timestamp_millis());
        let value_json = serde_json::to_string(&value)
            .map_err(|e| StoreError::internal_with_source("value failed to serialize", e))?;
        let conn = self.connect()?;

        if let Some(expected) = options.if_match_version {
            // Immediate interactive transaction: the write lock is taken up
            // front, so the precondition check and the write cannot
            // interleave with a concurrent writer. Dropping the transaction
            // on an early return rolls it back.
            let tx = conn
                .transaction_with_behavior(libsql::TransactionBehavior::Immediate)
                .await
                .map_err(db_err)?;

            let mut rows = tx
                .query(
                    "SELECT version, created_at FROM items
                     WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?
                       AND (expires_at IS NULL OR expires_at > ?)",
                    params![
                        scope.tenant_id(),
                        scope.namespace(),
                        scope.user_id(),
                        key,
                        now_ms
                    ],
                )
                .await
                .map_err(db_err)?;

            let Some(current) = rows.next().await.map_err(db_err)? else {
                return Err(StoreError::version_mismatch(expected, None));
            };
            let current_version = current.get::<i64>(0).map_err(db_err)?;
            if current_version != expected {
                return Err(StoreError::version_mismatch(expected, Some(current_version)));
            }
            let created_at = datetime_from_millis(current.get::<i64>(1).map_err(db_err)?)?;

            let updated = tx
                .execute(
                    "UPDATE items
                     SET value_json = ?, version = version + 1, updated_at = ?, expires_at = ?
                     WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?
                       AND version = ?",
                    params![
                        value_json.as_str(),
                        now_ms,
                        expires_ms,
                        scope.tenant_id(),
                        scope.namespace(),
                        scope.user_id(),
                        key,
                        expected
                    ],
                )
                .await
                .map_err(db_err)?;
            if updated != 1 {
                return Err(StoreError::precondition("item was modified concurrently"));
            }
            tx.commit().await.map_err(db_err)?;

            return Ok(StoredItem {
                key: key.to_owned(),
                value,
                version: expected + 1,
                created_at,
                updated_at: now,
                expires_at,
            });
        }

        // Unconditional upsert; the CASE arms reset version and created_at
        // when the existing row has expired.
        let mut rows = conn
            .query(
                "INSERT INTO items
                     (tenant_id, namespace, user_id, key, value_json,
                      version, created_at, updated_at, expires_at)
                 VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)
                 ON CONFLICT(tenant_id, namespace, user_id, key) DO UPDATE SET
                     value_json = excluded.value_json,
                     version = CASE
                         WHEN items.expires_at IS NOT NULL
                              AND items.expires_at <= excluded.updated_at THEN 1
                         ELSE items.version + 1
                     END,
                     created_at = CASE
                         WHEN items.expires_at IS NOT NULL
                              AND items.expires_at <= excluded.updated_at THEN excluded.created_at
                         ELSE items.created_at
                     END,
                     updated_at = excluded.updated_at,
                     expires_at = excluded.expires_at
                 RETURNING version, created_at",
                params![
                    scope.tenant_id(),
                    scope.namespace(),
                    scope.user_id(),
                    key,
                    value_json.as_str(),
                    now_ms,
                    now_ms,
                    expires_ms
                ],
            )
            .await
            .map_err(db_err)?;

        let row = rows
            .next()
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::internal("upsert returned no row"))?;
        Ok(StoredItem {
            key: key.to_owned(),
            value,
            version: row.get::<i64>(0).map_err(db_err)?,
            created_at: datetime_from_millis(row.get::<i64>(1).map_err(db_err)?)?,
            updated_at: now,
            expires_at,
        })
    }

    #[tracing::instrument(skip(self, scope, key), fields(key_len = key.len()))]
    async fn delete(&self, scope: &Scope, key: &str, options: DeleteOptions) -> StoreResult<bool> {
        let now_ms = Utc::now().timestamp_millis();
        let conn = self.connect()?;

        if let Some(expected) = options.if_match_version {
            let tx = conn
                .transaction_with_behavior(libsql::TransactionBehavior::Immediate)
                .await
                .map_err(db_err)?;

            let mut rows = tx
                .query(
                    "SELECT version FROM items
                     WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?
                       AND (expires_at IS NULL OR expires_at > ?)",
                    params![
                        scope.tenant_id(),
                        scope.namespace(),
                        scope.user_id(),
                        key,
                        now_ms
                    ],
                )
                .await
                .map_err(db_err)?;

            let Some(current) = rows.next().await.map_err(db_err)? else {
                return Ok(false);
            };
            let current_version = current.get::<i64>(0).map_err(db_err)?;
            if current_version != expected {
                return Err(StoreError::version_mismatch(expected, Some(current_version)));
            }

            let deleted = tx
                .execute(
                    "DELETE FROM items
                     WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?
                       AND version = ?",
                    params![scope.tenant_id(), scope.namespace(), scope.user_id(), key, expected],
                )
                .await
                .map_err(db_err)?;
            if deleted != 1 {
                return Err(StoreError::precondition("item was modified concurrently"));
            }
            tx.commit().await.map_err(db_err)?;
            return Ok(true);
        }

        let deleted = conn
            .execute(
                "DELETE FROM items
                 WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?
                   AND (expires_at IS NULL OR expires_at > ?)",
                params![scope.tenant_id(), scope.namespace(), scope.user_id(), key, now_ms],
            )
            .await
            .map_err(db_err)?;
        Ok(deleted > 0)
    }

    #[tracing::instrument(skip(self, scope, keys), fields(key_count = keys.len()))]
    async fn batch_get(
        &self,
        scope: &Scope,
        keys: &[String],
    ) -> StoreResult<BTreeMap<String, Option<StoredItem>>> {
        let mut result = BTreeMap::new();
        for key in keys {
            result.insert(key.clone(), self.get(scope, key).await?);
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
        let now_ms = Utc::now().timestamp_millis();
        let conn = self.connect()?;

        // Keys sharing a prefix are contiguous in byte order: fetch from the
        // prefix's lower bound and stop at the first non-matching key.
        let lower_bound = query.prefix.clone().unwrap_or_default();
        let mut rows = conn
            .query(
                "SELECT key, value_json, version, created_at, updated_at, expires_at FROM items
                 WHERE tenant_id = ? AND namespace = ? AND user_id = ?
                   AND (expires_at IS NULL OR expires_at > ?)
                   AND key >= ?
                   AND (? IS NULL OR key > ?)
                 ORDER BY key ASC
                 LIMIT ?",
                params![
                    scope.tenant_id(),
                    scope.namespace(),
                    scope.user_id(),
                    now_ms,
                    lower_bound.as_str(),
                    query.after_key.as_deref(),
                    query.after_key.as_deref(),
                    query.limit + 1
                ],
            )
            .await
            .map_err(db_err)?;

        let limit = usize::try_from(query.limit.max(0))
            .map_err(|_| StoreError::internal("list limit does not fit in usize"))?;
        let mut items: Vec<StoredItem> = Vec::new();
        let mut overflow = false;
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let key = row.get::<String>(0).map_err(db_err)?;
            if let Some(prefix) = &query.prefix {
                if !key.starts_with(prefix.as_str()) {
                    // Past the contiguous prefix block; nothing further can
                    // match.
                    break;
                }
            }
            if items.len() == limit {
                overflow = true;
                break;
            }
            items.push(item_from_row(&key, &row, 1)?);
        }

        let next_cursor = if overflow {
            items.last().map(|item| cursor::encode(&item.key))
        } else {
            None
        };
        Ok(ListPage { items, next_cursor })
    }

    #[tracing::instrument(skip(self))]
    async fn health(&self) -> HealthStatus {
        let start = Instant::now();
        let check = async {
            let conn = self.connect()?;
            let mut rows = conn.query("SELECT 1", ()).await.map_err(db_err)?;
            rows.next().await.map_err(db_err)
        };
        match check.await {
            Ok(Some(_)) => HealthStatus::healthy(HealthMetadata::new(start.elapsed(), "libsql")),
            Ok(None) => HealthStatus::unhealthy(
                HealthMetadata::new(start.elapsed(), "libsql"),
                "SELECT 1 returned no rows".to_owned(),
            ),
            Err(e) => HealthStatus::unhealthy(
                HealthMetadata::new(start.elapsed(), "libsql"),
                e.detail(),
            ),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn close(&self) -> StoreResult<()> {
        // Remote connections are per-request HTTP exchanges; the handle
        // holds no pooled sockets to drain. Kept for contract symmetry.
        Ok(())
    }
}
