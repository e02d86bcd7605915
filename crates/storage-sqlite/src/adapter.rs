//! SQLite-backed storage adapter.
//!
//! Items live in a single `items` table with the composite primary key
//! `(tenant_id, namespace, user_id, key)`. Timestamps are stored as epoch
//! milliseconds; expiry is filtered on every read (`expires_at IS NULL OR
//! expires_at > now`) and a partial index on `expires_at` is kept for future
//! sweepers. An unconditional put is a single `INSERT … ON CONFLICT DO
//! UPDATE` whose `CASE` arms implement the version-reset-on-expired rule; a
//! guarded put shares a transaction between the precondition check and the
//! write.

use std::{collections::BTreeMap, time::Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};
use stash_storage::{
    DeleteOptions, HealthMetadata, HealthStatus, ListPage, ListQuery, PutEntry, PutOptions, Scope,
    StorageAdapter, StoreError, StoreResult, StoredItem, cursor, datetime_from_millis,
    expiry_from_ttl,
};

use crate::config::SqliteConfig;

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

/// SQLite implementation of [`StorageAdapter`].
///
/// # Example
///
/// ```no_run
/// use stash_storage::StorageAdapter;
/// use stash_storage_sqlite::{SqliteAdapter, SqliteConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let adapter =
///     SqliteAdapter::new(SqliteConfig::builder().path("/tmp/stash.db").build()).await?;
/// let status = adapter.health().await;
/// assert!(status.is_ok());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SqliteAdapter {
    pool: SqlitePool,
}

impl SqliteAdapter {
    /// Opens (and if needed creates) the database and applies the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] if the database cannot be opened or
    /// the schema cannot be applied.
    pub async fn new(config: SqliteConfig) -> StoreResult<Self> {
        let mut options = SqliteConnectOptions::new()
            .filename(config.path())
            .create_if_missing(config.create_if_missing())
            .busy_timeout(config.busy_timeout())
            // SQLite's LIKE is case-insensitive for ASCII by default, which
            // would corrupt the prefix filter.
            .pragma("case_sensitive_like", "ON");
        if config.path() != ":memory:" {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections())
            .connect_with(options)
            .await
            .map_err(|e| StoreError::internal_with_source("failed to open sqlite database", e))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| StoreError::internal_with_source("failed to apply schema", e))?;
        }

        Ok(Self { pool })
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::internal_with_source("sqlite query failed", e)
}

fn decode_value(raw: &str) -> StoreResult<Value> {
    serde_json::from_str(raw)
        .map_err(|e| StoreError::internal_with_source("stored value is not valid JSON", e))
}

/// Builds a [`StoredItem`] from a row of `value_json, version, created_at,
/// updated_at, expires_at` columns.
fn item_from_row(key: &str, row: &SqliteRow) -> StoreResult<StoredItem> {
    Ok(StoredItem {
        key: key.to_owned(),
        value: decode_value(row.get::<&str, _>("value_json"))?,
        version: row.get::<i64, _>("version"),
        created_at: datetime_from_millis(row.get::<i64, _>("created_at"))?,
        updated_at: datetime_from_millis(row.get::<i64, _>("updated_at"))?,
        expires_at: row
            .get::<Option<i64>, _>("expires_at")
            .map(datetime_from_millis)
            .transpose()?,
    })
}

/// Escapes `%`, `_` and `\` in a prefix and appends the wildcard, for use
/// with `LIKE … ESCAPE '\'`.
fn like_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl StorageAdapter for SqliteAdapter {
    #[tracing::instrument(skip(self, scope, key), fields(key_len = key.len()))]
    async fn get(&self, scope: &Scope, key: &str) -> StoreResult<Option<StoredItem>> {
        let now_ms = Utc::now().timestamp_millis();
        let row = sqlx::query(
            "SELECT value_json, version, created_at, updated_at, expires_at FROM items
             WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?
               AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(scope.tenant_id())
        .bind(scope.namespace())
        .bind(scope.user_id())
        .bind(key)
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|row| item_from_row(key, &row)).transpose()
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

        if let Some(expected) = options.if_match_version {
            // Guarded update: an immediate transaction takes the write lock
            // up front, so the precondition check and the write cannot
            // interleave with a concurrent writer (a deferred transaction
            // would fail its lock upgrade with a stale snapshot instead).
            let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await.map_err(db_err)?;

            let current = sqlx::query(
                "SELECT version, created_at FROM items
                 WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?
                   AND (expires_at IS NULL OR expires_at > ?)",
            )
            .bind(scope.tenant_id())
            .bind(scope.namespace())
            .bind(scope.user_id())
            .bind(key)
            .bind(now_ms)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

            let Some(current) = current else {
                return Err(StoreError::version_mismatch(expected, None));
            };
            let current_version = current.get::<i64, _>("version");
            if current_version != expected {
                return Err(StoreError::version_mismatch(expected, Some(current_version)));
            }

            let updated = sqlx::query(
                "UPDATE items
                 SET value_json = ?, version = version + 1, updated_at = ?, expires_at = ?
                 WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?
                   AND version = ?",
            )
            .bind(&value_json)
            .bind(now_ms)
            .bind(expires_ms)
            .bind(scope.tenant_id())
            .bind(scope.namespace())
            .bind(scope.user_id())
            .bind(key)
            .bind(expected)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            if updated.rows_affected() != 1 {
                return Err(StoreError::precondition("item was modified concurrently"));
            }
            tx.commit().await.map_err(db_err)?;

            return Ok(StoredItem {
                key: key.to_owned(),
                value,
                version: expected + 1,
                created_at: datetime_from_millis(current.get::<i64, _>("created_at"))?,
                updated_at: now,
                expires_at,
            });
        }

        // Unconditional upsert in one statement. The CASE arms treat an
        // expired row as absent: version resets to 1 and created_at becomes
        // the write time.
        let row = sqlx::query(
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
        )
        .bind(scope.tenant_id())
        .bind(scope.namespace())
        .bind(scope.user_id())
        .bind(key)
        .bind(&value_json)
        .bind(now_ms)
        .bind(now_ms)
        .bind(expires_ms)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(StoredItem {
            key: key.to_owned(),
            value,
            version: row.get::<i64, _>("version"),
            created_at: datetime_from_millis(row.get::<i64, _>("created_at"))?,
            updated_at: now,
            expires_at,
        })
    }

    #[tracing::instrument(skip(self, scope, key), fields(key_len = key.len()))]
    async fn delete(&self, scope: &Scope, key: &str, options: DeleteOptions) -> StoreResult<bool> {
        let now_ms = Utc::now().timestamp_millis();

        if let Some(expected) = options.if_match_version {
            let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await.map_err(db_err)?;

            let current = sqlx::query(
                "SELECT version FROM items
                 WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?
                   AND (expires_at IS NULL OR expires_at > ?)",
            )
            .bind(scope.tenant_id())
            .bind(scope.namespace())
            .bind(scope.user_id())
            .bind(key)
            .bind(now_ms)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

            // Absent or expired behaves as if no row exists: false, never an
            // error, even under a precondition.
            let Some(current) = current else { return Ok(false) };
            let current_version = current.get::<i64, _>("version");
            if current_version != expected {
                return Err(StoreError::version_mismatch(expected, Some(current_version)));
            }

            let deleted = sqlx::query(
                "DELETE FROM items
                 WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?
                   AND version = ?",
            )
            .bind(scope.tenant_id())
            .bind(scope.namespace())
            .bind(scope.user_id())
            .bind(key)
            .bind(expected)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            if deleted.rows_affected() != 1 {
                return Err(StoreError::precondition("item was modified concurrently"));
            }
            tx.commit().await.map_err(db_err)?;
            return Ok(true);
        }

        let deleted = sqlx::query(
            "DELETE FROM items
             WHERE tenant_id = ? AND namespace = ? AND user_id = ? AND key = ?
               AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(scope.tenant_id())
        .bind(scope.namespace())
        .bind(scope.user_id())
        .bind(key)
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(deleted.rows_affected() > 0)
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
        let pattern = query.prefix.as_deref().map(like_pattern);

        // Over-fetch one row: the extra active row is exactly the evidence
        // needed to decide next_cursor.
        let rows = sqlx::query(
            "SELECT key, value_json, version, created_at, updated_at, expires_at FROM items
             WHERE tenant_id = ? AND namespace = ? AND user_id = ?
               AND (expires_at IS NULL OR expires_at > ?)
               AND (? IS NULL OR key LIKE ? ESCAPE '\\')
               AND (? IS NULL OR key > ?)
             ORDER BY key ASC
             LIMIT ?",
        )
        .bind(scope.tenant_id())
        .bind(scope.namespace())
        .bind(scope.user_id())
        .bind(now_ms)
        .bind(pattern.as_deref())
        .bind(pattern.as_deref())
        .bind(query.after_key.as_deref())
        .bind(query.after_key.as_deref())
        .bind(query.limit + 1)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let limit = usize::try_from(query.limit.max(0))
            .map_err(|_| StoreError::internal("list limit does not fit in usize"))?;
        let mut items = rows
            .iter()
            .map(|row| item_from_row(row.get::<&str, _>("key"), row))
            .collect::<StoreResult<Vec<_>>>()?;

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
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => HealthStatus::healthy(
                HealthMetadata::new(start.elapsed(), "sqlite")
                    .with_detail("pool_size", self.pool.size().to_string()),
            ),
            Err(e) => HealthStatus::unhealthy(
                HealthMetadata::new(start.elapsed(), "sqlite"),
                e.to_string(),
            ),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn close(&self) -> StoreResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("user:"), "user:%");
        assert_eq!(like_pattern("100%"), "100\\%%");
        assert_eq!(like_pattern("a_b"), "a\\_b%");
        assert_eq!(like_pattern("back\\slash"), "back\\\\slash%");
    }

    #[test]
    fn like_pattern_on_empty_prefix_matches_everything() {
        assert_eq!(like_pattern(""), "%");
    }
}
