//! Storage adapter trait definition.
//!
//! This module defines the [`StorageAdapter`] trait, the single capability
//! set that every backend implements with identical observable semantics.
//! The four production adapters (SQLite, libsql-over-HTTP, PostgreSQL,
//! Redis) live in their own crates; [`MemoryAdapter`](crate::MemoryAdapter)
//! is the in-crate reference implementation.
//!
//! # Design Philosophy
//!
//! - **The adapter is the semantic layer**: expiry filtering, version
//!   arithmetic and precondition checks all happen here, so the service on
//!   top stays a pure validator.
//! - **Async by default**: every operation may suspend at an I/O boundary.
//! - **Scoped**: no operation crosses a [`Scope`]; the composite primary key
//!   `(tenant_id, namespace, user_id, key)` is identical on every backend.
//!
//! # Implementing an Adapter
//!
//! 1. Implement [`StorageAdapter`], mapping backend errors to [`StoreError`](crate::StoreError).
//! 2. Create the schema (or equivalent) idempotently on first use, including
//!    the expiry index.
//! 3. Run the [`conformance`](crate::conformance) suite against the new
//!    adapter to prove contract compliance.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    error::StoreResult,
    health::HealthStatus,
    types::{DeleteOptions, ListPage, ListQuery, PutEntry, PutOptions, Scope, StoredItem},
};

/// Abstract storage backend for scoped, versioned JSON items.
///
/// Adapters are `Send + Sync` and safe for concurrent invocation; each
/// instance exclusively owns its backend connection(s) or pool.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageAdapter::get) | Fetch the active item for a key |
/// | [`put`](StorageAdapter::put) | Create or update an item, optionally guarded by a version precondition |
/// | [`delete`](StorageAdapter::delete) | Remove an item, optionally guarded |
/// | [`batch_get`](StorageAdapter::batch_get) | Fetch many keys at once |
/// | [`batch_put`](StorageAdapter::batch_put) | Apply many puts in declaration order |
/// | [`list`](StorageAdapter::list) | Page through active items in key order |
/// | [`health`](StorageAdapter::health) | Round-trip the backend |
/// | [`close`](StorageAdapter::close) | Release backend resources |
///
/// # Expiry
///
/// An item is *active* iff its expiry is unset or strictly in the future.
/// Non-active items are invisible to `get`, `batch_get` and `list`; they may
/// linger physically until overwritten or swept. A `put` that lands on an
/// expired row behaves as a fresh insert: version resets to 1 and
/// `created_at` becomes the write time.
///
/// # Ordering
///
/// Per primary key, writes are linearisable: a `put` that returned version
/// `v` is observed by all subsequently-started reads as at least `v`. No
/// ordering is guaranteed across distinct keys, and `batch_get` is not a
/// snapshot.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Fetches the active item for `key`, or `None` when the key is absent
    /// or expired.
    ///
    /// Adapters MAY opportunistically delete an expired row they encounter.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, scope: &Scope, key: &str) -> StoreResult<Option<StoredItem>>;

    /// Creates or updates the item at `key`.
    ///
    /// With `if_match_version` set, the write requires an active item whose
    /// version equals it; otherwise a precondition failure is raised and the
    /// stored state is untouched. Without it, the write is an unconditional
    /// upsert. The new version is `current + 1` for an in-place update and
    /// `1` for a fresh insert (including over an expired row). The
    /// precondition check and the write are atomic: no interleaving with a
    /// concurrent writer is observable.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn put(
        &self,
        scope: &Scope,
        key: &str,
        value: Value,
        options: PutOptions,
    ) -> StoreResult<StoredItem>;

    /// Removes the item at `key`.
    ///
    /// Returns `Ok(false)` when no active item exists (absent or expired),
    /// never an error. With `if_match_version` set, a mismatch against an
    /// existing active item raises a precondition failure.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, scope: &Scope, key: &str, options: DeleteOptions) -> StoreResult<bool>;

    /// Fetches many keys at once.
    ///
    /// The result contains an entry for every requested key — `None` for
    /// absent or expired items — so the result key set equals the input key
    /// set (duplicates collapse). Distinct keys may reflect different points
    /// in time; this is not a snapshot read.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn batch_get(
        &self,
        scope: &Scope,
        keys: &[String],
    ) -> StoreResult<BTreeMap<String, Option<StoredItem>>>;

    /// Applies [`put`](StorageAdapter::put) per entry in declaration order.
    ///
    /// NOT transactional across entries: the first failure aborts the
    /// remainder and earlier entries stay committed.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn batch_put(
        &self,
        scope: &Scope,
        entries: &[PutEntry],
    ) -> StoreResult<BTreeMap<String, StoredItem>>;

    /// Returns up to `limit` active items in ascending lexicographic key
    /// order, filtered by prefix and resuming strictly after `after_key`.
    ///
    /// `next_cursor` is non-null iff at least one active key strictly
    /// greater than the last emitted key exists; it encodes that last key.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn list(&self, scope: &Scope, query: ListQuery) -> StoreResult<ListPage>;

    /// Performs a lightweight round-trip to the backend.
    ///
    /// Never fails; backend trouble is reported as
    /// [`HealthStatus::Unhealthy`] with a diagnostic reason.
    async fn health(&self) -> HealthStatus;

    /// Releases backend resources.
    ///
    /// Idempotent; no pending work remains after it returns.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn close(&self) -> StoreResult<()>;
}
