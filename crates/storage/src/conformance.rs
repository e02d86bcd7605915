//! Conformance test suite for [`StorageAdapter`] implementations.
//!
//! Every backend — embedded SQL, remote SQL, relational SQL, key-value, or
//! third-party — must exhibit identical observable semantics. This module
//! provides one public async function per contract property so each adapter
//! crate can run the same suite against a fresh instance:
//!
//! ```no_run
//! use stash_storage::{MemoryAdapter, conformance};
//!
//! #[tokio::test]
//! async fn versions_increment_without_gaps() {
//!     conformance::versions_increment_without_gaps(&MemoryAdapter::new()).await;
//! }
//! ```
//!
//! Each function uses its own scope, so a single backend instance can host
//! the whole suite (see [`run_all`]). The TTL tests sleep past real expiry
//! deadlines and take a little over a second each.
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | Versioning | Gap-free version sequences, ETag shape, created_at retention |
//! | Preconditions | `if_match_version` against current, missing and expired items |
//! | TTL | Lazy expiry, version reset, expiry cleared on plain put |
//! | Delete | Boolean result, idempotence, expired-as-absent |
//! | List | Ordering, prefix filter, exhaustive cursor paging |
//! | Batch | Key-set equality, declaration order, partial failure |
//! | Isolation | No cross-scope visibility |
//! | Concurrency | One winner under guarded-write races, gap-free versions under parallel writers |

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use serde_json::json;
use tokio::task::JoinSet;

use crate::{
    StorageAdapter, cursor,
    error::StoreError,
    types::{DeleteOptions, ListQuery, PutEntry, PutOptions, Scope, StoredItem},
};

static SCOPE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Creates a scope that is unique per invocation, so the suite can run
/// repeatedly against shared, persistent backends without residue from
/// earlier runs.
fn scope(label: &str) -> Scope {
    let seq = SCOPE_SEQ.fetch_add(1, Ordering::Relaxed);
    let nanos =
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
    Scope::new("conformance", label, format!("run-{nanos:x}-{seq}"))
        .expect("conformance scope is valid")
}

fn put_opts(ttl_seconds: Option<i64>, if_match_version: Option<i64>) -> PutOptions {
    PutOptions { ttl_seconds, if_match_version }
}

// ============================================================================
// Versioning
// ============================================================================

/// Successive puts to one key produce versions `1, 2, 3, …` with no gaps,
/// and the ETag always equals the quoted version.
pub async fn versions_increment_without_gaps<A: StorageAdapter>(adapter: &A) {
    let scope = scope("versioning");
    for expected in 1..=5i64 {
        let item = adapter
            .put(&scope, "counter", json!({ "round": expected }), PutOptions::default())
            .await
            .expect("put should succeed");
        assert_eq!(item.version, expected, "version must increment by exactly 1");
        assert_eq!(item.etag(), format!("\"{expected}\""), "etag must be the quoted version");
    }
}

/// A put on an existing item is observed by the next get with the new value
/// and `version = prior + 1`.
pub async fn get_observes_latest_write<A: StorageAdapter>(adapter: &A) {
    let scope = scope("latest-write");
    adapter.put(&scope, "k", json!("first"), PutOptions::default()).await.expect("put");
    adapter.put(&scope, "k", json!("second"), PutOptions::default()).await.expect("put");

    let item = adapter.get(&scope, "k").await.expect("get").expect("item should exist");
    assert_eq!(item.value, json!("second"));
    assert_eq!(item.version, 2);
}

/// `created_at` is preserved across updates while `updated_at` advances.
pub async fn created_at_survives_updates<A: StorageAdapter>(adapter: &A) {
    let scope = scope("created-at");
    let first = adapter.put(&scope, "k", json!(1), PutOptions::default()).await.expect("put");
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let second = adapter.put(&scope, "k", json!(2), PutOptions::default()).await.expect("put");

    assert_eq!(second.created_at, first.created_at, "created_at must survive updates");
    assert!(second.updated_at >= first.updated_at, "updated_at must not go backwards");
    assert!(second.created_at <= second.updated_at);
}

/// The stored value round-trips byte-equal through JSON for every JSON type.
pub async fn values_round_trip<A: StorageAdapter>(adapter: &A) {
    let scope = scope("round-trip");
    let values = [
        json!({"nested": {"flag": true, "count": 3}}),
        json!([1, "two", null, 4.5]),
        json!("plain string"),
        json!(42),
        json!(true),
        json!(null),
    ];
    for (idx, value) in values.iter().enumerate() {
        let key = format!("value-{idx}");
        adapter.put(&scope, &key, value.clone(), PutOptions::default()).await.expect("put");
        let item = adapter.get(&scope, &key).await.expect("get").expect("item");
        assert_eq!(&item.value, value, "value must round-trip unchanged");
    }
}

// ============================================================================
// Preconditions
// ============================================================================

/// A put with a matching `if_match_version` succeeds and bumps the version.
pub async fn if_match_success<A: StorageAdapter>(adapter: &A) {
    let scope = scope("if-match-ok");
    adapter.put(&scope, "k", json!("v1"), PutOptions::default()).await.expect("put");
    let item = adapter
        .put(&scope, "k", json!("v2"), put_opts(None, Some(1)))
        .await
        .expect("matching precondition should succeed");
    assert_eq!(item.version, 2);
}

/// A put with a mismatched `if_match_version` raises a precondition failure
/// and leaves the stored state unchanged.
pub async fn if_match_mismatch_preserves_state<A: StorageAdapter>(adapter: &A) {
    let scope = scope("if-match-mismatch");
    adapter.put(&scope, "k", json!("v1"), PutOptions::default()).await.expect("put");

    let err = adapter
        .put(&scope, "k", json!("clobbered"), put_opts(None, Some(999)))
        .await
        .expect_err("mismatched precondition must fail");
    assert!(matches!(err, StoreError::Precondition { .. }), "got: {err:?}");

    let item = adapter.get(&scope, "k").await.expect("get").expect("item");
    assert_eq!(item.value, json!("v1"), "state must be unchanged after a failed precondition");
    assert_eq!(item.version, 1);
}

/// A put naming a version when no item exists raises a precondition failure.
pub async fn if_match_missing_item_fails<A: StorageAdapter>(adapter: &A) {
    let scope = scope("if-match-missing");
    let err = adapter
        .put(&scope, "ghost", json!(1), put_opts(None, Some(1)))
        .await
        .expect_err("precondition against a missing item must fail");
    assert!(matches!(err, StoreError::Precondition { .. }), "got: {err:?}");
    assert!(adapter.get(&scope, "ghost").await.expect("get").is_none());
}

// ============================================================================
// TTL
// ============================================================================

/// An item written with `ttl_seconds = 1` is gone shortly after, and a
/// subsequent put resets the version to 1.
pub async fn ttl_expiry_resets_version<A: StorageAdapter>(adapter: &A) {
    let scope = scope("ttl-reset");
    let item =
        adapter.put(&scope, "k", json!({"ok": true}), put_opts(Some(1), None)).await.expect("put");
    assert_eq!(item.version, 1);
    assert!(item.expires_at.is_some(), "ttl put must set an expiry");

    assert!(adapter.get(&scope, "k").await.expect("get").is_some(), "item should be live at first");

    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;

    assert!(adapter.get(&scope, "k").await.expect("get").is_none(), "item must expire");

    let fresh =
        adapter.put(&scope, "k", json!({"ok": false}), PutOptions::default()).await.expect("put");
    assert_eq!(fresh.version, 1, "put over an expired row must reset the version");
}

/// A precondition naming the expired item's old version fails: expired means
/// absent.
pub async fn if_match_against_expired_item_fails<A: StorageAdapter>(adapter: &A) {
    let scope = scope("ttl-if-match");
    adapter.put(&scope, "k", json!(1), put_opts(Some(1), None)).await.expect("put");
    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;

    let err = adapter
        .put(&scope, "k", json!(2), put_opts(None, Some(1)))
        .await
        .expect_err("precondition against an expired item must fail");
    assert!(matches!(err, StoreError::Precondition { .. }), "got: {err:?}");
}

/// Updating without a TTL clears any prior expiry.
pub async fn update_without_ttl_clears_expiry<A: StorageAdapter>(adapter: &A) {
    let scope = scope("ttl-clear");
    adapter.put(&scope, "k", json!("temp"), put_opts(Some(1), None)).await.expect("put");
    let updated =
        adapter.put(&scope, "k", json!("permanent"), PutOptions::default()).await.expect("put");
    assert!(updated.expires_at.is_none(), "plain put must clear the expiry");

    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;

    let item = adapter.get(&scope, "k").await.expect("get").expect("item must persist");
    assert_eq!(item.value, json!("permanent"));
}

// ============================================================================
// Delete
// ============================================================================

/// Delete returns `true` for an active item, then `false` once gone; a
/// missing key is never an error.
pub async fn delete_reports_prior_existence<A: StorageAdapter>(adapter: &A) {
    let scope = scope("delete");
    assert!(!adapter.delete(&scope, "none", DeleteOptions::default()).await.expect("delete"));

    adapter.put(&scope, "k", json!(1), PutOptions::default()).await.expect("put");
    assert!(adapter.delete(&scope, "k", DeleteOptions::default()).await.expect("delete"));
    assert!(!adapter.delete(&scope, "k", DeleteOptions::default()).await.expect("delete"));
    assert!(adapter.get(&scope, "k").await.expect("get").is_none());
}

/// Delete with a mismatched version raises a precondition failure and keeps
/// the item.
pub async fn delete_mismatched_version_fails<A: StorageAdapter>(adapter: &A) {
    let scope = scope("delete-if-match");
    adapter.put(&scope, "k", json!(1), PutOptions::default()).await.expect("put");

    let err = adapter
        .delete(&scope, "k", DeleteOptions { if_match_version: Some(5) })
        .await
        .expect_err("mismatched delete precondition must fail");
    assert!(matches!(err, StoreError::Precondition { .. }), "got: {err:?}");
    assert!(adapter.get(&scope, "k").await.expect("get").is_some());
}

/// Delete with a matching version removes the item.
pub async fn delete_matching_version_succeeds<A: StorageAdapter>(adapter: &A) {
    let scope = scope("delete-match");
    adapter.put(&scope, "k", json!(1), PutOptions::default()).await.expect("put");
    adapter.put(&scope, "k", json!(2), put_opts(None, Some(1))).await.expect("put");

    assert!(
        adapter
            .delete(&scope, "k", DeleteOptions { if_match_version: Some(2) })
            .await
            .expect("matching delete should succeed")
    );
    assert!(adapter.get(&scope, "k").await.expect("get").is_none());
}

/// Deleting an expired item returns `false`, as if it never existed.
pub async fn delete_expired_behaves_as_absent<A: StorageAdapter>(adapter: &A) {
    let scope = scope("delete-expired");
    adapter.put(&scope, "k", json!(1), put_opts(Some(1), None)).await.expect("put");
    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;

    assert!(
        !adapter.delete(&scope, "k", DeleteOptions::default()).await.expect("delete"),
        "expired item must delete as absent"
    );
}

// ============================================================================
// List
// ============================================================================

/// List returns active items in ascending lexicographic key order.
pub async fn list_orders_keys_ascending<A: StorageAdapter>(adapter: &A) {
    let scope = scope("list-order");
    for key in ["delta", "alpha", "charlie", "bravo"] {
        adapter.put(&scope, key, json!(key), PutOptions::default()).await.expect("put");
    }

    let page = adapter
        .list(&scope, ListQuery { limit: 10, ..Default::default() })
        .await
        .expect("list");
    let keys: Vec<&str> = page.items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, ["alpha", "bravo", "charlie", "delta"]);
    assert!(page.next_cursor.is_none(), "no further page should exist");
}

/// Paging with successive cursors visits every active key exactly once and
/// terminates with a null cursor.
pub async fn list_paginates_exhaustively<A: StorageAdapter>(adapter: &A) {
    let scope = scope("list-paging");
    let mut expected = Vec::new();
    for idx in 0..7 {
        let key = format!("item-{idx:02}");
        adapter.put(&scope, &key, json!(idx), PutOptions::default()).await.expect("put");
        expected.push(key);
    }

    let mut seen = Vec::new();
    let mut after_key = None;
    loop {
        let page = adapter
            .list(&scope, ListQuery { after_key: after_key.clone(), limit: 3, ..Default::default() })
            .await
            .expect("list");
        assert!(page.items.len() <= 3, "page must respect the limit");
        seen.extend(page.items.iter().map(|i| i.key.clone()));
        match page.next_cursor {
            Some(cursor) => {
                let decoded = cursor::decode(&cursor).expect("cursor must decode");
                assert_eq!(
                    Some(decoded.as_str()),
                    page.items.last().map(|i| i.key.as_str()),
                    "cursor must encode the last emitted key"
                );
                after_key = Some(decoded);
            },
            None => break,
        }
    }
    assert_eq!(seen, expected, "paging must visit every key exactly once");
}

/// The prefix filter returns exactly the keys sharing the prefix.
pub async fn list_filters_by_prefix<A: StorageAdapter>(adapter: &A) {
    let scope = scope("list-prefix");
    for key in ["user:1", "user:2", "other"] {
        adapter.put(&scope, key, json!(key), PutOptions::default()).await.expect("put");
    }

    let page = adapter
        .list(&scope, ListQuery { prefix: Some("user:".to_owned()), limit: 10, ..Default::default() })
        .await
        .expect("list");
    let keys: Vec<&str> = page.items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, ["user:1", "user:2"]);
}

/// Expired items never appear in a listing.
pub async fn list_excludes_expired<A: StorageAdapter>(adapter: &A) {
    let scope = scope("list-expired");
    adapter.put(&scope, "keep-a", json!(1), PutOptions::default()).await.expect("put");
    adapter.put(&scope, "gone", json!(2), put_opts(Some(1), None)).await.expect("put");
    adapter.put(&scope, "keep-b", json!(3), PutOptions::default()).await.expect("put");

    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;

    let page = adapter
        .list(&scope, ListQuery { limit: 10, ..Default::default() })
        .await
        .expect("list");
    let keys: Vec<&str> = page.items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, ["keep-a", "keep-b"], "expired keys must not be listed");
}

// ============================================================================
// Batch
// ============================================================================

/// `batch_get` returns an entry for every requested key, `None` for absent
/// ones; duplicates collapse.
pub async fn batch_get_key_set_equals_input<A: StorageAdapter>(adapter: &A) {
    let scope = scope("batch-get");
    adapter.put(&scope, "a", json!(1), PutOptions::default()).await.expect("put");
    adapter.put(&scope, "b", json!(2), PutOptions::default()).await.expect("put");

    let keys = vec!["a".to_owned(), "b".to_owned(), "missing".to_owned(), "a".to_owned()];
    let result = adapter.batch_get(&scope, &keys).await.expect("batch_get");

    let returned: Vec<&str> = result.keys().map(String::as_str).collect();
    assert_eq!(returned, ["a", "b", "missing"]);
    assert_eq!(result["a"].as_ref().map(|i| i.version), Some(1));
    assert_eq!(result["b"].as_ref().map(|i| i.version), Some(1));
    assert!(result["missing"].is_none());
}

/// `batch_put` applies entries in declaration order and returns every
/// written item.
pub async fn batch_put_applies_in_order<A: StorageAdapter>(adapter: &A) {
    let scope = scope("batch-put");
    let entries = vec![
        PutEntry { key: "x".into(), value: json!(1), options: PutOptions::default() },
        // Same key again: declaration order makes this version 2.
        PutEntry { key: "x".into(), value: json!(2), options: PutOptions::default() },
        PutEntry { key: "y".into(), value: json!(3), options: PutOptions::default() },
    ];
    let result: BTreeMap<String, StoredItem> =
        adapter.batch_put(&scope, &entries).await.expect("batch_put");

    assert_eq!(result["x"].version, 2, "later duplicate entry must win");
    assert_eq!(result["x"].value, json!(2));
    assert_eq!(result["y"].version, 1);
}

/// A mid-batch precondition failure leaves earlier entries committed and
/// later entries unapplied.
pub async fn batch_put_partial_failure_keeps_prefix<A: StorageAdapter>(adapter: &A) {
    let scope = scope("batch-partial");
    let entries = vec![
        PutEntry { key: "first".into(), value: json!(1), options: PutOptions::default() },
        PutEntry { key: "bad".into(), value: json!(2), options: put_opts(None, Some(9)) },
        PutEntry { key: "last".into(), value: json!(3), options: PutOptions::default() },
    ];

    let err = adapter.batch_put(&scope, &entries).await.expect_err("batch must fail mid-way");
    assert!(matches!(err, StoreError::Precondition { .. }), "got: {err:?}");

    assert!(adapter.get(&scope, "first").await.expect("get").is_some(), "prefix stays committed");
    assert!(adapter.get(&scope, "bad").await.expect("get").is_none());
    assert!(adapter.get(&scope, "last").await.expect("get").is_none(), "suffix must not apply");
}

// ============================================================================
// Isolation
// ============================================================================

/// Writes under one scope are invisible to every differing scope.
pub async fn scope_isolation<A: StorageAdapter>(adapter: &A) {
    let base = Scope::new("tenant-a", "ns", "user-1").expect("scope");
    let other_user = Scope::new("tenant-a", "ns", "user-2").expect("scope");
    let other_namespace = Scope::new("tenant-a", "ns2", "user-1").expect("scope");
    let other_tenant = Scope::new("tenant-b", "ns", "user-1").expect("scope");

    adapter.put(&base, "foo", json!({"u": 1}), PutOptions::default()).await.expect("put");
    adapter.put(&other_user, "foo", json!({"u": 2}), PutOptions::default()).await.expect("put");

    assert_eq!(
        adapter.get(&base, "foo").await.expect("get").expect("item").value,
        json!({"u": 1})
    );
    assert_eq!(
        adapter.get(&other_user, "foo").await.expect("get").expect("item").value,
        json!({"u": 2})
    );
    assert!(adapter.get(&other_namespace, "foo").await.expect("get").is_none());
    assert!(adapter.get(&other_tenant, "foo").await.expect("get").is_none());

    let page = adapter
        .list(&other_tenant, ListQuery { limit: 10, ..Default::default() })
        .await
        .expect("list");
    assert!(page.items.is_empty(), "list must not leak across scopes");
}

// ============================================================================
// Health
// ============================================================================

/// A fresh adapter reports a healthy backend.
pub async fn health_reports_ok<A: StorageAdapter>(adapter: &A) {
    let status = adapter.health().await;
    assert!(status.is_ok(), "fresh adapter should be healthy, got: {status}");
}

// ============================================================================
// Concurrency — genuine interleavings, not just upfront mismatches
// ============================================================================

/// Number of concurrent writers in each contention round.
const WRITERS: usize = 12;

/// Number of contention rounds per concurrency test.
const CONTENTION_ROUNDS: usize = 20;

/// Number of unconditional puts each writer performs in the counting test.
const OPS_PER_WRITER: usize = 15;

/// Guarded puts racing on one key: exactly one writer wins each round, every
/// loser gets a precondition failure, and the version advances by exactly 1.
///
/// This is the check-and-write atomicity test: a backend that lets a
/// concurrent writer slip between the precondition check and the write
/// reports more than one winner, or a final version other than 2.
///
/// Requires `A: 'static` so the adapter can be shared across spawned tasks
/// via `Arc`.
pub async fn concurrent_guarded_puts_have_exactly_one_winner<A: StorageAdapter + 'static>(
    adapter: Arc<A>,
) {
    let scope = scope("race-guarded-put");
    for round in 0..CONTENTION_ROUNDS {
        let key = format!("contended-{round:02}");
        let seeded = adapter
            .put(&scope, &key, json!({ "round": round }), PutOptions::default())
            .await
            .expect("seed put");
        assert_eq!(seeded.version, 1);

        let mut set = JoinSet::new();
        for writer in 0..WRITERS {
            let adapter = Arc::clone(&adapter);
            let scope = scope.clone();
            let key = key.clone();
            set.spawn(async move {
                adapter
                    .put(
                        &scope,
                        &key,
                        json!({ "winner": writer }),
                        put_opts(None, Some(1)),
                    )
                    .await
            });
        }

        let mut successes = 0usize;
        let mut preconditions = 0usize;
        while let Some(result) = set.join_next().await {
            match result.expect("task should not panic") {
                Ok(item) => {
                    assert_eq!(item.version, 2, "round {round}: winner must write version 2");
                    successes += 1;
                },
                Err(StoreError::Precondition { .. }) => preconditions += 1,
                Err(e) => panic!("round {round}: unexpected error: {}", e.detail()),
            }
        }
        assert_eq!(successes, 1, "round {round}: exactly one guarded put must win");
        assert_eq!(preconditions, WRITERS - 1, "round {round}: every loser must see a precondition");

        let current = adapter.get(&scope, &key).await.expect("get").expect("item");
        assert_eq!(current.version, 2, "round {round}: version must advance exactly once");
    }
}

/// Guarded deletes racing on one key: exactly one task observes `true`.
///
/// Losers either find the item already gone (`false`) or lose the
/// version race (precondition failure); no interleaving may let two tasks
/// both report a successful removal.
pub async fn concurrent_guarded_deletes_have_exactly_one_winner<A: StorageAdapter + 'static>(
    adapter: Arc<A>,
) {
    let scope = scope("race-guarded-delete");
    for round in 0..CONTENTION_ROUNDS {
        let key = format!("doomed-{round:02}");
        adapter
            .put(&scope, &key, json!({ "round": round }), PutOptions::default())
            .await
            .expect("seed put");

        let mut set = JoinSet::new();
        for _ in 0..WRITERS {
            let adapter = Arc::clone(&adapter);
            let scope = scope.clone();
            let key = key.clone();
            set.spawn(async move {
                adapter.delete(&scope, &key, DeleteOptions { if_match_version: Some(1) }).await
            });
        }

        let mut removed = 0usize;
        let mut already_gone = 0usize;
        while let Some(result) = set.join_next().await {
            match result.expect("task should not panic") {
                Ok(true) => removed += 1,
                Ok(false) | Err(StoreError::Precondition { .. }) => already_gone += 1,
                Err(e) => panic!("round {round}: unexpected error: {}", e.detail()),
            }
        }
        assert_eq!(removed, 1, "round {round}: exactly one delete must report removal");
        assert_eq!(already_gone, WRITERS - 1);
        assert!(
            adapter.get(&scope, &key).await.expect("get").is_none(),
            "round {round}: item must be gone"
        );
    }
}

/// Unconditional puts from many writers: every successful write gets its own
/// version, with no gaps and no duplicates.
///
/// Optimistic backends may exhaust their retry budget under sustained
/// contention (a legal precondition failure); the observed versions of the
/// writes that did succeed must still be exactly `1..=n`.
pub async fn concurrent_unconditional_puts_lose_no_versions<A: StorageAdapter + 'static>(
    adapter: Arc<A>,
) {
    let scope = scope("race-counting");

    let mut set = JoinSet::new();
    for writer in 0..WRITERS {
        let adapter = Arc::clone(&adapter);
        let scope = scope.clone();
        set.spawn(async move {
            let mut versions = Vec::new();
            for op in 0..OPS_PER_WRITER {
                match adapter
                    .put(&scope, "counter", json!({ "writer": writer, "op": op }), PutOptions::default())
                    .await
                {
                    Ok(item) => versions.push(item.version),
                    Err(StoreError::Precondition { .. }) => {},
                    Err(e) => panic!("unexpected error: {}", e.detail()),
                }
            }
            versions
        });
    }

    let mut versions: Vec<i64> = Vec::new();
    while let Some(result) = set.join_next().await {
        versions.extend(result.expect("task should not panic"));
    }
    versions.sort_unstable();
    let expected: Vec<i64> = (1..=versions.len() as i64).collect();
    assert_eq!(versions, expected, "successful writes must produce gap-free, duplicate-free versions");

    let current = adapter.get(&scope, "counter").await.expect("get");
    match versions.last() {
        Some(&top) => {
            assert_eq!(
                current.expect("item").version,
                top,
                "final version must equal the number of successful writes"
            );
        },
        None => assert!(current.is_none(), "no successful write means no item"),
    }
}

// ============================================================================
// Convenience runner
// ============================================================================

/// Runs the full conformance suite, including the concurrency tests,
/// against one adapter instance.
///
/// Each test uses its own scope, so ordering does not matter; the TTL tests
/// dominate the runtime (a bit over a second of sleeping each).
pub async fn run_all<A: StorageAdapter + 'static>(adapter: Arc<A>) {
    versions_increment_without_gaps(adapter.as_ref()).await;
    get_observes_latest_write(adapter.as_ref()).await;
    created_at_survives_updates(adapter.as_ref()).await;
    values_round_trip(adapter.as_ref()).await;

    if_match_success(adapter.as_ref()).await;
    if_match_mismatch_preserves_state(adapter.as_ref()).await;
    if_match_missing_item_fails(adapter.as_ref()).await;

    ttl_expiry_resets_version(adapter.as_ref()).await;
    if_match_against_expired_item_fails(adapter.as_ref()).await;
    update_without_ttl_clears_expiry(adapter.as_ref()).await;

    delete_reports_prior_existence(adapter.as_ref()).await;
    delete_mismatched_version_fails(adapter.as_ref()).await;
    delete_matching_version_succeeds(adapter.as_ref()).await;
    delete_expired_behaves_as_absent(adapter.as_ref()).await;

    list_orders_keys_ascending(adapter.as_ref()).await;
    list_paginates_exhaustively(adapter.as_ref()).await;
    list_filters_by_prefix(adapter.as_ref()).await;
    list_excludes_expired(adapter.as_ref()).await;

    batch_get_key_set_equals_input(adapter.as_ref()).await;
    batch_put_applies_in_order(adapter.as_ref()).await;
    batch_put_partial_failure_keeps_prefix(adapter.as_ref()).await;

    scope_isolation(adapter.as_ref()).await;
    health_reports_ok(adapter.as_ref()).await;

    // Concurrency
    concurrent_guarded_puts_have_exactly_one_winner(Arc::clone(&adapter)).await;
    concurrent_guarded_deletes_have_exactly_one_winner(Arc::clone(&adapter)).await;
    concurrent_unconditional_puts_lose_no_versions(adapter).await;
}
