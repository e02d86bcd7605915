//! End-to-end scenarios and boundary tests for [`StorageService`] over the
//! in-memory adapter.

use std::sync::Arc;

use serde_json::json;
use stash_storage::{
    BatchPutItem, ListOptions, MemoryAdapter, RemoveItemOptions, Scope, ServiceLimits,
    SetItemOptions, StorageService, StoreError,
};

fn service() -> StorageService {
    StorageService::new(Arc::new(MemoryAdapter::new()))
}

fn scope() -> Scope {
    Scope::new("default", "ns", "u1").expect("scope")
}

fn set_opts(ttl_seconds: Option<i64>, if_match: Option<&str>) -> SetItemOptions {
    SetItemOptions { ttl_seconds, if_match: if_match.map(str::to_owned) }
}

// ============================================================================
// Scenario: create, update with preconditions, delete
// ============================================================================

#[tokio::test]
async fn create_update_delete_lifecycle() {
    let service = service();
    let scope = scope();

    let created = service
        .set_item(&scope, "alpha", json!({"enabled": true}), SetItemOptions::default())
        .await
        .expect("create");
    assert_eq!(created.version, 1);
    assert_eq!(created.etag(), "\"1\"");

    let fetched = service.get_item(&scope, "alpha").await.expect("get").expect("item");
    assert_eq!(fetched.value, json!({"enabled": true}));

    let err = service
        .set_item(&scope, "alpha", json!({"enabled": false}), set_opts(None, Some("\"999\"")))
        .await
        .expect_err("stale precondition must fail");
    assert!(matches!(err, StoreError::Precondition { .. }), "got: {err:?}");
    let unchanged = service.get_item(&scope, "alpha").await.expect("get").expect("item");
    assert_eq!(unchanged.value, json!({"enabled": true}), "state unchanged after 412");

    let updated = service
        .set_item(&scope, "alpha", json!({"enabled": false}), set_opts(None, Some("\"1\"")))
        .await
        .expect("matching precondition");
    assert_eq!(updated.version, 2);

    let removed = service
        .remove_item(
            &scope,
            "alpha",
            RemoveItemOptions { if_match: Some("\"2\"".to_owned()) },
        )
        .await
        .expect("delete");
    assert!(removed);
    assert!(service.get_item(&scope, "alpha").await.expect("get").is_none());
}

// ============================================================================
// Scenario: TTL expiry
// ============================================================================

#[tokio::test]
async fn ttl_expiry_and_version_reset() {
    let service = service();
    let scope = scope();

    service
        .set_item(&scope, "ephemeral", json!({"ok": true}), set_opts(Some(1), None))
        .await
        .expect("put with ttl");

    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;

    assert!(service.get_item(&scope, "ephemeral").await.expect("get").is_none());

    let fresh = service
        .set_item(&scope, "ephemeral", json!({"ok": false}), SetItemOptions::default())
        .await
        .expect("re-put");
    assert_eq!(fresh.version, 1, "version must reset after expiry");
}

// ============================================================================
// Scenario: pagination
// ============================================================================

#[tokio::test]
async fn pagination_walks_all_keys() {
    let service = service();
    let scope = scope();
    for key in ["a", "b", "c", "d"] {
        service.set_item(&scope, key, json!(key), SetItemOptions::default()).await.expect("put");
    }

    let first = service
        .list(&scope, ListOptions { limit: Some(2), ..Default::default() })
        .await
        .expect("list");
    let keys: Vec<&str> = first.items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, ["a", "b"]);
    let cursor = first.next_cursor.expect("more pages exist");

    let second = service
        .list(&scope, ListOptions { cursor: Some(cursor), limit: Some(2), ..Default::default() })
        .await
        .expect("list");
    let keys: Vec<&str> = second.items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, ["c", "d"]);
    assert!(second.next_cursor.is_none());
}

// ============================================================================
// Scenario: prefix filter
// ============================================================================

#[tokio::test]
async fn prefix_filter() {
    let service = service();
    let scope = scope();
    for key in ["user:1", "user:2", "other"] {
        service.set_item(&scope, key, json!(key), SetItemOptions::default()).await.expect("put");
    }

    let page = service
        .list(
            &scope,
            ListOptions { prefix: Some("user:".to_owned()), limit: Some(10), ..Default::default() },
        )
        .await
        .expect("list");
    let keys: Vec<&str> = page.items.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, ["user:1", "user:2"]);
}

// ============================================================================
// Scenario: scope isolation
// ============================================================================

#[tokio::test]
async fn per_user_isolation() {
    let service = service();
    let user_1 = Scope::new("t", "n", "user-1").expect("scope");
    let user_2 = Scope::new("t", "n", "user-2").expect("scope");

    service.set_item(&user_1, "foo", json!({"u": 1}), SetItemOptions::default()).await.expect("put");
    service.set_item(&user_2, "foo", json!({"u": 2}), SetItemOptions::default()).await.expect("put");

    let for_1 = service.get_item(&user_1, "foo").await.expect("get").expect("item");
    let for_2 = service.get_item(&user_2, "foo").await.expect("get").expect("item");
    assert_eq!(for_1.value, json!({"u": 1}));
    assert_eq!(for_2.value, json!({"u": 2}));
}

// ============================================================================
// Scenario: mixed batch
// ============================================================================

#[tokio::test]
async fn batch_put_then_mixed_batch_get() {
    let service = service();
    let scope = scope();

    let written = service
        .batch_put(
            &scope,
            vec![
                BatchPutItem { key: "a".into(), value: json!(1), ttl_seconds: None, if_match: None },
                BatchPutItem { key: "b".into(), value: json!(2), ttl_seconds: None, if_match: None },
            ],
        )
        .await
        .expect("batch_put");
    assert_eq!(written.len(), 2);

    let result = service
        .batch_get(&scope, &["a".to_owned(), "b".to_owned(), "c".to_owned()])
        .await
        .expect("batch_get");
    assert_eq!(result["a"].as_ref().map(|i| i.value.clone()), Some(json!(1)));
    assert_eq!(result["b"].as_ref().map(|i| i.value.clone()), Some(json!(2)));
    assert!(result["c"].is_none());
}

// ============================================================================
// Validation boundaries
// ============================================================================

#[tokio::test]
async fn key_length_boundary() {
    let service = service();
    let scope = scope();

    let at_limit = "k".repeat(255);
    service
        .set_item(&scope, &at_limit, json!(1), SetItemOptions::default())
        .await
        .expect("key at the limit is accepted");

    let over_limit = "k".repeat(256);
    let err = service
        .set_item(&scope, &over_limit, json!(1), SetItemOptions::default())
        .await
        .expect_err("key over the limit is rejected");
    assert!(matches!(err, StoreError::Validation { .. }), "got: {err:?}");
}

#[tokio::test]
async fn empty_key_rejected() {
    let service = service();
    let err = service
        .get_item(&scope(), "")
        .await
        .expect_err("empty key is rejected");
    assert!(matches!(err, StoreError::Validation { .. }), "got: {err:?}");
}

#[tokio::test]
async fn value_size_boundary() {
    // Tight limits keep the test fast; the arithmetic matches the canonical
    // JSON serialization: a string of n chars serializes to n + 2 bytes.
    let limits = ServiceLimits::builder().max_value_bytes(10).build();
    let service = StorageService::with_limits(Arc::new(MemoryAdapter::new()), limits);
    let scope = scope();

    service
        .set_item(&scope, "k", json!("12345678"), SetItemOptions::default())
        .await
        .expect("value at exactly the limit is accepted");

    let err = service
        .set_item(&scope, "k", json!("123456789"), SetItemOptions::default())
        .await
        .expect_err("value one byte over the limit is rejected");
    assert!(matches!(err, StoreError::Validation { .. }), "got: {err:?}");
}

#[tokio::test]
async fn ttl_shape_validation() {
    let service = service();
    let scope = scope();

    for bad_ttl in [0, -1] {
        let err = service
            .set_item(&scope, "k", json!(1), set_opts(Some(bad_ttl), None))
            .await
            .expect_err("non-positive ttl is rejected");
        assert!(matches!(err, StoreError::Validation { .. }), "ttl={bad_ttl}: got {err:?}");
    }

    service
        .set_item(&scope, "k", json!(1), set_opts(Some(1), None))
        .await
        .expect("ttl of 1 second is accepted");
}

#[tokio::test]
async fn if_match_shape() {
    let service = service();
    let scope = scope();
    service.set_item(&scope, "k", json!(1), SetItemOptions::default()).await.expect("put");

    for bad in ["\"0\"", "\"abc\"", "-2"] {
        let err = service
            .set_item(&scope, "k", json!(2), set_opts(None, Some(bad)))
            .await
            .expect_err("malformed If-Match must fail");
        assert!(
            matches!(err, StoreError::Precondition { .. }),
            "If-Match {bad:?} must be a precondition failure, got: {err:?}"
        );
    }

    // Empty If-Match is treated as absent: unconditional write.
    let item = service
        .set_item(&scope, "k", json!(3), set_opts(None, Some("")))
        .await
        .expect("empty If-Match acts as no precondition");
    assert_eq!(item.version, 2);
}

#[tokio::test]
async fn batch_shape_validation() {
    let service = service();
    let scope = scope();

    let err = service.batch_get(&scope, &[]).await.expect_err("empty batch rejected");
    assert!(matches!(err, StoreError::Validation { .. }), "got: {err:?}");

    let oversized: Vec<String> = (0..101).map(|i| format!("k{i}")).collect();
    let err = service.batch_get(&scope, &oversized).await.expect_err("oversized batch rejected");
    assert!(matches!(err, StoreError::Validation { .. }), "got: {err:?}");

    let err = service.batch_put(&scope, Vec::new()).await.expect_err("empty batch rejected");
    assert!(matches!(err, StoreError::Validation { .. }), "got: {err:?}");
}

#[tokio::test]
async fn invalid_cursor_rejected() {
    let service = service();
    let err = service
        .list(
            &scope(),
            ListOptions { cursor: Some("!!not-base64url!!".to_owned()), ..Default::default() },
        )
        .await
        .expect_err("malformed cursor rejected");
    assert!(matches!(err, StoreError::Validation { .. }), "got: {err:?}");
}

#[tokio::test]
async fn prefix_length_validation() {
    let service = service();
    let err = service
        .list(
            &scope(),
            ListOptions { prefix: Some("p".repeat(256)), ..Default::default() },
        )
        .await
        .expect_err("oversized prefix rejected");
    assert!(matches!(err, StoreError::Validation { .. }), "got: {err:?}");
}

#[tokio::test]
async fn metrics_count_operations_and_errors() {
    let service = service();
    let scope = scope();

    service.set_item(&scope, "k", json!(1), SetItemOptions::default()).await.expect("put");
    service.get_item(&scope, "k").await.expect("get");
    let _ = service.get_item(&scope, "").await; // validation error

    let snapshot = service.metrics().snapshot();
    assert_eq!(snapshot.put_count, 1);
    assert_eq!(snapshot.get_count, 2);
    assert_eq!(snapshot.error_count, 1);
}

#[tokio::test]
async fn health_passthrough() {
    let service = service();
    assert!(service.health().await.is_ok());
}
