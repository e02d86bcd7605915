//! Integration tests for [`LibsqlAdapter`] against a live libsql server.
//!
//! These tests are `#[ignore]`d by default; run them with a server
//! available (e.g. `sqld` locally, or a Turso database):
//!
//! ```bash
//! STASH_LIBSQL_URL=http://127.0.0.1:8080 STASH_LIBSQL_TOKEN= \
//!     cargo test -p stash-storage-libsql -- --ignored
//! ```

use std::sync::Arc;

use stash_storage::conformance;
use stash_storage::StorageAdapter;
use stash_storage_libsql::{LibsqlAdapter, LibsqlConfig};

fn config() -> LibsqlConfig {
    let url =
        std::env::var("STASH_LIBSQL_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_owned());
    let auth_token = std::env::var("STASH_LIBSQL_TOKEN").unwrap_or_default();
    LibsqlConfig::builder().url(url).auth_token(auth_token).build()
}

async fn adapter() -> LibsqlAdapter {
    LibsqlAdapter::new(config())
        .await
        .expect("failed to connect to libsql (ensure a server is running)")
}

macro_rules! conformance_test {
    ($name:ident) => {
        #[tokio::test]
        #[ignore = "requires a running libsql server"]
        async fn $name() {
            conformance::$name(&adapter().await).await;
        }
    };
}

conformance_test!(versions_increment_without_gaps);
conformance_test!(get_observes_latest_write);
conformance_test!(created_at_survives_updates);
conformance_test!(values_round_trip);

conformance_test!(if_match_success);
conformance_test!(if_match_mismatch_preserves_state);
conformance_test!(if_match_missing_item_fails);

conformance_test!(ttl_expiry_resets_version);
conformance_test!(if_match_against_expired_item_fails);
conformance_test!(update_without_ttl_clears_expiry);

conformance_test!(delete_reports_prior_existence);
conformance_test!(delete_mismatched_version_fails);
conformance_test!(delete_matching_version_succeeds);
conformance_test!(delete_expired_behaves_as_absent);

conformance_test!(list_orders_keys_ascending);
conformance_test!(list_paginates_exhaustively);
conformance_test!(list_filters_by_prefix);
conformance_test!(list_excludes_expired);

conformance_test!(batch_get_key_set_equals_input);
conformance_test!(batch_put_applies_in_order);
conformance_test!(batch_put_partial_failure_keeps_prefix);

conformance_test!(scope_isolation);
conformance_test!(health_reports_ok);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a running libsql server"]
async fn concurrent_guarded_puts_have_exactly_one_winner() {
    conformance::concurrent_guarded_puts_have_exactly_one_winner(Arc::new(adapter().await)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a running libsql server"]
async fn concurrent_guarded_deletes_have_exactly_one_winner() {
    conformance::concurrent_guarded_deletes_have_exactly_one_winner(Arc::new(adapter().await))
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a running libsql server"]
async fn concurrent_unconditional_puts_lose_no_versions() {
    conformance::concurrent_unconditional_puts_lose_no_versions(Arc::new(adapter().await)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a running libsql server"]
async fn run_all_against_one_database() {
    let adapter = Arc::new(adapter().await);
    conformance::run_all(Arc::clone(&adapter)).await;
    adapter.close().await.expect("close");
}
