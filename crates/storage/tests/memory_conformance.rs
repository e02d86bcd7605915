//! Runs the adapter conformance suite against [`MemoryAdapter`].
//!
//! Each conformance function gets its own test so failures point at the
//! exact contract property that broke.

use stash_storage::{MemoryAdapter, conformance};

macro_rules! conformance_test {
    ($name:ident) => {
        #[tokio::test]
        async fn $name() {
            conformance::$name(&MemoryAdapter::new()).await;
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
