//! Shared test utilities for adapter and service testing.
//!
//! Feature-gated behind `testutil` to prevent leaking into production
//! builds. Backend crates enable it from their dev-dependencies:
//!
//! ```toml
//! [dev-dependencies]
//! stash-storage = { path = "../storage", features = ["testutil"] }
//! ```

use serde_json::{Value, json};

use crate::types::{PutEntry, PutOptions, Scope};

/// Creates a scope under the shared test tenant.
///
/// # Panics
///
/// Panics if `user` is empty, which would make the scope invalid.
#[must_use]
pub fn test_scope(user: &str) -> Scope {
    Scope::new("test-tenant", "test-ns", user).expect("test scope components are non-empty")
}

/// Creates a deterministic test key from a prefix and index.
///
/// Produces keys like `"prefix:000042"` (zero-padded to 6 digits) so that
/// lexicographic ordering matches numeric ordering in list tests.
#[must_use]
pub fn make_key(prefix: &str, idx: usize) -> String {
    format!("{prefix}:{idx:06}")
}

/// Creates a small JSON object tagged with a sequence number.
#[must_use]
pub fn make_value(seq: usize) -> Value {
    json!({ "seq": seq })
}

/// Creates an unconditional, non-expiring batch entry.
#[must_use]
pub fn plain_entry(key: &str, value: Value) -> PutEntry {
    PutEntry { key: key.to_owned(), value, options: PutOptions::default() }
}

/// Assert that a result is an `Err(StoreError::Precondition { .. })`.
#[macro_export]
macro_rules! assert_precondition {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::StoreError::Precondition { .. })),
            "expected StoreError::Precondition, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::StoreError::Precondition { .. })),
            "{}: expected StoreError::Precondition, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a result is an `Err(StoreError::Validation { .. })`.
#[macro_export]
macro_rules! assert_validation {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::StoreError::Validation { .. })),
            "expected StoreError::Validation, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::StoreError::Validation { .. })),
            "{}: expected StoreError::Validation, got: {:?}",
            $msg,
            $result,
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StoreError, StoreResult};

    #[test]
    fn keys_order_numerically() {
        assert!(make_key("p", 9) < make_key("p", 10), "zero padding must preserve ordering");
    }

    #[test]
    fn test_scope_is_stable() {
        assert_eq!(test_scope("u1"), test_scope("u1"));
        assert_ne!(test_scope("u1"), test_scope("u2"));
    }

    #[test]
    fn precondition_macro_matches_the_variant() {
        let result: StoreResult<()> = Err(StoreError::precondition("version mismatch"));
        assert_precondition!(result);
        assert_precondition!(result, "with context");
    }

    #[test]
    fn validation_macro_matches_the_variant() {
        let result: StoreResult<()> = Err(StoreError::validation("key too long"));
        assert_validation!(result);
        assert_validation!(result, "with context");
    }
}
