//! Scoped, versioned JSON key-value storage for Stash.
//!
//! This crate is the storage core of Stash, a multi-tenant remote
//! replacement for browser-local storage (UI preferences, onboarding state,
//! dismissals, feature flags). It defines the [`StorageAdapter`] contract,
//! the validating [`StorageService`] on top of it, and the in-memory
//! reference adapter; the production backends live in sibling crates.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       HTTP edge (collaborator)               │
//! │        routes, identity resolver, error-to-status map        │
//! ├──────────────────────────────────────────────────────────────┤
//! │                      StorageService                          │
//! │      limits, If-Match parsing, cursor decode, metrics        │
//! ├──────────────────────────────────────────────────────────────┤
//! │                     StorageAdapter trait                     │
//! │   get · put · delete · batch_get · batch_put · list · health │
//! ├───────────────┬──────────────┬──────────────┬────────────────┤
//! │ MemoryAdapter │ SqliteAdapter│ LibsqlAdapter│ PostgresAdapter│
//! │  (this crate) │              │              │  RedisAdapter  │
//! └───────────────┴──────────────┴──────────────┴────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use stash_storage::{MemoryAdapter, Scope, SetItemOptions, StorageService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = StorageService::new(Arc::new(MemoryAdapter::new()));
//!     let scope = Scope::new("acme", "web", "user-17")?;
//!
//!     let item = service
//!         .set_item(&scope, "sidebar", json!({"collapsed": true}), SetItemOptions::default())
//!         .await?;
//!     assert_eq!(item.version, 1);
//!     assert_eq!(item.etag(), "\"1\"");
//!
//!     let fetched = service.get_item(&scope, "sidebar").await?;
//!     assert_eq!(fetched.map(|i| i.value), Some(json!({"collapsed": true})));
//!     Ok(())
//! }
//! ```
//!
//! # Implementing an Adapter
//!
//! 1. Implement [`StorageAdapter`], mapping backend errors to [`StoreError`].
//! 2. Create the schema idempotently on first use, including the expiry
//!    index.
//! 3. Run the [`conformance`] suite against the new adapter.
//!
//! # Feature Flags
//!
//! - **`testutil`**: enables the [`testutil`] module with shared test
//!   helpers and assertion macros. Enable it in `[dev-dependencies]`.

#![deny(unsafe_code)]

pub mod adapter;
pub mod conformance;
pub mod cursor;
pub mod error;
pub mod etag;
pub mod health;
pub mod memory;
pub mod metrics;
pub mod service;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use adapter::StorageAdapter;
pub use error::{BoxError, StoreError, StoreResult};
pub use health::{HealthMetadata, HealthStatus};
pub use memory::MemoryAdapter;
pub use metrics::{Metrics, MetricsSnapshot};
pub use service::{
    BatchPutItem, DEFAULT_LIST_LIMIT, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_KEY_LENGTH,
    DEFAULT_MAX_LIST_LIMIT, DEFAULT_MAX_VALUE_BYTES, ListOptions, RemoveItemOptions,
    ServiceLimits, SetItemOptions, StorageService,
};
pub use types::{
    DeleteOptions, ListPage, ListQuery, PutEntry, PutOptions, Scope, StoredItem,
    datetime_from_millis, expiry_from_ttl,
};
