//! Embedded SQLite backend for the Stash storage layer.
//!
//! [`SqliteAdapter`] realises the
//! [`StorageAdapter`](stash_storage::StorageAdapter) contract on a local
//! SQLite file (or an in-memory database for tests), using `sqlx` with WAL
//! journaling. Schema and indexes are created idempotently on first use.

#![deny(unsafe_code)]

mod adapter;
mod config;

pub use adapter::SqliteAdapter;
pub use config::{DEFAULT_BUSY_TIMEOUT, DEFAULT_MAX_CONNECTIONS, SqliteConfig};
