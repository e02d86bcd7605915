//! PostgreSQL backend for the Stash storage layer.
//!
//! [`PostgresAdapter`] realises the
//! [`StorageAdapter`](stash_storage::StorageAdapter) contract on a
//! networked PostgreSQL database via a `sqlx` connection pool. Guarded
//! writes take a row lock (`SELECT … FOR UPDATE`) so the precondition check
//! and the write share one transactional boundary.

#![deny(unsafe_code)]

mod adapter;
mod config;

pub use adapter::PostgresAdapter;
pub use config::{DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_MAX_CONNECTIONS, PostgresConfig};
