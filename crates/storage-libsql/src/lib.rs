//! Remote SQL-over-HTTP backend for the Stash storage layer.
//!
//! [`LibsqlAdapter`] realises the
//! [`StorageAdapter`](stash_storage::StorageAdapter) contract against a
//! libsql server (Turso or a self-hosted `sqld`), speaking the libsql
//! remote protocol over HTTP. The SQL shape matches the embedded SQLite
//! backend; guarded writes use interactive transactions.

#![deny(unsafe_code)]

mod adapter;
mod config;

pub use adapter::LibsqlAdapter;
pub use config::LibsqlConfig;
