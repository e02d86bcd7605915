//! Redis backend for the Stash storage layer.
//!
//! [`RedisAdapter`] realises the
//! [`StorageAdapter`](stash_storage::StorageAdapter) contract on Redis,
//! storing one JSON envelope per item under the composed key
//! `t:<tenant>:n:<namespace>:u:<user>:k:<key>`. Writes use optimistic
//! WATCH/MULTI/EXEC transactions with a bounded retry budget; listing scans
//! the scope's key prefix and filters expiry from the envelopes.

#![deny(unsafe_code)]

mod adapter;
mod config;
mod keys;
mod retry;

pub use adapter::RedisAdapter;
pub use config::{
    DEFAULT_CAS_ATTEMPTS, DEFAULT_CAS_BASE_DELAY, DEFAULT_SCAN_COUNT, RedisConfig,
};
