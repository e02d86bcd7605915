//! Configuration for the Redis storage adapter.

use std::time::Duration;

/// Attempt budget for optimistic WATCH/MULTI/EXEC transactions.
pub const DEFAULT_CAS_ATTEMPTS: u32 = 5;

/// Base delay between conflicting attempts; actual delays add 0–100% jitter.
pub const DEFAULT_CAS_BASE_DELAY: Duration = Duration::from_millis(10);

/// `COUNT` hint passed to `SCAN` while listing.
pub const DEFAULT_SCAN_COUNT: usize = 500;

/// Configuration for [`RedisAdapter`](crate::RedisAdapter).
///
/// # Example
///
/// ```
/// use stash_storage_redis::RedisConfig;
///
/// let config = RedisConfig::builder().url("redis://localhost:6379").build();
/// assert_eq!(config.cas_attempts(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub(crate) url: String,
    pub(crate) cas_attempts: u32,
    pub(crate) cas_base_delay: Duration,
    pub(crate) scan_count: usize,
}

#[bon::bon]
impl RedisConfig {
    /// Creates a new configuration from a connection URL.
    #[builder]
    pub fn new(
        #[builder(into)] url: String,
        #[builder(default = DEFAULT_CAS_ATTEMPTS)] cas_attempts: u32,
        #[builder(default = DEFAULT_CAS_BASE_DELAY)] cas_base_delay: Duration,
        #[builder(default = DEFAULT_SCAN_COUNT)] scan_count: usize,
    ) -> Self {
        Self { url, cas_attempts, cas_base_delay, scan_count }
    }

    /// Returns the connection URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the optimistic-transaction attempt budget.
    #[must_use]
    pub fn cas_attempts(&self) -> u32 {
        self.cas_attempts
    }

    /// Returns the base delay between conflicting attempts.
    #[must_use]
    pub fn cas_base_delay(&self) -> Duration {
        self.cas_base_delay
    }

    /// Returns the `SCAN` count hint.
    #[must_use]
    pub fn scan_count(&self) -> usize {
        self.scan_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = RedisConfig::builder().url("redis://localhost:6379").build();
        assert_eq!(config.url(), "redis://localhost:6379");
        assert_eq!(config.cas_attempts(), DEFAULT_CAS_ATTEMPTS);
        assert_eq!(config.cas_base_delay(), DEFAULT_CAS_BASE_DELAY);
        assert_eq!(config.scan_count(), DEFAULT_SCAN_COUNT);
    }
}
