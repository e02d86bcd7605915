//! Configuration for the SQLite storage adapter.

use std::time::Duration;

/// Default maximum number of pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default busy timeout while another writer holds the database lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for [`SqliteAdapter`](crate::SqliteAdapter).
///
/// # Example
///
/// ```
/// use stash_storage_sqlite::SqliteConfig;
///
/// let config = SqliteConfig::builder()
///     .path("/var/lib/stash/items.db")
///     .max_connections(2)
///     .build();
/// assert_eq!(config.max_connections(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub(crate) path: String,
    pub(crate) max_connections: u32,
    pub(crate) busy_timeout: Duration,
    pub(crate) create_if_missing: bool,
}

#[bon::bon]
impl SqliteConfig {
    /// Creates a new configuration.
    ///
    /// `path` is the database file path; use `":memory:"` for an in-memory
    /// database (pair it with `max_connections(1)` so every query sees the
    /// same database).
    #[builder]
    pub fn new(
        #[builder(into)] path: String,
        #[builder(default = DEFAULT_MAX_CONNECTIONS)] max_connections: u32,
        #[builder(default = DEFAULT_BUSY_TIMEOUT)] busy_timeout: Duration,
        #[builder(default = true)] create_if_missing: bool,
    ) -> Self {
        Self { path, max_connections, busy_timeout, create_if_missing }
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the maximum number of pooled connections.
    #[must_use]
    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    /// Returns the busy timeout.
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    /// Returns whether the database file is created when absent.
    #[must_use]
    pub fn create_if_missing(&self) -> bool {
        self.create_if_missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = SqliteConfig::builder().path(":memory:").build();
        assert_eq!(config.path(), ":memory:");
        assert_eq!(config.max_connections(), DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.busy_timeout(), DEFAULT_BUSY_TIMEOUT);
        assert!(config.create_if_missing());
    }
}
