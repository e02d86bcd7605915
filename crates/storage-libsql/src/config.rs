//! Configuration for the remote libsql storage adapter.

/// Configuration for [`LibsqlAdapter`](crate::LibsqlAdapter).
///
/// # Example
///
/// ```
/// use stash_storage_libsql::LibsqlConfig;
///
/// let config = LibsqlConfig::builder()
///     .url("libsql://stash-prod.example.turso.io")
///     .auth_token("ey...")
///     .build();
/// assert!(config.url().starts_with("libsql://"));
/// ```
#[derive(Debug, Clone)]
pub struct LibsqlConfig {
    pub(crate) url: String,
    pub(crate) auth_token: String,
}

#[bon::bon]
impl LibsqlConfig {
    /// Creates a new configuration for a remote database.
    #[builder]
    pub fn new(
        #[builder(into)] url: String,
        #[builder(into)] auth_token: String,
    ) -> Self {
        Self { url, auth_token }
    }

    /// Returns the database URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the auth token. Never log this value.
    #[must_use]
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }
}
