//! Content service configuration.
//!
//! Loaded from environment variables with defaults, like the lock
//! configuration in `tastebud-runtime`.

use std::env;

/// Content service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentConfig {
    /// PostgreSQL connection URL.
    ///
    /// Default: `postgres://localhost/tastebud` (`DATABASE_URL`)
    pub database_url: String,

    /// Maximum pooled database connections.
    ///
    /// Default: 10 (`DATABASE_MAX_CONNECTIONS`)
    pub max_connections: u32,

    /// Maximum length of review, post and comment text, in characters.
    ///
    /// Default: 2000 (`CONTENT_MAX_LENGTH`)
    pub max_content_len: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/tastebud".to_string(),
            max_connections: 10,
            max_content_len: 2000,
        }
    }
}

impl ContentConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            max_content_len: env::var("CONTENT_MAX_LENGTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_content_len),
        }
    }

    /// Set the database URL.
    #[must_use]
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Set the connection pool size.
    #[must_use]
    pub const fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the maximum content length.
    #[must_use]
    pub const fn with_max_content_len(mut self, max: usize) -> Self {
        self.max_content_len = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContentConfig::default();
        assert_eq!(config.max_content_len, 2000);
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn test_builder() {
        let config = ContentConfig::default()
            .with_database_url("postgres://db/test")
            .with_max_content_len(10);
        assert_eq!(config.database_url, "postgres://db/test");
        assert_eq!(config.max_content_len, 10);
    }
}
