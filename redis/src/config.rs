//! Connection settings for the `Redis` lock store.

use std::env;

/// `Redis` lock store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisLockConfig {
    /// `Redis` connection URL.
    ///
    /// Default: `redis://127.0.0.1:6379` (`REDIS_URL`)
    pub url: String,

    /// Prefix prepended to every lock key.
    ///
    /// Default: `lock:` (`LOCK_KEY_PREFIX`)
    pub key_prefix: String,
}

impl Default for RedisLockConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "lock:".to_string(),
        }
    }
}

impl RedisLockConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: env::var("REDIS_URL").unwrap_or(defaults.url),
            key_prefix: env::var("LOCK_KEY_PREFIX").unwrap_or(defaults.key_prefix),
        }
    }

    /// Set the connection URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the key prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = RedisLockConfig::default()
            .with_url("redis://cache:6380")
            .with_key_prefix("tastebud:lock:");

        assert_eq!(config.url, "redis://cache:6380");
        assert_eq!(config.key_prefix, "tastebud:lock:");
    }
}
