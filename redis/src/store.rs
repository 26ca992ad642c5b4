//! `Redis`-backed lease lock store.
//!
//! # Protocol
//!
//! - acquire: `SET <prefix><key> <token> NX PX <lease ms>`; `OK` means owned,
//!   a nil reply means another token holds the key
//! - release: Lua compare-and-delete, atomic on the server
//! - expiry: left to `Redis` through the `PX` lease

use crate::config::RedisLockConfig;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::Duration;
use tastebud_core::lock::{LockKey, LockStore, LockToken, ReleaseOutcome, Result};
use tastebud_core::LockError;

/// Deletes the key only if it still stores the caller's token.
///
/// Returns 1 if deleted, 0 if the key was gone or owned by another token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// `Redis` lock store shared by every worker instance.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tastebud_redis::{RedisLockConfig, RedisLockStore};
/// use tastebud_runtime::LockCoordinator;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = RedisLockStore::connect(&RedisLockConfig::from_env()).await?;
/// let coordinator = LockCoordinator::new(Arc::new(store));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisLockStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
    key_prefix: String,
    release_script: Script,
}

impl std::fmt::Debug for RedisLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLockStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisLockStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] if the client cannot be created or the
    /// first connection fails.
    pub async fn connect(config: &RedisLockConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| LockError::Store(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            LockError::Store(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!(key_prefix = %config.key_prefix, "Connected Redis lock store");

        Ok(Self {
            conn_manager,
            key_prefix: config.key_prefix.clone(),
            release_script: Script::new(RELEASE_SCRIPT),
        })
    }

    /// Get the `Redis` key for a lock key.
    fn redis_key(&self, key: &LockKey) -> String {
        format!("{}{key}", self.key_prefix)
    }
}

/// `PX` argument for a lease; `Redis` rejects zero.
#[allow(clippy::cast_possible_truncation)] // leases are seconds, not centuries
fn lease_millis(lease: Duration) -> u64 {
    (lease.as_millis() as u64).max(1)
}

impl LockStore for RedisLockStore {
    async fn try_acquire(&self, key: &LockKey, token: &LockToken, lease: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.redis_key(key))
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(lease_millis(lease))
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::Store(format!("Failed to acquire lock {key}: {e}")))?;

        Ok(reply.is_some())
    }

    async fn release(&self, key: &LockKey, token: &LockToken) -> Result<ReleaseOutcome> {
        let mut conn = self.conn_manager.clone();

        let deleted: i64 = self
            .release_script
            .key(self.redis_key(key))
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Store(format!("Failed to release lock {key}: {e}")))?;

        Ok(if deleted == 1 {
            ReleaseOutcome::Released
        } else {
            ReleaseOutcome::AlreadyExpired
        })
    }
}
