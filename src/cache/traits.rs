//! Cache backend trait and error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur inside a cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Storage behind a [`Cache`](super::Cache)
///
/// Keys arrive fully namespaced. Implementations must be usable from many
/// tasks at once.
pub trait CacheBackend: Send + Sync {
    /// Returns the stored value if it exists and has not expired
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores a value that expires after `ttl`, replacing any previous value
    fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Returns true if a live value exists for the key
    fn contains(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Removes expired entries and returns how many were dropped
    fn purge_expired(&self) -> CacheResult<usize>;
}
