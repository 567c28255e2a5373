//! Response cache
//!
//! A namespaced key/value store mapping fetched URLs to their bodies. Every
//! key is prefixed with a basekey so several runs (or several endpoints) can
//! share one SQLite file without seeing each other's entries. Backend
//! failures never fail a fetch: they are logged and treated as misses.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use traits::{CacheBackend, CacheError, CacheResult};

use crate::config::{CacheBackendKind, CacheConfig};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lookup counters, surfaced in the report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Namespaced TTL cache in front of a [`CacheBackend`]
pub struct Cache {
    basekey: String,
    default_ttl: Duration,
    backend: Box<dyn CacheBackend>,
    lookups: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Cache {
    pub fn new(basekey: impl Into<String>, default_ttl: Duration, backend: Box<dyn CacheBackend>) -> Self {
        Self {
            basekey: basekey.into(),
            default_ttl,
            backend,
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// In-memory cache with the default one-hour TTL
    pub fn in_memory(basekey: impl Into<String>) -> Self {
        Self::new(
            basekey,
            CacheConfig::default().ttl(),
            Box::new(MemoryBackend::new()),
        )
    }

    /// Builds the cache described by the configuration
    ///
    /// Without a configured basekey the namespace is derived from the seed
    /// and the current time, so entries from earlier runs are never reused.
    pub fn from_config(config: &CacheConfig, seed: &str) -> CacheResult<Self> {
        let basekey = config
            .basekey
            .clone()
            .unwrap_or_else(|| run_basekey(seed));

        let backend: Box<dyn CacheBackend> = match config.backend {
            CacheBackendKind::Memory => Box::new(MemoryBackend::new()),
            CacheBackendKind::Sqlite => {
                let path = config.path.as_deref().unwrap_or("oparl-validator-cache.db");
                Box::new(SqliteBackend::new(Path::new(path))?)
            }
        };

        tracing::debug!("Cache namespace: {}", basekey);
        Ok(Self::new(basekey, config.ttl(), backend))
    }

    pub fn basekey(&self) -> &str {
        &self.basekey
    }

    /// The key actually handed to the backend
    pub fn fullkey(&self, key: &str) -> String {
        format!("{}:{}", self.basekey, key)
    }

    /// Returns true if a live entry exists. Not counted as a lookup.
    pub fn has(&self, key: &str) -> bool {
        match self.backend.contains(&self.fullkey(key)) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Cache check failed for {}: {}", key, e);
                false
            }
        }
    }

    /// Returns the cached value, counting the lookup as a hit or miss
    pub fn get(&self, key: &str) -> Option<String> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let value = match self.backend.get(&self.fullkey(key)) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                None
            }
        };

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Stores a value; `ttl` of `None` uses the configured default
    pub fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if let Err(e) = self.backend.set(&self.fullkey(key), value, ttl) {
            tracing::warn!("Cache write failed for {}: {}", key, e);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Derives a per-run namespace from the seed URL and the current time
pub fn run_basekey(seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(Utc::now().to_rfc3339().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}
