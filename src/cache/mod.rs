//! Ordered-list cache backends used by the analytics layer
//!
//! An entry is a list of JSON strings. Element 0 holds the entry metadata
//! and the remaining elements hold payload items, so one range read returns
//! a page.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{CacheBackend, CacheConfig};

pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;

pub use memory::MemoryListCache;
#[cfg(feature = "redis-cache")]
pub use redis::RedisListCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("malformed cache entry: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Malformed(err.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait]
pub trait ListCache: Send + Sync {
    /// Elements `start..=stop` of the list at `key`. Indexes past the end are
    /// clipped; a missing key yields an empty list.
    async fn range(&self, key: &str, start: usize, stop: usize) -> CacheResult<Vec<String>>;

    /// Atomically replace the list at `key`
    async fn replace(&self, key: &str, items: Vec<String>) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;
}

/// Build the configured backend, or `None` when caching is off
pub async fn from_config(config: &CacheConfig) -> anyhow::Result<Option<Arc<dyn ListCache>>> {
    let ttl = Duration::from_secs(config.ttl_secs);

    match config.backend {
        CacheBackend::None => Ok(None),
        CacheBackend::Memory => Ok(Some(Arc::new(MemoryListCache::new(config.max_entries, ttl)))),
        #[cfg(feature = "redis-cache")]
        CacheBackend::Redis => {
            use anyhow::Context;

            let url = config
                .redis_url
                .as_deref()
                .context("REDIS_URL must be set when CACHE_BACKEND=redis")?;
            let cache = RedisListCache::connect(url, ttl)
                .await
                .context("Failed to connect to Redis")?;
            Ok(Some(Arc::new(cache)))
        }
        #[cfg(not(feature = "redis-cache"))]
        CacheBackend::Redis => {
            anyhow::bail!("CACHE_BACKEND=redis requires building with the redis-cache feature")
        }
    }
}
