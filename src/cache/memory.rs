use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{CacheResult, ListCache};

/// In-process list cache backed by moka
pub struct MemoryListCache {
    inner: Cache<String, Arc<Vec<String>>>,
}

impl MemoryListCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        debug!(
            "MemoryListCache initialized with max capacity: {}, TTL: {}s",
            max_entries,
            ttl.as_secs()
        );
        Self { inner }
    }
}

#[async_trait]
impl ListCache for MemoryListCache {
    async fn range(&self, key: &str, start: usize, stop: usize) -> CacheResult<Vec<String>> {
        let Some(list) = self.inner.get(key).await else {
            return Ok(Vec::new());
        };
        if start >= list.len() || start > stop {
            return Ok(Vec::new());
        }
        let stop = stop.min(list.len() - 1);
        Ok(list[start..=stop].to_vec())
    }

    async fn replace(&self, key: &str, items: Vec<String>) -> CacheResult<()> {
        self.inner.insert(key.to_string(), Arc::new(items)).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.inner.invalidate(key).await;
        Ok(())
    }
}
