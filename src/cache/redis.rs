use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::debug;

use super::{CacheError, CacheResult, ListCache};

const KEY_PREFIX: &str = "forklink:";

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

/// List cache stored as Redis lists, read with `LRANGE`
pub struct RedisListCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisListCache {
    pub async fn connect(url: &str, ttl: Duration) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        debug!("RedisListCache connected, TTL: {}s", ttl.as_secs());
        Ok(Self { conn, ttl })
    }

    fn make_key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }
}

#[async_trait]
impl ListCache for RedisListCache {
    async fn range(&self, key: &str, start: usize, stop: usize) -> CacheResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let items = redis::cmd("LRANGE")
            .arg(Self::make_key(key))
            .arg(start)
            .arg(stop)
            .query_async::<Vec<String>>(&mut conn)
            .await?;
        Ok(items)
    }

    async fn replace(&self, key: &str, items: Vec<String>) -> CacheResult<()> {
        let key = Self::make_key(key);
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if !items.is_empty() {
            pipe.rpush(&key, items)
                .ignore()
                .expire(&key, self.ttl.as_secs() as i64)
                .ignore();
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(Self::make_key(key))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
