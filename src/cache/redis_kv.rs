//! `KvCache` implementation backed by Redis via `deadpool-redis`. The only
//! concrete cache backend this crate ships, since the KV cache is the
//! engine's own persisted state, unlike the four store traits which stay
//! genuinely external.

use crate::stores::KvCache;
use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Config, Pool, Runtime};
use tracing::warn;

/// A pooled Redis client. Every operation treats connection failure as a
/// miss/no-op rather than propagating an error: the cache is optional, and
/// the engine must remain correct (just slower) without it.
pub struct RedisKvCache {
    pool: Pool,
}

impl RedisKvCache {
    pub fn new(redis_url: &str) -> Result<Self, deadpool_redis::CreatePoolError> {
        let config = Config::from_url(redis_url);
        let pool = config.create_pool(Some(Runtime::Tokio1))?;
        Ok(RedisKvCache { pool })
    }
}

#[async_trait]
impl KvCache for RedisKvCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = match self.pool.get().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "redis cache unavailable, treating get as miss");
                return None;
            }
        };
        match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, key = %key, "redis GET failed, treating as miss");
                None
            }
        }
    }

    async fn setex(&self, key: &str, ttl_secs: u64, value: Vec<u8>) {
        let mut conn = match self.pool.get().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "redis cache unavailable, treating setex as no-op");
                return;
            }
        };
        if let Err(e) = conn.set_ex::<_, _, ()>(key, value, ttl_secs).await {
            warn!(error = %e, key = %key, "redis SETEX failed, continuing without caching");
        }
    }

    async fn scan_iter(&self, pattern: &str) -> Vec<String> {
        let mut conn = match self.pool.get().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "redis cache unavailable, scan returning no matches");
                return Vec::new();
            }
        };
        match conn.keys::<_, Vec<String>>(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, pattern = %pattern, "redis KEYS failed, returning no matches");
                Vec::new()
            }
        }
    }

    async fn delete(&self, key: &str) {
        let mut conn = match self.pool.get().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "redis cache unavailable, treating delete as no-op");
                return;
            }
        };
        if let Err(e) = conn.del::<_, ()>(key).await {
            warn!(error = %e, key = %key, "redis DEL failed");
        }
    }
}
