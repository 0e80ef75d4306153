use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use super::CacheStore;

/// Redis-backed store: `GET key` / `SET key value EX seconds`.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`) and build the
    /// auto-reconnecting connection manager. Fails fast on an unreachable
    /// server so the caller can fall back to [`super::MemoryStore`].
    pub async fn connect(url: &str) -> Result<Self> {
        let client =
            redis::Client::open(url).with_context(|| format!("invalid redis url {url}"))?;
        let conn = ConnectionManager::new(client)
            .await
            .with_context(|| format!("connecting to redis at {url}"))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        // The manager multiplexes; a clone per command is the intended use.
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.with_context(|| format!("GET {key}"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
            .with_context(|| format!("SET {key}"))?;
        Ok(())
    }
}
