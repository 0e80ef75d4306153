//! Cache-aside storage for serialized datasets.
//!
//! The store is an external string key-value service with per-entry expiry.
//! Everything above it treats cache faults as a miss: a broken or unreachable
//! store must never fail a read, only force a fresh fetch.

pub mod memory;
pub mod redis;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// String key-value store with `GET(key)` and `SET(key, value, expiry)`.
///
/// Implementations are injected into the service as `Arc<dyn CacheStore>`;
/// entries expire at the store's discretion after `ttl` and are never
/// explicitly invalidated by this crate.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a previously stored value. `Ok(None)` means absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}
