use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

use super::CacheStore;

/// In-process store with per-entry deadlines.
///
/// Stands in for Redis when `REDIS_URL` is absent or unreachable, and backs
/// the test suite. Expired entries are dropped lazily on the next lookup.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        if let Some((value, deadline)) = entries.get(key) {
            if Instant::now() < *deadline {
                return Ok(Some(value.clone()));
            }
        }
        // Absent, or expired and due for removal.
        entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let deadline = Instant::now() + ttl;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }
}
