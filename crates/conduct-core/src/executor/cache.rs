//! TTL-keyed memoization of provider call results.
//!
//! Expiry is lazy: stale entries are dropped when read. No background
//! sweep — at this engine's scale the map stays small.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

struct CacheEntry {
    value: serde_json::Value,
    stored_at: Instant,
}

pub struct ResponseCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Canonical cache key: call name plus the serialized argument payload.
    /// `serde_json` orders object keys, so equal arguments always produce
    /// the same key.
    pub fn key(call_name: &str, args: &serde_json::Value) -> String {
        format!("{call_name}:{args}")
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Stale: evict under the write lock, re-checking freshness in case
        // a concurrent put refreshed the entry.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.stored_at.elapsed() < self.ttl {
                return Some(entry.value.clone());
            }
            entries.remove(key);
        }
        None
    }

    pub async fn put(&self, key: String, value: serde_json::Value) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
