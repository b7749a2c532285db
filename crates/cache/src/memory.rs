use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use firmscout_core::{Cache, CacheStats, ExtractError};

struct Entry {
    value: Value,
    created_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// In-process cache backend. Expiry is lazy (checked on read) with an
/// explicit [`MemoryCache::trim_expired`] hook for the resource governor.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired entry; returns how many were removed.
    pub fn trim_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.expired());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "trimmed expired cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, ExtractError> {
        // The read guard must drop before the expired-entry removal below,
        // or the shard would deadlock against itself.
        let live = {
            match self.entries.get(key) {
                Some(entry) if !entry.expired() => Some(entry.value.clone()),
                Some(_) => None,
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
            }
        };
        match live {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            None => {
                self.entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, mut value: Value, ttl: Duration) -> Result<(), ExtractError> {
        if let Value::Object(map) = &mut value {
            map.insert(
                "_cached_at".to_string(),
                Value::String(chrono::Utc::now().to_rfc3339()),
            );
            map.insert("_ttl_s".to_string(), Value::from(ttl.as_secs()));
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, ExtractError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn invalidate(&self, pattern: &str) -> Result<usize, ExtractError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.contains(pattern));
        Ok(before - self.entries.len())
    }

    fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trip_within_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("company:abc", json!({"name": "Acme"}), Duration::from_secs(60))
            .await
            .unwrap();
        let value = cache.get("company:abc").await.unwrap().unwrap();
        assert_eq!(value["name"], "Acme");
        assert!(value.get("_cached_at").is_some());
        assert_eq!(value["_ttl_s"], 60);
    }

    #[tokio::test]
    async fn expired_entry_reads_as_miss() {
        let cache = MemoryCache::new();
        cache
            .set("k", json!({"v": 1}), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn invalidate_matches_substrings() {
        let cache = MemoryCache::new();
        cache.set("company:a", json!(1), Duration::from_secs(60)).await.unwrap();
        cache.set("company:b", json!(2), Duration::from_secs(60)).await.unwrap();
        cache.set("serp:a", json!(3), Duration::from_secs(60)).await.unwrap();
        let removed = cache.invalidate("company:").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() {
        let cache = MemoryCache::new();
        cache.set("k", json!(1), Duration::from_secs(60)).await.unwrap();
        let _ = cache.get("k").await.unwrap();
        let _ = cache.get("missing").await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn trim_removes_only_expired() {
        let cache = MemoryCache::new();
        cache.set("old", json!(1), Duration::from_millis(5)).await.unwrap();
        cache.set("fresh", json!(2), Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(cache.trim_expired(), 1);
        assert!(cache.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn non_object_values_survive_untouched() {
        let cache = MemoryCache::new();
        cache.set("n", json!([1, 2, 3]), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("n").await.unwrap().unwrap(), json!([1, 2, 3]));
    }
}
