// src/embeddings/cache.rs
// In-memory LRU + TTL cache over (model, text) -> embedding

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Cache statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
}

struct CacheEntry {
    embedding: Vec<f32>,
    cached_at: Instant,
    last_access: Instant,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// LRU + TTL embedding cache keyed by `sha256(model ":" text)`.
///
/// All mutations (get updating access time, set, evict) happen under one
/// mutex so they are atomic with respect to each other.
pub struct EmbeddingCache {
    inner: Mutex<CacheInner>,
    max_size: usize,
    ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(max_size: usize, ttl_hours: u64) -> Self {
        Self::with_ttl(max_size, Duration::from_secs(ttl_hours * 3600))
    }

    pub fn with_ttl(max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
            max_size,
            ttl,
        }
    }

    /// Cache key: hex sha256 over `model ":" text`.
    pub fn cache_key(text: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update(b":");
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Retrieve a cached embedding if present and not expired. A hit bumps
    /// the LRU access time; an expired entry is removed and counts as a miss.
    pub fn get(&self, text: &str, model: &str) -> Option<Vec<f32>> {
        let key = Self::cache_key(text, model);
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("embedding cache lock poisoned");

        match inner.entries.get_mut(&key) {
            Some(entry) if now.duration_since(entry.cached_at) < self.ttl => {
                entry.last_access = now;
                let embedding = entry.embedding.clone();
                inner.hits += 1;
                Some(embedding)
            }
            Some(_) => {
                inner.entries.remove(&key);
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store an embedding. When a new key would exceed `max_size`, the entry
    /// with the oldest access time is evicted first.
    pub fn set(&self, text: &str, model: &str, embedding: Vec<f32>) {
        let key = Self::cache_key(text, model);
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("embedding cache lock poisoned");

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_size {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(
            key,
            CacheEntry {
                embedding,
                cached_at: now,
                last_access: now,
            },
        );
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("embedding cache lock poisoned");
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("embedding cache lock poisoned")
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("embedding cache lock poisoned");
        let total = inner.hits + inner.misses;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.entries.len(),
            max_size: self.max_size,
            hit_rate: if total > 0 {
                inner.hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_after_set_returns_same_vector() {
        let cache = EmbeddingCache::new(10, 1);
        assert!(cache.get("hello", "m").is_none());

        cache.set("hello", "m", vec![0.1, 0.2, 0.3]);
        assert_eq!(cache.get("hello", "m"), Some(vec![0.1, 0.2, 0.3]));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn keys_are_model_scoped() {
        let cache = EmbeddingCache::new(10, 1);
        cache.set("hello", "a", vec![1.0]);
        assert!(cache.get("hello", "b").is_none());
    }

    #[test]
    fn size_never_exceeds_max_and_oldest_goes_first() {
        let cache = EmbeddingCache::new(3, 1);
        for i in 0..5 {
            cache.set(&format!("text-{i}"), "m", vec![i as f32]);
            // Distinct access times so LRU ordering is deterministic.
            std::thread::sleep(Duration::from_millis(2));
        }

        assert_eq!(cache.len(), 3);
        // The two oldest insertions were evicted.
        assert!(cache.get("text-0", "m").is_none());
        assert!(cache.get("text-1", "m").is_none());
        assert!(cache.get("text-4", "m").is_some());
    }

    #[test]
    fn expired_entries_miss_and_are_removed() {
        let cache = EmbeddingCache::with_ttl(10, Duration::from_millis(0));
        cache.set("hello", "m", vec![1.0]);
        assert!(cache.get("hello", "m").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn get_refreshes_lru_order() {
        let cache = EmbeddingCache::new(2, 1);
        cache.set("a", "m", vec![1.0]);
        std::thread::sleep(Duration::from_millis(2));
        cache.set("b", "m", vec![2.0]);
        std::thread::sleep(Duration::from_millis(2));

        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("a", "m").is_some());
        std::thread::sleep(Duration::from_millis(2));
        cache.set("c", "m", vec![3.0]);

        assert!(cache.get("a", "m").is_some());
        assert!(cache.get("b", "m").is_none());
    }
}
