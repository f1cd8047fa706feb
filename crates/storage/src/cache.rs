//! TTL cache layer.
//!
//! In-process LRU cache with per-entry expiry, used by the reputation engine
//! as its short-TTL score cache. Staleness is bounded by the TTL, not by
//! write-through invalidation, except for explicit `delete` calls. The trait
//! keeps the seam open for an external cache tier.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use lru::LruCache;
use tracing::trace;

use crate::error::{StorageError, StorageResult};

/// Safely convert u64 to f64; values beyond 2^52 lose precision
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn u64_to_f64_safe(value: u64) -> f64 {
    const MAX_SAFE_U64_FOR_F64: u64 = (1_u64 << 52) - 1;
    if value > MAX_SAFE_U64_FOR_F64 {
        tracing::warn!("precision loss in u64->f64 conversion: {}", value);
    }
    value as f64
}

/// Calculate a ratio without dividing by zero
#[must_use]
pub fn safe_ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0_f64
    } else {
        u64_to_f64_safe(numerator) / u64_to_f64_safe(denominator)
    }
}

/// Cache trait for different cache implementations
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get value from cache
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Set value in cache with an optional TTL
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StorageResult<()>;

    /// Delete value from cache; returns whether it was present
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Clear all cache entries
    async fn clear(&self) -> StorageResult<()>;

    /// Get cache statistics
    async fn stats(&self) -> StorageResult<CacheStats>;
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of cache sets
    pub sets: u64,

    /// Number of cache deletes
    pub deletes: u64,

    /// Hit ratio over all gets
    pub hit_ratio: f64,

    /// Average operation latency in microseconds
    pub avg_latency_us: u64,
}

#[derive(Debug, Clone)]
struct InternalCacheStats {
    hits: u64,
    misses: u64,
    sets: u64,
    deletes: u64,
    avg_latency_us: u64,
}

impl InternalCacheStats {
    const fn new() -> Self {
        Self {
            hits: 0,
            misses: 0,
            sets: 0,
            deletes: 0,
            avg_latency_us: 0,
        }
    }
}

/// Cache entry with expiration
#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Option<u64>, // Unix timestamp in seconds
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|ttl| now_secs() + ttl.as_secs());
        Self { data, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| now_secs() >= expires_at)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// In-memory LRU cache with per-entry TTL
pub struct MemoryCache {
    cache: Arc<parking_lot::Mutex<LruCache<String, CacheEntry>>>,
    stats: Arc<parking_lot::Mutex<InternalCacheStats>>,
}

impl MemoryCache {
    /// Expired entries are swept every this many sets
    const CLEANUP_EVERY_SETS: u64 = 64;

    /// Create a cache with a maximum entry count.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Configuration` if `max_entries` is zero.
    pub fn new(max_entries: usize) -> StorageResult<Self> {
        let capacity = NonZeroUsize::new(max_entries)
            .ok_or_else(|| StorageError::configuration("cache capacity must be non-zero"))?;

        Ok(Self {
            cache: Arc::new(parking_lot::Mutex::new(LruCache::new(capacity))),
            stats: Arc::new(parking_lot::Mutex::new(InternalCacheStats::new())),
        })
    }

    fn cleanup_expired(&self) {
        let mut cache = self.cache.lock();
        let expired: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            cache.pop(&key);
        }
    }

    fn record(&self, operation: &str, hit: bool, duration: Duration) {
        let mut stats = self.stats.lock();
        match operation {
            "get" => {
                if hit {
                    stats.hits += 1;
                } else {
                    stats.misses += 1;
                }
            }
            "set" => stats.sets += 1,
            "delete" => stats.deletes += 1,
            _ => {}
        }
        let duration_us = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        stats.avg_latency_us = u64::midpoint(stats.avg_latency_us, duration_us);
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let start = Instant::now();

        let result = {
            let mut cache = self.cache.lock();
            cache.get(key).and_then(|entry| {
                if entry.is_expired() {
                    None
                } else {
                    Some(entry.data.clone())
                }
            })
        };

        self.record("get", result.is_some(), start.elapsed());
        trace!(
            "cache GET {}: {}",
            key,
            if result.is_some() { "HIT" } else { "MISS" }
        );
        Ok(result)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StorageResult<()> {
        let start = Instant::now();

        {
            let entry = CacheEntry::new(value.to_vec(), ttl);
            self.cache.lock().put(key.to_string(), entry);
        }
        self.record("set", true, start.elapsed());

        let sets = self.stats.lock().sets;
        if sets % Self::CLEANUP_EVERY_SETS == 0 {
            self.cleanup_expired();
        }
        trace!("cache SET {}: {} bytes, TTL: {:?}", key, value.len(), ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let start = Instant::now();
        let was_present = self.cache.lock().pop(key).is_some();
        self.record("delete", was_present, start.elapsed());
        trace!(
            "cache DEL {}: {}",
            key,
            if was_present { "DELETED" } else { "NOT_FOUND" }
        );
        Ok(was_present)
    }

    async fn clear(&self) -> StorageResult<()> {
        self.cache.lock().clear();
        Ok(())
    }

    async fn stats(&self) -> StorageResult<CacheStats> {
        let stats = self.stats.lock();
        Ok(CacheStats {
            hits: stats.hits,
            misses: stats.misses,
            sets: stats.sets,
            deletes: stats.deletes,
            hit_ratio: safe_ratio(stats.hits, stats.hits + stats.misses),
            avg_latency_us: stats.avg_latency_us,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_operations_round_trip() -> StorageResult<()> {
        let cache = MemoryCache::new(128)?;

        cache.set("subject:a", b"score", None).await?;
        assert_eq!(cache.get("subject:a").await?, Some(b"score".to_vec()));

        assert!(cache.delete("subject:a").await?);
        assert_eq!(cache.get("subject:a").await?, None);
        assert!(!cache.delete("subject:a").await?);
        Ok(())
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() -> StorageResult<()> {
        let cache = MemoryCache::new(128)?;

        cache
            .set("subject:b", b"stale", Some(Duration::from_secs(1)))
            .await?;
        assert_eq!(cache.get("subject:b").await?, Some(b"stale".to_vec()));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cache.get("subject:b").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() -> StorageResult<()> {
        let cache = MemoryCache::new(128)?;

        cache.set("k", b"v", None).await?;
        cache.get("k").await?;
        cache.get("absent").await?;

        let stats = cache.stats().await?;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert!((stats.hit_ratio - 0.5).abs() < f64::EPSILON);
        Ok(())
    }

    #[tokio::test]
    async fn zero_capacity_is_rejected() {
        assert!(MemoryCache::new(0).is_err());
    }
}
