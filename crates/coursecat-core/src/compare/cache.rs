//! In-memory comparison cache.

use super::comparison::{ComparisonType, VersionComparison};
use crate::catalog::VersionId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache key: an ordered (source, target, type) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComparisonKey {
    pub source: VersionId,
    pub target: VersionId,
    pub comparison_type: ComparisonType,
}

impl ComparisonKey {
    /// Create a key.
    pub fn new(source: VersionId, target: VersionId, comparison_type: ComparisonType) -> Self {
        Self {
            source,
            target,
            comparison_type,
        }
    }

    /// Stable 64-bit fingerprint, used as the persisted record identifier.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"coursecat:comparison");
        hasher.update(&self.source.0.to_be_bytes());
        hasher.update(&self.target.0.to_be_bytes());
        hasher.update(&[self.comparison_type.tag()]);
        let hash = hasher.finalize();

        let mut buf = [0u8; 8];
        buf.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_be_bytes(buf)
    }

    /// Check if a stored comparison answers this key.
    pub fn matches(&self, comparison: &VersionComparison) -> bool {
        comparison.source == self.source
            && comparison.target == self.target
            && comparison.comparison_type == self.comparison_type
    }
}

#[derive(Debug)]
struct CachedComparison {
    comparison: VersionComparison,
    hit_count: AtomicU64,
    inserted: u64,
}

impl CachedComparison {
    fn record_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    fn hits(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    /// Get hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get eviction count.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

/// Bounded comparison cache. Evicts the least-hit entry when full, oldest
/// first among equals.
///
/// A capacity of zero disables caching.
pub struct ComparisonCache {
    entries: DashMap<ComparisonKey, CachedComparison>,
    max_entries: usize,
    next_insert: AtomicU64,
    stats: CacheStats,
}

impl ComparisonCache {
    /// Create a cache holding at most `max_entries` comparisons.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            next_insert: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    /// Get a cached comparison.
    pub fn get(&self, key: &ComparisonKey) -> Option<VersionComparison> {
        if let Some(entry) = self.entries.get(key) {
            entry.record_hit();
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.comparison.clone());
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or overwrite a comparison.
    pub fn insert(&self, key: ComparisonKey, comparison: VersionComparison) {
        if self.max_entries == 0 {
            return;
        }
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_least_used();
        }
        self.entries.insert(
            key,
            CachedComparison {
                comparison,
                hit_count: AtomicU64::new(0),
                inserted: self.next_insert.fetch_add(1, Ordering::Relaxed),
            },
        );
    }

    /// Drop a cached comparison.
    pub fn remove(&self, key: &ComparisonKey) {
        self.entries.remove(key);
    }

    fn evict_least_used(&self) {
        let evict_key = self
            .entries
            .iter()
            .min_by_key(|entry| (entry.value().hits(), entry.value().inserted))
            .map(|entry| *entry.key());

        if let Some(key) = evict_key {
            self.entries.remove(&key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get the current number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all cached entries.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
