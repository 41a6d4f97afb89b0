//! L1: per-process bounded LRU cache with TTL entries.

use crate::entry::CacheEntry;
use crate::key::CacheKey;
use chrono::{DateTime, Utc};
use loam_model::DnsRecord;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// L1 cache configuration.
#[derive(Debug, Clone)]
pub struct LocalCacheConfig {
    /// Maximum number of entries before LRU eviction.
    pub max_entries: usize,
    /// Background sweep interval; `Duration::ZERO` disables the sweeper.
    pub cleanup_interval: Duration,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// A point-in-time view of the cache statistics.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    /// Lookup hits.
    pub hits: u64,
    /// Lookup misses (absent or expired).
    pub misses: u64,
    /// LRU evictions.
    pub evictions: u64,
    /// Current entry count.
    pub entries: usize,
    /// When the background sweep last ran.
    pub last_cleanup: Option<DateTime<Utc>>,
    /// Hit percentage over all lookups.
    pub hit_rate: f64,
}

/// Per-process LRU cache mapping fingerprints to record groups.
///
/// A `get` that finds an expired entry removes it and reports a miss; the
/// background sweep only bounds memory under low-read load.
pub struct LocalCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    // Epoch seconds of the last sweep; 0 = never.
    last_cleanup: AtomicI64,
}

impl LocalCache {
    /// Creates a cache bounded to `config.max_entries`.
    pub fn new(config: &LocalCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries.max(1)).expect("max(1) is non-zero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            last_cleanup: AtomicI64::new(0),
        }
    }

    /// Looks up a record group. Expired entries are removed and count as
    /// misses; hits refresh the entry's LRU position.
    pub fn get(&self, key: &CacheKey) -> Option<Vec<DnsRecord>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let hit = match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch(now);
                Some(entry.records.clone())
            }
            Some(_) => None,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match hit {
            Some(records) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(records)
            }
            None => {
                entries.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts or overwrites a record group with the given TTL, evicting
    /// the least-recently-used entry if the bound would be exceeded.
    pub fn insert(&self, key: CacheKey, records: Vec<DnsRecord>, ttl: Duration) {
        let mut entries = self.entries.lock();
        let replacing = entries.contains(&key);
        if let Some((evicted, _)) = entries.push(key, CacheEntry::new(records, ttl)) {
            // push returns the displaced LRU victim; replacing an existing
            // key returns that key's old entry, which is not an eviction.
            if !replacing {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %evicted, "evicted LRU cache entry");
            }
        }
    }

    /// Removes one key.
    pub fn remove(&self, key: &CacheKey) {
        self.entries.lock().pop(key);
    }

    /// Removes every key belonging to `name`, returning how many were
    /// dropped. Used by whole-name invalidation for types outside the
    /// common set.
    pub fn remove_name(&self, name: &str) -> usize {
        let mut entries = self.entries.lock();
        let doomed: Vec<CacheKey> = entries
            .iter()
            .filter(|(key, _)| key.is_for_name(name))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    /// Drops all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Current entry count.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Removes expired entries; called by the background sweeper.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let doomed: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        drop(entries);

        if !doomed.is_empty() {
            debug!(removed = doomed.len(), "cache sweep removed expired entries");
        }
        self.last_cleanup
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> StatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64 * 100.0
        };
        let last_cleanup = match self.last_cleanup.load(Ordering::Relaxed) {
            0 => None,
            secs => DateTime::from_timestamp(secs, 0),
        };

        StatsSnapshot {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
            last_cleanup,
            hit_rate,
        }
    }
}

/// Spawns the periodic sweep task. The task runs until aborted.
pub fn spawn_sweeper(cache: Arc<LocalCache>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            cache.sweep();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_model::RecordType;

    fn cache(max_entries: usize) -> LocalCache {
        LocalCache::new(&LocalCacheConfig {
            max_entries,
            cleanup_interval: Duration::ZERO,
        })
    }

    fn key(s: &str) -> CacheKey {
        CacheKey::from_fingerprint(s)
    }

    fn records(target: &str) -> Vec<DnsRecord> {
        vec![DnsRecord::new("x.test.internal", RecordType::A, target, 300)]
    }

    #[test]
    fn test_get_set_roundtrip() {
        let cache = cache(10);
        cache.insert(key("x.test.internal:A"), records("10.0.0.1"), Duration::from_secs(30));

        let hit = cache.get(&key("x.test.internal:A")).unwrap();
        assert_eq!(hit[0].target, "10.0.0.1");
        assert!(cache.get(&key("y.test.internal:A")).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_expired_entry_is_miss_and_removed() {
        let cache = cache(10);
        cache.insert(key("x:A"), records("10.0.0.1"), Duration::ZERO);

        assert!(cache.get(&key("x:A")).is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_lru_eviction_at_bound() {
        let cache = cache(3);
        for i in 0..3 {
            cache.insert(key(&format!("k{i}:A")), records("10.0.0.1"), Duration::from_secs(60));
        }
        // Touch k0 so k1 becomes least recently used.
        assert!(cache.get(&key("k0:A")).is_some());

        // The max_entries + 1'th insertion evicts exactly the LRU entry.
        cache.insert(key("k3:A"), records("10.0.0.2"), Duration::from_secs(60));
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&key("k1:A")).is_none());
        assert!(cache.get(&key("k0:A")).is_some());
        assert!(cache.get(&key("k3:A")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_is_not_eviction() {
        let cache = cache(2);
        cache.insert(key("k:A"), records("10.0.0.1"), Duration::from_secs(60));
        cache.insert(key("k:A"), records("10.0.0.2"), Duration::from_secs(60));
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get(&key("k:A")).unwrap()[0].target, "10.0.0.2");
    }

    #[test]
    fn test_remove_name() {
        let cache = cache(10);
        cache.insert(key("a.test:A"), records("10.0.0.1"), Duration::from_secs(60));
        cache.insert(key("a.test:TXT"), records("10.0.0.1"), Duration::from_secs(60));
        cache.insert(key("b.test:A"), records("10.0.0.1"), Duration::from_secs(60));

        assert_eq!(cache.remove_name("a.test"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("b.test:A")).is_some());
    }

    #[test]
    fn test_sweep_removes_expired() {
        let cache = cache(10);
        cache.insert(key("dead:A"), records("10.0.0.1"), Duration::ZERO);
        cache.insert(key("live:A"), records("10.0.0.1"), Duration::from_secs(60));

        cache.sweep();
        assert_eq!(cache.len(), 1);
        assert!(cache.stats().last_cleanup.is_some());
    }

    #[test]
    fn test_clear() {
        let cache = cache(10);
        cache.insert(key("k:A"), records("10.0.0.1"), Duration::from_secs(60));
        cache.clear();
        assert!(cache.is_empty());
    }
}
