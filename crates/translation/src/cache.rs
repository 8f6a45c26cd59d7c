//! Translation cache
//!
//! Keyed by `{src}:{tgt}:{hash16}`. Entries carry a TTL (default 3600 s)
//! and access bookkeeping; when the cache grows past its cap the 10%
//! least-recently-accessed entries are evicted. Reads are concurrent;
//! eviction is serialized behind a mutex so only one writer compacts.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

use babelcast_config::constants::translation_cache::EVICTION_FRACTION;

#[derive(Debug, Clone)]
struct CacheEntry {
    translated_text: String,
    inserted_at: Instant,
    last_accessed_at: Instant,
    access_count: u64,
    ttl: Duration,
}

/// Counters exposed for metrics and the status endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct TranslationCache {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
    default_ttl: Duration,
    stats: Mutex<CacheStats>,
    eviction_guard: Mutex<()>,
}

impl TranslationCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            default_ttl,
            stats: Mutex::new(CacheStats::default()),
            eviction_guard: Mutex::new(()),
        }
    }

    /// Look up a translation, bumping access counters on hit. Expired
    /// entries are removed lazily on lookup.
    pub fn get(&self, key: &str, now: Instant) -> Option<String> {
        let expired = match self.entries.get_mut(key) {
            Some(mut entry) => {
                if now.duration_since(entry.inserted_at) >= entry.ttl {
                    true
                } else {
                    entry.access_count += 1;
                    entry.last_accessed_at = now;
                    self.stats.lock().hits += 1;
                    return Some(entry.translated_text.clone());
                }
            }
            None => {
                self.stats.lock().misses += 1;
                return None;
            }
        };
        if expired {
            self.entries.remove(key);
        }
        self.stats.lock().misses += 1;
        None
    }

    /// Insert a translation, evicting the LRU tail if over capacity.
    pub fn insert(&self, key: String, translated_text: String, now: Instant) {
        self.entries.insert(
            key,
            CacheEntry {
                translated_text,
                inserted_at: now,
                last_accessed_at: now,
                access_count: 0,
                ttl: self.default_ttl,
            },
        );
        if self.entries.len() > self.max_entries {
            self.evict_lru();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }

    fn evict_lru(&self) {
        let _guard = self.eviction_guard.lock();
        if self.entries.len() <= self.max_entries {
            return;
        }

        let mut by_access: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().last_accessed_at))
            .collect();
        by_access.sort_by_key(|(_, at)| *at);

        let evict_count = ((self.max_entries as f64) * EVICTION_FRACTION).ceil() as usize;
        let evict_count = evict_count.max(self.entries.len() - self.max_entries);
        let mut evicted = 0u64;
        for (key, _) in by_access.into_iter().take(evict_count) {
            if self.entries.remove(&key).is_some() {
                evicted += 1;
            }
        }
        self.stats.lock().evictions += evicted;
        tracing::debug!(evicted, remaining = self.entries.len(), "translation cache evicted LRU tail");
    }
}
