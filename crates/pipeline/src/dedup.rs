//! Dedup cache
//!
//! Short-TTL memo of normalized-text hashes that suppresses repeat
//! forwards of semantically identical text. Entries expire lazily: an
//! opportunistic sweep runs behind `maybe_sweep(now)` at most every 30 s,
//! and growing past 10 000 entries triggers an emergency flush that
//! empties the cache outright.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use babelcast_config::constants::dedup::{MAX_ENTRIES, SWEEP_INTERVAL_SECS};
use babelcast_translation::{hash16, normalize};

pub struct DedupCache {
    entries: HashMap<String, Instant>,
    ttl: Duration,
    last_sweep: Instant,
}

impl DedupCache {
    pub fn new(ttl: Duration, now: Instant) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            last_sweep: now,
        }
    }

    /// Hash key for a raw text, normalization included.
    pub fn key_for(text: &str) -> String {
        hash16(&normalize(text))
    }

    /// Whether an unexpired entry exists for this key.
    pub fn contains(&self, key: &str, now: Instant) -> bool {
        match self.entries.get(key) {
            Some(added_at) => now.duration_since(*added_at) < self.ttl,
            None => false,
        }
    }

    /// Record a forward. Inserted before the forward is initiated so the
    /// race window between check and dispatch stays closed. Inserting into
    /// a full cache flushes everything first; the new entry is retained.
    pub fn insert(&mut self, key: String, now: Instant) {
        if self.entries.len() >= MAX_ENTRIES && !self.entries.contains_key(&key) {
            let flushed = self.entries.len();
            self.entries.clear();
            tracing::warn!(flushed, "dedup cache over capacity, emergency flush");
        }
        self.entries.insert(key, now);
    }

    /// Sweep expired entries if at least 30 s have passed since the last
    /// sweep. Returns the number of entries removed.
    pub fn maybe_sweep(&mut self, now: Instant) -> usize {
        if now.duration_since(self.last_sweep) < Duration::from_secs(SWEEP_INTERVAL_SECS) {
            return 0;
        }
        self.last_sweep = now;
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, added_at| now.duration_since(*added_at) < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_text_maps_to_one_key() {
        assert_eq!(DedupCache::key_for("Thank you."), DedupCache::key_for("thank YOU!"));
        assert_ne!(DedupCache::key_for("Thank you"), DedupCache::key_for("thanks"));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let t0 = Instant::now();
        let mut cache = DedupCache::new(Duration::from_secs(10), t0);
        let key = DedupCache::key_for("hello");
        cache.insert(key.clone(), t0);

        assert!(cache.contains(&key, t0 + Duration::from_secs(9)));
        assert!(!cache.contains(&key, t0 + Duration::from_secs(10)));
    }

    #[test]
    fn sweep_respects_interval() {
        let t0 = Instant::now();
        let mut cache = DedupCache::new(Duration::from_secs(1), t0);
        cache.insert("a".into(), t0);

        // Too soon: nothing swept even though the entry expired.
        assert_eq!(cache.maybe_sweep(t0 + Duration::from_secs(5)), 0);
        assert_eq!(cache.len(), 1);

        // Past the 30 s interval the expired entry goes.
        assert_eq!(cache.maybe_sweep(t0 + Duration::from_secs(31)), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn emergency_flush_retains_the_new_entry() {
        let t0 = Instant::now();
        let mut cache = DedupCache::new(Duration::from_secs(3600), t0);
        for i in 0..MAX_ENTRIES {
            cache.insert(format!("k{i}"), t0);
        }
        assert_eq!(cache.len(), MAX_ENTRIES);

        // At capacity, the next insert flushes and keeps only itself.
        cache.insert("overflow".into(), t0);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("overflow", t0));
        assert!(!cache.contains("k0", t0));
    }
}
