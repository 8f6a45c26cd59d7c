//! Result buffer
//!
//! Holds partials awaiting their final, keyed by result id. Capacity is an
//! estimated word count (300 words ≈ 30 wpm over a 10 s horizon); on
//! overflow the oldest entries whose stability clears the session threshold
//! (or is unknown) are shed first, up to five per pass. Removal happens by
//! id, by a ± 5 s timestamp window around an arriving final, or by orphan
//! age. Origin-timestamp order is imposed on read, never on insert.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use babelcast_config::constants::buffer::{MAX_ESTIMATED_WORDS, MATCH_WINDOW_MS, SHED_BATCH};
use babelcast_core::PartialResult;

/// A partial held in the buffer.
#[derive(Debug, Clone)]
pub struct BufferedResult {
    pub partial: PartialResult,
    pub added_at: Instant,
    /// Set once when the text is handed downstream; never cleared.
    pub forwarded: bool,
}

pub struct ResultBuffer {
    entries: HashMap<String, BufferedResult>,
    min_stability: f32,
}

impl ResultBuffer {
    pub fn new(min_stability: f32) -> Self {
        Self {
            entries: HashMap::new(),
            min_stability,
        }
    }

    /// Insert or refresh a partial. A refresh keeps the original
    /// `added_at` and `forwarded` bit so hold timers and set-once
    /// semantics survive revisions. Returns entries shed to stay within
    /// the word-count capacity.
    pub fn insert(&mut self, partial: PartialResult, now: Instant) -> Vec<BufferedResult> {
        match self.entries.get_mut(&partial.result_id) {
            Some(existing) => {
                existing.partial = partial;
            }
            None => {
                self.entries.insert(
                    partial.result_id.clone(),
                    BufferedResult {
                        partial,
                        added_at: now,
                        forwarded: false,
                    },
                );
            }
        }
        self.shed_overflow()
    }

    pub fn get(&self, result_id: &str) -> Option<&BufferedResult> {
        self.entries.get(result_id)
    }

    pub fn remove_by_id(&mut self, result_id: &str) -> Option<BufferedResult> {
        self.entries.remove(result_id)
    }

    /// Remove every entry whose origin timestamp falls within ± 5 s of the
    /// given center (final-to-partial correlation).
    pub fn remove_in_window(&mut self, center_ts_ms: u64) -> Vec<BufferedResult> {
        let low = center_ts_ms.saturating_sub(MATCH_WINDOW_MS);
        let high = center_ts_ms.saturating_add(MATCH_WINDOW_MS);
        let ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                let ts = e.partial.origin_timestamp_ms;
                ts >= low && ts <= high
            })
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| self.entries.remove(id))
            .collect()
    }

    /// Ids of entries older than `max_age`. Age is judged by buffer
    /// residence; the returned ids are ordered by origin timestamp, since
    /// temporal order is imposed on read.
    pub fn orphans(&self, now: Instant, max_age: Duration) -> Vec<String> {
        let mut aged: Vec<(&String, u64)> = self
            .entries
            .iter()
            .filter(|(_, e)| now.duration_since(e.added_at) > max_age)
            .map(|(id, e)| (id, e.partial.origin_timestamp_ms))
            .collect();
        aged.sort_by_key(|(_, origin)| *origin);
        aged.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Unforwarded entries, for boundary-timeout flushing.
    pub fn unforwarded_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.forwarded)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn mark_forwarded(&mut self, result_id: &str) {
        if let Some(entry) = self.entries.get_mut(result_id) {
            entry.forwarded = true;
        }
    }

    /// Estimated total word count across buffered entries.
    pub fn estimated_words(&self) -> usize {
        self.entries.values().map(|e| e.partial.word_count()).sum()
    }

    /// Entries sorted by origin timestamp (imposed on read; arrival order
    /// is unconstrained).
    pub fn sorted_by_origin(&self) -> Vec<&BufferedResult> {
        let mut out: Vec<&BufferedResult> = self.entries.values().collect();
        out.sort_by_key(|e| e.partial.origin_timestamp_ms);
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn shed_overflow(&mut self) -> Vec<BufferedResult> {
        let mut shed = Vec::new();
        while self.estimated_words() > MAX_ESTIMATED_WORDS {
            // Oldest entries that are stable (or unknown) go first.
            let mut candidates: Vec<(&String, Instant)> = self
                .entries
                .iter()
                .filter(|(_, e)| match e.partial.stability {
                    Some(s) => s >= self.min_stability,
                    None => true,
                })
                .map(|(id, e)| (id, e.added_at))
                .collect();
            candidates.sort_by_key(|(_, at)| *at);
            let mut ids: Vec<String> = candidates
                .into_iter()
                .take(SHED_BATCH)
                .map(|(id, _)| id.clone())
                .collect();

            if ids.is_empty() {
                // Nothing qualifies; shed the oldest outright so the
                // capacity invariant holds.
                let mut by_age: Vec<(&String, Instant)> = self
                    .entries
                    .iter()
                    .map(|(id, e)| (id, e.added_at))
                    .collect();
                by_age.sort_by_key(|(_, at)| *at);
                ids = by_age
                    .into_iter()
                    .take(SHED_BATCH)
                    .map(|(id, _)| id.clone())
                    .collect();
            }
            if ids.is_empty() {
                break;
            }
            for id in ids {
                if let Some(entry) = self.entries.remove(&id) {
                    shed.push(entry);
                }
            }
        }
        shed
    }
}
