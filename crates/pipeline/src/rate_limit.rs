//! Partial-result rate limiter
//!
//! Fixed 200 ms windows, five per second. Arriving partials accumulate in
//! the open window; when an arrival (or an opportunistic tick) observes
//! that the window has elapsed, the window closes: the best result is
//! emitted downstream and the rest are dropped. "Best" is highest
//! stability (unknown ranks as 0), ties broken by most recent origin
//! timestamp. Finals never enter the limiter.
//!
//! Window close is lazy. There is no per-window timer; the close is
//! decided by the next arrival past the boundary or by the processor's
//! periodic tick, whichever comes first.

use std::time::{Duration, Instant};

use babelcast_config::constants::rate_limit::WINDOW_MS;
use babelcast_core::PartialResult;

/// Result of offering an event to the limiter or closing a window.
#[derive(Debug, Default)]
pub struct WindowOutcome {
    /// Best result of a closed window, to be processed downstream.
    pub emitted: Option<PartialResult>,
    /// Non-best results discarded with the closed window.
    pub dropped: usize,
}

pub struct PartialRateLimiter {
    window: Duration,
    window_start: Option<Instant>,
    pending: Vec<PartialResult>,
}

impl Default for PartialRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialRateLimiter {
    pub fn new() -> Self {
        Self {
            window: Duration::from_millis(WINDOW_MS),
            window_start: None,
            pending: Vec::new(),
        }
    }

    /// Offer an arriving partial. If the open window has elapsed it closes
    /// first and its best is returned; the new partial starts (or joins)
    /// the current window.
    pub fn offer(&mut self, partial: PartialResult, now: Instant) -> WindowOutcome {
        let outcome = self.close_if_elapsed(now);
        if self.window_start.is_none() {
            self.window_start = Some(now);
        }
        self.pending.push(partial);
        outcome
    }

    /// Close the open window if it has elapsed, emitting its best.
    pub fn close_if_elapsed(&mut self, now: Instant) -> WindowOutcome {
        match self.window_start {
            Some(start) if now.duration_since(start) >= self.window => self.close(),
            _ => WindowOutcome::default(),
        }
    }

    /// Number of partials waiting in the open window.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn close(&mut self) -> WindowOutcome {
        self.window_start = None;
        if self.pending.is_empty() {
            return WindowOutcome::default();
        }

        let mut best_idx = 0;
        for (idx, candidate) in self.pending.iter().enumerate() {
            let best = &self.pending[best_idx];
            let by_stability = candidate
                .stability_rank()
                .partial_cmp(&best.stability_rank())
                .unwrap_or(std::cmp::Ordering::Equal);
            let better = match by_stability {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Equal => {
                    candidate.origin_timestamp_ms > best.origin_timestamp_ms
                }
                std::cmp::Ordering::Less => false,
            };
            if better {
                best_idx = idx;
            }
        }

        let dropped = self.pending.len() - 1;
        let emitted = self.pending.swap_remove(best_idx);
        self.pending.clear();
        WindowOutcome {
            emitted: Some(emitted),
            dropped,
        }
    }
}
