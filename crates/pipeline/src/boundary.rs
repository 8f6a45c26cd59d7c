//! Sentence-boundary detection
//!
//! A buffered result is "complete" — ready to forward — when any of four
//! rules holds: it is a final result; its stripped text ends with sentence
//! punctuation; the speaker has paused (no forward within the pause
//! threshold); or the entry has sat in the buffer past the session's
//! buffer timeout.

use std::time::{Duration, Instant};

pub struct SentenceBoundaryDetector {
    pause_threshold: Duration,
    max_buffer_timeout: Duration,
}

impl SentenceBoundaryDetector {
    pub fn new(pause_threshold: Duration, max_buffer_timeout: Duration) -> Self {
        Self {
            pause_threshold,
            max_buffer_timeout,
        }
    }

    pub fn is_complete(
        &self,
        text: &str,
        is_final: bool,
        added_at: Instant,
        last_forwarded_at: Instant,
        now: Instant,
    ) -> bool {
        if is_final {
            return true;
        }
        let stripped = text.trim();
        if stripped.ends_with('.') || stripped.ends_with('?') || stripped.ends_with('!') {
            return true;
        }
        if now.duration_since(last_forwarded_at) >= self.pause_threshold {
            return true;
        }
        now.duration_since(added_at) >= self.max_buffer_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> SentenceBoundaryDetector {
        SentenceBoundaryDetector::new(Duration::from_secs(2), Duration::from_secs(5))
    }

    #[test]
    fn finals_are_always_complete() {
        let d = detector();
        let now = Instant::now();
        assert!(d.is_complete("still going", true, now, now, now));
    }

    #[test]
    fn terminal_punctuation_completes() {
        let d = detector();
        let now = Instant::now();
        assert!(d.is_complete("This is done.", false, now, now, now));
        assert!(d.is_complete("Is it done? ", false, now, now, now));
        assert!(d.is_complete("Done!", false, now, now, now));
        assert!(!d.is_complete("not yet", false, now, now, now));
    }

    #[test]
    fn pause_threshold_completes() {
        let d = detector();
        let t0 = Instant::now();
        let now = t0 + Duration::from_secs(3);
        // Last forward 3 s ago > 2 s pause threshold.
        assert!(d.is_complete("trailing words", false, now, t0, now));
    }

    #[test]
    fn buffer_timeout_boundary_is_inclusive() {
        let d = detector();
        let t0 = Instant::now();
        let now = t0 + Duration::from_secs(5);
        // added_at == now - max_buffer_timeout is treated as complete.
        assert!(d.is_complete("ongoing words", false, t0, now, now));

        let just_before = t0 + Duration::from_millis(4_999);
        assert!(!d.is_complete("ongoing words", false, t0, just_before, just_before));
    }
}
