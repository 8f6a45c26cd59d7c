//! Audio admission rate limiting
//!
//! Token bucket per session: sustained 10 audio frames per second with a
//! burst allowance of 20. Refill is continuous, computed on each check.

use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("audio rate limit exceeded, retry after {retry_after_ms} ms")]
pub struct RateLimitError {
    pub retry_after_ms: u64,
}

pub struct AudioRateLimiter {
    rate_per_sec: f64,
    burst: f64,
    tokens: f64,
    last_refill: Instant,
}

impl AudioRateLimiter {
    pub fn new(rate_per_sec: u32, burst: u32, now: Instant) -> Self {
        Self {
            rate_per_sec: rate_per_sec as f64,
            burst: burst as f64,
            tokens: burst as f64,
            last_refill: now,
        }
    }

    /// Take one token, refilling by elapsed time first.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), RateLimitError> {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.burst);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(RateLimitError {
                retry_after_ms: ((deficit / self.rate_per_sec) * 1_000.0).ceil() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn burst_allowance_then_limit() {
        let t0 = Instant::now();
        let mut limiter = AudioRateLimiter::new(10, 20, t0);

        // The full burst passes at once.
        for _ in 0..20 {
            assert!(limiter.try_acquire(t0).is_ok());
        }
        let err = limiter.try_acquire(t0).unwrap_err();
        assert!(err.retry_after_ms > 0);
    }

    #[test]
    fn tokens_refill_at_sustained_rate() {
        let t0 = Instant::now();
        let mut limiter = AudioRateLimiter::new(10, 20, t0);
        for _ in 0..20 {
            limiter.try_acquire(t0).unwrap();
        }

        // 100 ms refills one token at 10/s.
        let later = t0 + Duration::from_millis(100);
        assert!(limiter.try_acquire(later).is_ok());
        assert!(limiter.try_acquire(later).is_err());
    }

    #[test]
    fn refill_never_exceeds_burst() {
        let t0 = Instant::now();
        let mut limiter = AudioRateLimiter::new(10, 20, t0);

        let much_later = t0 + Duration::from_secs(60);
        for _ in 0..20 {
            assert!(limiter.try_acquire(much_later).is_ok());
        }
        assert!(limiter.try_acquire(much_later).is_err());
    }
}
