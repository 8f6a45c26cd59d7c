//! Feature gate with canary rollout
//!
//! Flag snapshots come from the remote oracle and are cached for 60 s.
//! Canary membership is decided by consistent hashing: the SHA-256 of the
//! session id maps to a bucket in 0..99, and a session is in the rollout
//! when its bucket is below the rollout percentage — stable for a given
//! session id under partial rollout.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

use babelcast_core::{FeatureFlagOracle, FlagSnapshot, SessionId};

/// Consistent-hash bucket in 0..99 for a session id.
pub fn canary_bucket(session_id: &str) -> u8 {
    let digest = Sha256::digest(session_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 100) as u8
}

pub struct CanaryGate {
    oracle: Arc<dyn FeatureFlagOracle>,
    parameter: String,
    cache_ttl: Duration,
    cached: Mutex<Option<(FlagSnapshot, Instant)>>,
}

impl CanaryGate {
    pub fn new(oracle: Arc<dyn FeatureFlagOracle>, parameter: String, cache_ttl: Duration) -> Self {
        Self {
            oracle,
            parameter,
            cache_ttl,
            cached: Mutex::new(None),
        }
    }

    /// Current snapshot, served from the 60 s cache when fresh. An
    /// unreachable oracle degrades to the last known snapshot, or fully-on
    /// when none exists.
    pub async fn snapshot(&self, now: Instant) -> FlagSnapshot {
        if let Some((snapshot, fetched_at)) = self.cached.lock().clone() {
            if now.duration_since(fetched_at) < self.cache_ttl {
                return snapshot;
            }
        }

        match self.oracle.get(&self.parameter).await {
            Ok(snapshot) => {
                *self.cached.lock() = Some((snapshot.clone(), now));
                snapshot
            }
            Err(e) => {
                tracing::warn!(parameter = %self.parameter, error = %e, "flag oracle unavailable");
                let stale = self.cached.lock().clone().map(|(s, _)| s);
                stale.unwrap_or_else(FlagSnapshot::full_on)
            }
        }
    }

    /// Whether partial processing is enabled for this session under the
    /// current rollout.
    pub async fn partials_enabled(&self, session_id: &SessionId, now: Instant) -> bool {
        let snapshot = self.snapshot(now).await;
        if !snapshot.enabled {
            return false;
        }
        canary_bucket(session_id) < snapshot.rollout_percentage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use babelcast_core::UpstreamError;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StaticOracle {
        snapshot: FlagSnapshot,
        calls: AtomicU32,
    }

    #[async_trait]
    impl FeatureFlagOracle for StaticOracle {
        async fn get(&self, _parameter: &str) -> Result<FlagSnapshot, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot.clone())
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl FeatureFlagOracle for FailingOracle {
        async fn get(&self, _parameter: &str) -> Result<FlagSnapshot, UpstreamError> {
            Err(UpstreamError::transient("oracle down"))
        }
    }

    fn snapshot(rollout: u8) -> FlagSnapshot {
        FlagSnapshot {
            enabled: true,
            rollout_percentage: rollout,
            min_stability_threshold: None,
            max_buffer_timeout_secs: None,
        }
    }

    #[test]
    fn buckets_are_stable_and_in_range() {
        let a = canary_bucket("golden-eagle-427");
        let b = canary_bucket("golden-eagle-427");
        assert_eq!(a, b);
        assert!(a < 100);
        // Different ids land in different buckets often enough to matter.
        let spread: std::collections::HashSet<u8> =
            (0..50).map(|i| canary_bucket(&format!("session-{i}"))).collect();
        assert!(spread.len() > 10);
    }

    #[tokio::test]
    async fn bucket_inclusion_is_strict_percentage() {
        // Find session ids hashing to buckets 9 and 10.
        let mut id_b9 = None;
        let mut id_b10 = None;
        for i in 0..100_000 {
            let id = format!("probe-{i}");
            match canary_bucket(&id) {
                9 if id_b9.is_none() => id_b9 = Some(id),
                10 if id_b10.is_none() => id_b10 = Some(id),
                _ => {}
            }
            if id_b9.is_some() && id_b10.is_some() {
                break;
            }
        }
        let id_b9 = id_b9.unwrap();
        let id_b10 = id_b10.unwrap();

        let gate = CanaryGate::new(
            Arc::new(StaticOracle {
                snapshot: snapshot(10),
                calls: AtomicU32::new(0),
            }),
            "partials".into(),
            Duration::from_secs(60),
        );
        let now = Instant::now();
        assert!(gate.partials_enabled(&id_b9, now).await);
        assert!(!gate.partials_enabled(&id_b10, now).await);
    }

    #[tokio::test]
    async fn rollout_change_flips_the_same_session() {
        // Same session id, 50% on, 10% off (bucket 48 style).
        let mut id_b48 = None;
        for i in 0..100_000 {
            let id = format!("probe-{i}");
            if canary_bucket(&id) == 48 {
                id_b48 = Some(id);
                break;
            }
        }
        let id = id_b48.unwrap();
        let now = Instant::now();

        let gate_50 = CanaryGate::new(
            Arc::new(StaticOracle {
                snapshot: snapshot(50),
                calls: AtomicU32::new(0),
            }),
            "partials".into(),
            Duration::from_secs(60),
        );
        assert!(gate_50.partials_enabled(&id, now).await);

        let gate_10 = CanaryGate::new(
            Arc::new(StaticOracle {
                snapshot: snapshot(10),
                calls: AtomicU32::new(0),
            }),
            "partials".into(),
            Duration::from_secs(60),
        );
        assert!(!gate_10.partials_enabled(&id, now).await);
    }

    #[tokio::test]
    async fn snapshot_is_cached_for_ttl() {
        let oracle = Arc::new(StaticOracle {
            snapshot: snapshot(100),
            calls: AtomicU32::new(0),
        });
        let gate = CanaryGate::new(oracle.clone(), "partials".into(), Duration::from_secs(60));

        let t0 = Instant::now();
        gate.snapshot(t0).await;
        gate.snapshot(t0 + Duration::from_secs(30)).await;
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);

        gate.snapshot(t0 + Duration::from_secs(61)).await;
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_oracle_degrades_to_full_on() {
        let gate = CanaryGate::new(Arc::new(FailingOracle), "partials".into(), Duration::from_secs(60));
        assert!(gate.partials_enabled(&"any-session".to_string(), Instant::now()).await);
    }
}
