//! Retry policy for upstream calls
//!
//! Every outbound call runs under an explicit timeout; a timeout counts as
//! a transient failure and consumes a retry allowance. Transient failures
//! retry up to twice with linear 100 ms backoff; permanent failures return
//! immediately.

use std::future::Future;
use std::time::Duration;

use babelcast_config::constants::fanout::{MAX_RETRIES, RETRY_BACKOFF_MS};
use babelcast_core::UpstreamError;

/// Run `op` with a timeout, retrying transient failures.
pub async fn with_retries<T, F, Fut>(
    label: &str,
    timeout: Duration,
    mut op: F,
) -> Result<T, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let mut attempt: u32 = 0;
    loop {
        let outcome = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::transient(format!("{label} timed out"))),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                attempt += 1;
                metrics::counter!("upstream_retries_total", "call" => label.to_string())
                    .increment(1);
                tracing::debug!(call = label, attempt, error = %e, "retrying transient failure");
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = with_retries("test", Duration::from_secs(1), move || {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(UpstreamError::transient("flaky"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_do_not_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<u32, _> = with_retries("test", Duration::from_secs(1), move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(UpstreamError::permanent("bad language"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<u32, _> = with_retries("test", Duration::from_secs(1), move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(UpstreamError::transient("always down"))
            }
        })
        .await;

        assert!(result.is_err());
        // Initial attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
