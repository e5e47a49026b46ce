//! Capped exponential backoff for transient failures
//!
//! Used around single chain fetches inside an indexer tick and around
//! transaction submission. Non-transient errors short-circuit; the final
//! transient error is returned to the caller, which decides whether the
//! failure is fatal to the surrounding operation.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::metrics::SyncMetrics;

/// Backoff policy for one retried operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first try.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling up to the
    /// cap.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

/// Run `op` with the policy, retrying transient errors only.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    metrics: &SyncMetrics,
    label: &str,
    mut op: F,
) -> SyncResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    label, attempt, policy.max_retries, delay, err
                );
                metrics.rpc_retry();
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                if err.is_transient() {
                    metrics.rpc_failure();
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_double_up_to_cap() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 3_000,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(3_000));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(3_000));
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };
        let metrics = SyncMetrics::new();
        let calls = AtomicU32::new(0);

        let result = with_retries(&policy, &metrics, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(SyncError::RpcConnection("flaky".into()))
                } else {
                    Ok(41 + 1)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.snapshot().rpc_retries, 2);
    }

    #[tokio::test]
    async fn non_transient_errors_short_circuit() {
        let policy = RetryPolicy::default();
        let metrics = SyncMetrics::new();
        let calls = AtomicU32::new(0);

        let result: SyncResult<()> = with_retries(&policy, &metrics, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(SyncError::ChainRejection {
                    message: "arena full".into(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().rpc_retries, 0);
    }

    #[tokio::test]
    async fn transient_exhaustion_returns_last_error() {
        let policy = RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        };
        let metrics = SyncMetrics::new();
        let calls = AtomicU32::new(0);

        let result: SyncResult<()> = with_retries(&policy, &metrics, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::RpcConnection("down".into())) }
        })
        .await;

        assert!(matches!(result, Err(SyncError::RpcConnection(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.snapshot().rpc_failures, 1);
    }
}
