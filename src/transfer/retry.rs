//! Retry policy for remote transfers.
//!
//! Urgent downloads have a reader blocked on them, so they get a longer
//! per-attempt deadline and a retry budget for transient failures. Prefetch
//! traffic fails fast; the predictor simply tries again on a later tick.

use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tracing::warn;

use crate::config::{PREFETCH_MAX_RETRIES, PREFETCH_TIMEOUT, URGENT_MAX_RETRIES, URGENT_TIMEOUT};
use crate::remote::client::{RemoteError, RemoteStore};
use crate::transfer::queue::Priority;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Deadline for a single attempt.
    pub attempt_timeout: Duration,
    /// Additional attempts allowed on transient errors.
    pub max_retries: u32,
    /// First backoff; doubles per attempt.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn urgent() -> Self {
        Self {
            attempt_timeout: URGENT_TIMEOUT,
            max_retries: URGENT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }

    pub fn prefetch() -> Self {
        Self {
            attempt_timeout: PREFETCH_TIMEOUT,
            max_retries: PREFETCH_MAX_RETRIES,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }

    pub fn for_priority(priority: Priority) -> Self {
        match priority {
            Priority::Urgent => Self::urgent(),
            Priority::Normal | Priority::Background => Self::prefetch(),
        }
    }

    /// Exponential backoff with up to 25% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_backoff.as_millis() as u64;
        let capped_ms = base_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_backoff.as_millis() as u64);
        let jitter = rand::rng().random_range(0..=capped_ms / 4);
        Duration::from_millis(capped_ms + jitter)
    }
}

/// Run a ranged GET under the policy's deadline, retrying transient errors
/// within the retry budget. Non-transient errors surface immediately.
pub async fn fetch_with_retry(
    store: &dyn RemoteStore,
    key: &str,
    offset: u64,
    len: u64,
    policy: &RetryPolicy,
) -> Result<Bytes, RemoteError> {
    let mut attempt: u32 = 0;
    loop {
        let outcome = tokio::time::timeout(policy.attempt_timeout, store.get_range(key, offset, len)).await;

        let err = match outcome {
            Ok(Ok(bytes)) => return Ok(bytes),
            Ok(Err(err)) if !err.is_transient() => return Err(err),
            Ok(Err(err)) => err,
            Err(_elapsed) => RemoteError::Timeout(policy.attempt_timeout),
        };

        if attempt >= policy.max_retries {
            return Err(err);
        }

        let backoff = policy.backoff(attempt);
        warn!(
            key,
            offset,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "transient download failure, backing off"
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}
