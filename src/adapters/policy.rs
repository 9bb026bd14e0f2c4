// Copyright 2025 Cowboy AI, LLC.

//! Timeout and retry middleware
//!
//! Retries use jittered exponential backoff, capped at three attempts, and
//! only for transient error categories. Terminal errors fail immediately.

use crate::adapters::SearchError;
use crate::domain::EngineKind;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Jittered exponential backoff, max three attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), with jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.max_delay);
        // Up to 50% extra, so synchronized workers spread out.
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 2);
        capped + Duration::from_millis(jitter_ms)
    }
}

/// Enforce a hard deadline on one outbound call
pub async fn with_timeout<T, F>(
    engine: EngineKind,
    deadline: Duration,
    call: F,
) -> Result<T, SearchError>
where
    F: Future<Output = Result<T, SearchError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(SearchError::Timeout {
            engine,
            timeout_ms: deadline.as_millis() as u64,
        }),
    }
}

/// Run an operation under the retry policy
///
/// The operation receives the 1-based attempt number. Only transient errors
/// are retried; the last error is returned once attempts are exhausted.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    engine: EngineKind,
    mut operation: F,
) -> Result<T, SearchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SearchError>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                debug!(
                    engine = %engine,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
