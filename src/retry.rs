//! Timeout and bounded retry around external calls.
//!
//! Every call to the generation or delivery service runs under a
//! [`RetryPolicy`]: each attempt is capped by `timeout`, and at most
//! [`MAX_RETRIES`] extra attempts are made for errors that are safe to repeat.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{DeliveryError, LlmError};

/// Upper bound on `RetryPolicy::max_retries`.
pub const MAX_RETRIES: u32 = 1;

/// Per-call timeout and retry budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Extra attempts after the first one (clamped to [`MAX_RETRIES`]).
    pub max_retries: u32,
    /// Pause before a retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries: max_retries.min(MAX_RETRIES),
            backoff: Duration::from_secs(2),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 0)
    }
}

/// Errors that can be produced by an attempt timing out and that know
/// whether a repeat attempt is safe.
pub trait Retryable {
    fn timed_out(after: Duration) -> Self;
    fn is_retryable(&self) -> bool;
}

impl Retryable for LlmError {
    fn timed_out(after: Duration) -> Self {
        LlmError::Timeout(after)
    }

    fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Timeout(_) => true,
            LlmError::RequestFailed { reason, .. } => {
                reason.starts_with("HTTP 5") || reason.starts_with("connection")
            }
            LlmError::AuthFailed { .. } | LlmError::InvalidResponse { .. } => false,
        }
    }
}

impl Retryable for DeliveryError {
    fn timed_out(after: Duration) -> Self {
        DeliveryError::Timeout(after)
    }

    // Only failures where nothing reached the transport are repeated.
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::Unavailable { .. } | DeliveryError::RateLimited { .. }
        )
    }
}

/// Run `call` under `policy`, retrying retryable failures.
pub async fn with_policy<T, E, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_retries = policy.max_retries.min(MAX_RETRIES);
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(policy.timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries && e.is_retryable() => {
                attempt += 1;
                warn!(
                    operation = operation,
                    attempt = attempt,
                    error = %e,
                    "Retrying after failure"
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
