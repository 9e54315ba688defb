//! Bounded retry for flaky collaborator lookups.
//!
//! The operation receives the zero-based attempt number, so callers can vary
//! the request per attempt (the fundamentals lookup probes one day further
//! back on each attempt). `Ok(None)` and `Err(_)` both count as a miss.

use std::future::Future;
use std::time::Duration;

use crate::SignalError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Single attempt, no waiting.
    pub const fn fail_fast() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `op` until it yields a value or attempts run out.
    ///
    /// Returns the first value, or the last error if every attempt failed with
    /// one, or `Ok(None)` if the final attempt was an empty result.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<Option<T>, SignalError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, SignalError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last = Ok(None);

        for attempt in 0..attempts {
            if attempt > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match op(attempt).await {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {
                    tracing::debug!("{}: attempt {}/{} returned nothing", label, attempt + 1, attempts);
                    last = Ok(None);
                }
                Err(e) => {
                    tracing::debug!("{}: attempt {}/{} failed: {}", label, attempt + 1, attempts, e);
                    last = Err(e);
                }
            }
        }

        last
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fail_fast()
    }
}
