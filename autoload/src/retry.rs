//! Bounded retry loops
//!
//! Both the readiness poll and the service's per-source fetch are fixed-count
//! loops with a constant delay so their worst-case latency is known up front.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Attempt budget and fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Readiness poll: 30 attempts, 2 s apart
    pub const READINESS: RetryPolicy = RetryPolicy {
        max_attempts: 30,
        delay: Duration::from_secs(2),
    };

    /// Per-source fetch in the cache service: 60 attempts, 1 s apart
    pub const FETCH: RetryPolicy = RetryPolicy {
        max_attempts: 60,
        delay: Duration::from_secs(1),
    };

    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Worst-case time spent sleeping
    pub fn max_wait(&self) -> Duration {
        self.delay * self.max_attempts.saturating_sub(1)
    }

    /// Run `op` until it succeeds or the attempt budget is spent
    ///
    /// Returns the last error on exhaustion. No sleep follows the final attempt.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    debug!(
                        what,
                        attempt,
                        max = self.max_attempts,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
