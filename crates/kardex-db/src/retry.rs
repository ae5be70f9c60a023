//! # Conflict Retry
//!
//! Re-runs a whole read-plan-write transaction when it lost a race.
//!
//! ```text
//! attempt 1 ──► StaleVersion / Busy ──► sleep(backoff) ──► attempt 2 ──► ...
//!                                                              │
//!                        max_attempts reached ◄────────────────┘
//!                               │
//!                               ▼
//!                 CoreError::ConcurrencyConflict { attempts }
//! ```
//!
//! Every other error (including business errors such as insufficient stock
//! found on a re-read) is returned as-is on the attempt that produced it.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use kardex_core::CoreError;
use tracing::{debug, warn};

use crate::error::DbResult;

/// How many times, and how patiently, a conflicting transaction is re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Minimum 1.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_backoff: Duration,

    /// Upper bound for a single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 8,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_backoff,
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let mut backoff = self.backoff();
        let mut attempts = 0;

        loop {
            attempts += 1;

            match attempt().await {
                Err(err) if err.is_retryable() => {
                    if attempts >= self.max_attempts {
                        warn!(operation, attempts, error = %err, "Giving up after conflicts");
                        return Err(CoreError::ConcurrencyConflict { attempts }.into());
                    }

                    let delay = backoff
                        .next_backoff()
                        .map_or(self.max_backoff, |d| d.min(self.max_backoff));
                    debug!(operation, attempt = attempts, ?delay, error = %err, "Conflict, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
