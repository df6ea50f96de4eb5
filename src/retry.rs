//! Exponential backoff with jitter for rate-limited and transient remote
//! calls.
use log::*;
use rand::Rng;
use std::{future::Future, time::Duration};

use crate::{BuddyError, Result};

/// Default number of retries for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default delay before the first retry; doubles on each attempt.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (starting at 0), with up to 50%
    /// random jitter added.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64 * 2u64.pow(attempt);
        let jitter = if base > 0 {
            rand::thread_rng().gen_range(0..=base / 2)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }

    /// Sleeps before retry `attempt` when `err` is worth retrying. Returns
    /// false once the error is permanent or retries are exhausted.
    pub async fn backoff(
        &self,
        operation: &str,
        err: &BuddyError,
        attempt: u32,
    ) -> bool {
        if !err.is_transient() || attempt >= self.max_retries {
            return false;
        }

        let delay = self.delay(attempt);
        warn!(
            "{operation} failed with transient error: {err}: retrying in {}ms",
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;

        true
    }

    /// Runs `f` until it succeeds, fails permanently or retries run out.
    pub async fn run<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            let err = match f().await {
                Err(err) => err,
                ok => return ok,
            };

            if !self.backoff(operation, &err, attempt).await {
                return Err(err);
            }

            attempt += 1;
        }
    }
}
