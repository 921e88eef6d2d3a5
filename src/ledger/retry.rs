//! Resilient ledger reads: bounded retry with linear backoff.
//!
//! Only transient provider errors (`BadData`, `CallException`, `NetworkError`)
//! are retried. The wrapper never wraps or replaces an error: after the
//! attempt budget is spent, the last error is propagated unchanged, and a
//! terminal error propagates immediately. Each invocation gets a fresh
//! attempt budget; there is no shared circuit-breaker state.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, Retryable};

use crate::contracts::LedgerError;

/// Configuration for resilient ledger reads.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first call. 1 means a bare call.
    pub max_attempts: usize,
    /// Base delay; attempt n waits `base_delay * n` before retrying.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// Creates a RetryConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CHAINPOS_READ_MAX_ATTEMPTS`: Total attempts per read (default: 3)
    /// - `CHAINPOS_READ_BASE_DELAY_MS`: Base backoff delay in ms (default: 500)
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_attempts: std::env::var("CHAINPOS_READ_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_attempts),
            base_delay: std::env::var("CHAINPOS_READ_BASE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default.base_delay),
        }
    }

    /// Creates the linear backoff builder for one invocation.
    pub fn backoff(&self) -> LinearBuilder {
        LinearBuilder {
            base_delay: self.base_delay,
            // Retries after the initial attempt.
            max_times: self.max_attempts.saturating_sub(1),
        }
    }
}

/// Builder for [`LinearBackoff`]. The provider's transient failures tend to
/// clear within a second or two, so the schedule grows linearly rather than
/// exponentially: 1x, 2x, 3x the base delay.
#[derive(Debug, Clone)]
pub struct LinearBuilder {
    pub base_delay: Duration,
    pub max_times: usize,
}

impl BackoffBuilder for LinearBuilder {
    type Backoff = LinearBackoff;

    fn build(self) -> LinearBackoff {
        LinearBackoff {
            base_delay: self.base_delay,
            attempt: 0,
            max_times: self.max_times,
        }
    }
}

/// Yields `base_delay * n` for n = 1..=max_times, then stops.
#[derive(Debug)]
pub struct LinearBackoff {
    base_delay: Duration,
    attempt: usize,
    max_times: usize,
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_times {
            return None;
        }
        self.attempt += 1;
        Some(self.base_delay * self.attempt as u32)
    }
}

/// Executes a ledger read with bounded retry on transient errors.
///
/// On success at any attempt the value is returned immediately with no
/// trailing delay. The final error, transient or terminal, is returned
/// unchanged.
pub async fn resilient_read<T, F, Fut>(config: &RetryConfig, op: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    op.retry(config.backoff())
        .when(LedgerError::is_transient)
        .notify(|err: &LedgerError, dur: Duration| {
            tracing::warn!(
                error = %err,
                retry_in = ?dur,
                "transient ledger read failure, retrying"
            );
        })
        .await
}
