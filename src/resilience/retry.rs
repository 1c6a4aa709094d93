// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Startup retry with exponential backoff.
//!
//! Opening the pool and creating the schema are retried while the database
//! is still coming up (refused connections, pool timeouts). Anything else,
//! a malformed URL or a rejected statement, is returned on the first attempt.
//!
//! # Example
//!
//! ```
//! use submodel_store::RetryConfig;
//! use std::time::Duration;
//!
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.attempts, 5);
//! assert_eq!(startup.delay_after(1), Duration::from_millis(200));
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

/// Backoff schedule for startup work.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::startup()
    }
}

impl RetryConfig {
    /// Five attempts over roughly five seconds.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: usize) -> Duration {
        (1..attempt).fold(self.initial_delay, |delay, _| delay.mul_f64(self.factor).min(self.max_delay))
    }

    #[cfg(test)]
    fn quick(attempts: usize) -> Self {
        Self {
            attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            factor: 2.0,
        }
    }
}

/// Whether a failure is worth another attempt during startup.
pub fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_) | sqlx::Error::WorkerCrashed
    )
}

/// Run `operation` until it succeeds, fails with a non-transient error, or
/// the attempts run out. The last error is returned.
pub async fn retry<F, Fut, T>(phase: &'static str, config: &RetryConfig, mut operation: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(phase, attempt, "Startup step recovered");
                }
                return Ok(value);
            }
            Err(err) if is_transient(&err) && attempt < config.attempts => {
                let delay = config.delay_after(attempt);
                warn!(phase, attempt, max = config.attempts, error = %err, ?delay, "Startup step failed, retrying");
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
