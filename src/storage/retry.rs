//! Bounded exponential backoff for storage operations
//!
//! Transient I/O failures are retried in place; exhaustion is surfaced
//! immediately and anything still failing after the last attempt becomes
//! [`BrookError::Unavailable`].

use crate::config::RetryConfig;
use crate::error::{BrookError, Result, StorageError};
use std::time::Duration;
use tracing::{error, warn};

/// Retry policy applied to segment and checkpoint I/O
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay after the given failed attempt (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.config.initial_backoff_ms as f64
            * self.config.backoff_multiplier.powi(exponent);
        let capped = if delay.is_finite() {
            (delay as u64).min(self.config.max_backoff_ms)
        } else {
            self.config.max_backoff_ms
        };
        Duration::from_millis(capped)
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of attempts
    pub fn run<T, F>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> std::result::Result<T, StorageError>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_exhausted() => {
                    error!(operation, error = %e, "Storage exhausted");
                    return Err(BrookError::StorageExhausted(e.to_string()));
                }
                Err(e) if !e.is_transient() => return Err(BrookError::Storage(e)),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        error!(operation, attempts = attempt, error = %e, "Storage operation failed");
                        return Err(BrookError::Unavailable {
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }
                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient storage failure, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
