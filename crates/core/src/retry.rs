use std::fmt::Display;
use std::future::Future;

use tracing::warn;

/// Errors that can tell whether repeating the whole step might succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Bounded retry around a transactional step.
///
/// The step receives the 1-based attempt number and must be safe to run again from
/// scratch, i.e. every attempt opens and finishes its own transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts: max_attempts.max(1) }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn run<T, E, F, Fut>(&self, operation: &'static str, mut step: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 1;
        loop {
            match step(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        event_name = "engine.retry.attempt_failed",
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %error,
                        "retryable failure, repeating step"
                    );
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
