//! Bounded retry with a fixed delay
//!
//! The dominant failure is a transient challenge/render timeout rather than
//! load-based backpressure, so the delay between attempts is constant.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Classifies errors that are worth another attempt
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Failure of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// Every attempt failed; carries the last failure
    #[error("gave up after {attempts} attempt(s): {last_error}")]
    Exhausted {
        attempts: u32,
        #[source]
        last_error: E,
    },

    /// A non-retryable failure stopped the loop early
    #[error("non-retryable failure on attempt {attempts}: {error}")]
    Fatal {
        attempts: u32,
        #[source]
        error: E,
    },

    /// Cancellation fired before the next attempt; carries the last failure
    #[error("cancelled after {attempts} attempt(s): {last_error}")]
    Cancelled {
        attempts: u32,
        #[source]
        last_error: E,
    },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::Fatal { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last_error, .. } | Self::Cancelled { last_error, .. } => last_error,
            Self::Fatal { error, .. } => error,
        }
    }
}

/// Retry settings: `max_retries` additional attempts, `retry_delay` apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// A policy that makes exactly one attempt
    pub fn no_retries() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Runs `op` until it succeeds, fails fatally, or runs out of attempts
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn attempt<T, E, F, Fut>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::error::Error + 'static,
    {
        self.attempt_until_cancelled(&CancellationToken::new(), op).await
    }

    /// Like [`attempt`](Self::attempt), but stops retrying once `cancel` fires
    ///
    /// An attempt already running is allowed to finish. A failure observed
    /// after cancellation, or a cancellation during the delay, returns
    /// `RetryError::Cancelled` instead of issuing another attempt.
    pub async fn attempt_until_cancelled<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::error::Error + 'static,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_retryable() => {
                    return Err(RetryError::Fatal {
                        attempts: attempt,
                        error,
                    });
                }
                Err(error) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last_error: error,
                    });
                }
                Err(error) if cancel.is_cancelled() => {
                    return Err(RetryError::Cancelled {
                        attempts: attempt,
                        last_error: error,
                    });
                }
                Err(error) => {
                    tracing::debug!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        max_attempts,
                        error,
                        self.retry_delay
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(RetryError::Cancelled {
                                attempts: attempt,
                                last_error: error,
                            });
                        }
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}
