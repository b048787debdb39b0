//! Bounded retry with exponential backoff, and error translation.
//!
//! [`RetryPolicy`] re-runs an operation while it fails with a retryable
//! error. [`guard`] and [`guard_async`] convert arbitrary failures into the
//! crate [`Error`] taxonomy at an operation boundary.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::config::ModelConfig;
use crate::error::{
    AgentError, ConfigError, DocumentError, Error, LlmError, Result, VectorStoreError,
};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_MIN_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    min_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. Requires `max_attempts >= 1` and
    /// `min_backoff <= max_backoff`.
    pub fn new(
        max_attempts: u32,
        min_backoff: Duration,
        max_backoff: Duration,
    ) -> std::result::Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_attempts",
                value: "0".to_string(),
                expected: ">= 1",
            });
        }
        if min_backoff > max_backoff {
            return Err(ConfigError::InvalidValue {
                field: "min_backoff",
                message: format!("{min_backoff:?} exceeds max_backoff {max_backoff:?}"),
            });
        }
        Ok(Self {
            max_attempts,
            min_backoff,
            max_backoff,
        })
    }

    /// A policy that retries without waiting.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Default backoff with `max_retries + 1` attempts.
    #[must_use]
    pub fn for_model(config: &ModelConfig) -> Self {
        Self {
            max_attempts: config.max_retries().saturating_add(1),
            ..Self::default()
        }
    }

    /// Total attempts, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.min_backoff
            .saturating_mul(factor)
            .clamp(self.min_backoff, self.max_backoff)
    }

    /// Runs `op`, blocking the thread between attempts.
    ///
    /// Stops at the first success, the first error for which `is_retryable`
    /// is false, or after `max_attempts` failures, returning the last error.
    pub fn run<T, E, F, P>(
        &self,
        operation: &str,
        mut op: F,
        is_retryable: P,
    ) -> std::result::Result<T, E>
    where
        E: Display,
        F: FnMut() -> std::result::Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        ?delay,
                        error = %e,
                        "Retry attempt {}/{}",
                        attempt,
                        self.max_attempts
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Async counterpart of [`RetryPolicy::run`]; waits with `tokio::time::sleep`.
    pub async fn run_async<T, E, F, Fut, P>(
        &self,
        operation: &str,
        mut op: F,
        is_retryable: P,
    ) -> std::result::Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        ?delay,
                        error = %e,
                        "Retry attempt {}/{}",
                        attempt,
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Runs `f` and translates its error into [`Error`].
///
/// Errors already in the crate taxonomy pass through unchanged; anything
/// else becomes [`Error::Unexpected`] naming `operation`. Every failure is
/// logged with the operation name.
pub fn guard<T>(operation: &str, f: impl FnOnce() -> anyhow::Result<T>) -> Result<T> {
    f().map_err(|e| translate(operation, e))
}

/// Async counterpart of [`guard`].
pub async fn guard_async<T, Fut>(operation: &str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    fut.await.map_err(|e| translate(operation, e))
}

/// Converts an `anyhow` error into the crate taxonomy.
pub fn translate(operation: &str, err: anyhow::Error) -> Error {
    let translated = match err.downcast::<Error>() {
        Ok(e) => e,
        Err(err) => match err.downcast::<ConfigError>() {
            Ok(e) => e.into(),
            Err(err) => match err.downcast::<DocumentError>() {
                Ok(e) => e.into(),
                Err(err) => match err.downcast::<VectorStoreError>() {
                    Ok(e) => e.into(),
                    Err(err) => match err.downcast::<LlmError>() {
                        Ok(e) => e.into(),
                        Err(err) => match err.downcast::<AgentError>() {
                            Ok(e) => e.into(),
                            Err(err) => Error::Unexpected {
                                operation: operation.to_string(),
                                source: err.into(),
                            },
                        },
                    },
                },
            },
        },
    };
    error!(operation, error = %translated, "Operation failed");
    translated
}
