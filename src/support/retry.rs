//! Retry with exponential backoff
//!
//! Generic retry helper for transient failures (locked database, transaction
//! conflicts). Ledger and occupancy writes go through it so that two requests
//! racing on the same row resolve instead of failing outright.

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::RetrySettings;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_multiplier: f64,
    /// Maximum delay between retries (cap).
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(500),
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            initial_delay: Duration::from_millis(s.initial_delay_ms),
            backoff_multiplier: s.backoff_multiplier,
            max_delay: Duration::from_millis(s.max_delay_ms),
        }
    }
}

/// Execute an async operation with exponential backoff retry.
///
/// The `should_retry` closure determines whether a given error is transient
/// (and therefore retryable) or permanent (bail immediately).
///
/// # Example
/// ```ignore
/// let receipt = retry_with_backoff(
///     &RetryConfig::default(),
///     || ledger.debit(request.clone()),
///     DomainError::is_transient,
///     "ledger_debit",
/// ).await?;
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
    operation_name: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= config.max_attempts || !should_retry(&err) {
                    if attempt > 1 {
                        warn!(
                            operation = operation_name,
                            attempt,
                            max_attempts = config.max_attempts,
                            error = %err,
                            "Operation failed permanently"
                        );
                    }
                    return Err(err);
                }

                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = config.max_attempts,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "Transient failure, retrying"
                );
                metrics::counter!("parking_store_retries_total", "operation" => operation_name.to_string())
                    .increment(1);

                tokio::time::sleep(delay).await;

                delay = next_delay(delay, config);
                attempt += 1;
            }
        }
    }
}

/// Exponential step capped at `max_delay`. A multiplier below one or not
/// finite keeps the delay constant.
fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    let factor = if config.backoff_multiplier.is_finite() {
        config.backoff_multiplier.max(1.0)
    } else {
        1.0
    };
    let next = (delay.as_secs_f64() * factor).min(config.max_delay.as_secs_f64());
    Duration::try_from_secs_f64(next).unwrap_or(config.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::support::errors::DomainError;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, DomainError> = retry_with_backoff(
            &fast(),
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(DomainError::Conflict("database is locked".into()))
                } else {
                    Ok(n)
                }
            },
            DomainError::is_transient,
            "test",
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), DomainError> = retry_with_backoff(
            &fast(),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DomainError::InsufficientFunds {
                    balance: 10,
                    amount: 20,
                    floor: 0,
                })
            },
            DomainError::is_transient,
            "test",
        )
        .await;

        assert!(matches!(result, Err(DomainError::InsufficientFunds { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), DomainError> = retry_with_backoff(
            &fast(),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DomainError::Conflict("busy".into()))
            },
            DomainError::is_transient,
            "test",
        )
        .await;

        assert!(matches!(result, Err(DomainError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_grows_then_caps() {
        let cfg = fast();
        assert_eq!(next_delay(Duration::from_millis(1), &cfg), Duration::from_millis(2));
        assert_eq!(next_delay(Duration::from_millis(3), &cfg), Duration::from_millis(4));
    }

    #[test]
    fn unusable_multipliers_hold_the_delay() {
        for multiplier in [f64::NAN, -3.0, 0.5, f64::INFINITY] {
            let cfg = RetryConfig {
                backoff_multiplier: multiplier,
                ..fast()
            };
            assert_eq!(next_delay(Duration::from_millis(2), &cfg), Duration::from_millis(2));
        }
    }
}
