//! Retry with exponential backoff for transient database failures.
//!
//! Connection loss and transient query failures are retried up to a
//! configured attempt budget with exponentially growing, capped delays.
//! Non-retryable errors (configuration, schema, I/O) short-circuit on the
//! first attempt regardless of the budget.

use std::time::Duration;

use tracing::warn;

use crate::error::{ExtractorError, Result};

/// Substrings that identify a lost-connection driver error. Matched
/// case-insensitively against the driver's message text.
pub const CONNECTION_LOST_SIGNATURES: &[&str] = &[
    "server has gone away",
    "lost connection",
    "connection reset",
    "connection refused",
    "broken pipe",
    "connection closed",
    "pool timed out",
    "timed out",
];

/// Whether a driver error message looks like a lost or unreachable
/// connection rather than a SQL-level rejection.
pub fn is_transient_signature(message: &str) -> bool {
    let lowered = message.to_lowercase();
    CONNECTION_LOST_SIGNATURES
        .iter()
        .any(|sig| lowered.contains(sig))
}

/// Backoff policy for retryable operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Policy with the given attempt budget and default backoff timings.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based: attempt 1 is the first
    /// retry, issued after the first failure).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let millis =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent as i32);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Outcome of a retried operation, carrying how many attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// exhausts the attempt budget.
///
/// On exhaustion the last error is returned with its attempt count rewritten
/// to the configured budget, so "Connection failed after N attempt(s)"
/// reflects what actually happened.
pub async fn retry_with_outcome<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<RetryOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(RetryOutcome { value, attempts: attempt }),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retryable failure, backing off before next attempt"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                return Err(stamp_attempts(err, attempt));
            }
        }
    }
}

/// Like [`retry_with_outcome`] but discards the attempt count.
pub async fn retry<T, F, Fut>(config: &RetryConfig, operation_name: &str, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    retry_with_outcome(config, operation_name, operation)
        .await
        .map(|outcome| outcome.value)
}

fn stamp_attempts(err: ExtractorError, attempts: u32) -> ExtractorError {
    match err {
        ExtractorError::Connectivity { context, .. } => {
            ExtractorError::Connectivity { context, attempts }
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_growth_and_cap() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_multiplier: 2.0,
        };
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(350));
        assert_eq!(config.delay_for_attempt(10), Duration::from_millis(350));
    }

    #[test]
    fn test_transient_signatures() {
        assert!(is_transient_signature("MySQL server has gone away"));
        assert!(is_transient_signature("Connection reset by peer"));
        assert!(!is_transient_signature("syntax error near 'FROM'"));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let outcome = retry_with_outcome(&fast_config(5), "export", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(ExtractorError::connectivity("server has gone away"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_configured_budget() {
        let calls = AtomicU32::new(0);
        let err = retry_with_outcome(&fast_config(3), "export", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ExtractorError::connectivity("lost connection")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("after 3 attempt(s)"));
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let err = retry_with_outcome(&fast_config(5), "export", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ExtractorError::configuration("bad export")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ExtractorError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_query_errors_consume_retry_budget() {
        let calls = AtomicU32::new(0);
        let outcome = retry_with_outcome(&fast_config(2), "export", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 1 {
                    Err(ExtractorError::query_failed("deadlock detected"))
                } else {
                    Ok("rows")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.value, "rows");
    }

    #[tokio::test]
    async fn test_single_attempt_budget() {
        let calls = AtomicU32::new(0);
        let err = retry(&fast_config(1), "export", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ExtractorError::connectivity("refused")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.to_string().contains("after 1 attempt(s)"));
    }
}
