/*
 * Retry utilities with exponential backoff and jitter.
 *
 * Object-store listings are paginated; each page request is retried on
 * transient failures before the table's audit is marked failed.
 */

use crate::config::RetrySettings;
use crate::metrics::AuditMetrics;
use crate::{AuditError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just the initial attempt)
    pub max_retries: usize,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (typically 2.0)
    pub backoff_multiplier: f64,
    /// Add jitter to prevent thundering herd (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            ..Default::default()
        }
    }
}

impl RetryConfig {
    /// Calculates the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let jitter = if self.jitter_factor > 0.0 {
            // Deterministic golden-ratio jitter keeps tests reproducible
            let jitter_value = (attempt as f64 * 0.618033988749895) % 1.0;
            capped_delay * self.jitter_factor * jitter_value
        } else {
            0.0
        };

        Duration::from_secs_f64(capped_delay + jitter)
    }
}

/// A builder for constructing retry operations with custom configuration.
pub struct RetryBuilder<'a> {
    config: &'a RetryConfig,
    operation_name: Option<String>,
    metrics: Option<&'a AuditMetrics>,
}

impl<'a> RetryBuilder<'a> {
    /// Creates a new retry builder with the given configuration.
    pub fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            operation_name: None,
            metrics: None,
        }
    }

    /// Sets a name for the operation (used in logging).
    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Counts every retry against the given run counters.
    pub fn observe(mut self, metrics: &'a AuditMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Executes the operation with retry logic.
    pub async fn run<F, Fut, T>(self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let op_name = self.operation_name.as_deref().unwrap_or("operation");
        let mut attempt = 0;

        loop {
            let err = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{} succeeded on attempt {}", op_name, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                debug!("{}: non-retryable error: {}", op_name, err);
                return Err(err);
            }

            let attempts_remaining = self.config.max_retries.saturating_sub(attempt);
            if attempts_remaining == 0 {
                warn!(
                    "{}: all {} retries exhausted: {}",
                    op_name, self.config.max_retries, err
                );
                return Err(AuditError::Listing(format!(
                    "{} failed after {} attempts: {}",
                    op_name,
                    attempt + 1,
                    err
                )));
            }

            let delay = err
                .suggested_retry_delay()
                .unwrap_or_else(|| self.config.delay_for_attempt(attempt));

            warn!(
                "{}: attempt {} failed ({} remaining), retrying in {:?}: {}",
                op_name,
                attempt + 1,
                attempts_remaining,
                delay,
                err
            );

            if let Some(metrics) = self.metrics {
                metrics.record_retry();
            }

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.0,
            ..Default::default()
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 10.0,
            max_delay: Duration::from_secs(5),
            jitter_factor: 0.0,
            ..Default::default()
        };

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }

    #[test]
    fn test_from_settings() {
        let settings = RetrySettings {
            max_retries: 4,
            initial_delay_ms: 50,
            max_delay_ms: 1_000,
        };
        let config = RetryConfig::from(&settings);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.initial_delay, Duration::from_millis(50));
        assert_eq!(config.max_delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retry_success_after_transient_failures() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..Default::default()
        };
        let metrics = AuditMetrics::new();
        let attempts = AtomicUsize::new(0);

        let result: Result<i32> = RetryBuilder::new(&config)
            .operation("list page")
            .observe(&metrics)
            .run(|| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(AuditError::Storage("transient".to_string()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.snapshot().listing_retries, 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_listing_error() {
        let config = RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let attempts = AtomicUsize::new(0);

        let result: Result<()> = RetryBuilder::new(&config).run(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(AuditError::Storage("throttled".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(AuditError::Listing(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let config = RetryConfig::default();
        let attempts = AtomicUsize::new(0);

        let result: Result<()> = RetryBuilder::new(&config).run(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(AuditError::ManifestRead("bad".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(AuditError::ManifestRead(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
