use crate::config::SearchConfig;
use crate::error::ErrorCategory;
use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Maximum jitter as a fraction of the delay
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Retry schedule for rate-limited sources, derived from search settings
    #[must_use]
    pub fn for_rate_limits(search: &SearchConfig) -> Self {
        Self {
            max_attempts: search.max_rate_limit_retries + 1,
            initial_delay: search.rate_limit_backoff(),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Retry policy mapping error categories to retry schedules.
///
/// A category without a schedule fails immediately; permanent errors
/// never retry.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    transient: Option<RetryConfig>,
    rate_limited: Option<RetryConfig>,
}

impl RetryPolicy {
    /// Retry only rate-limit responses; transient failures fail fast.
    ///
    /// Used during fanout, where a failed source costs one round but a
    /// rate-limited source is worth waiting for.
    #[must_use]
    pub const fn rate_limit_only(config: RetryConfig) -> Self {
        Self {
            transient: None,
            rate_limited: Some(config),
        }
    }

    /// Retry both transient failures and rate limits
    #[must_use]
    pub const fn full(transient: RetryConfig, rate_limited: RetryConfig) -> Self {
        Self {
            transient: Some(transient),
            rate_limited: Some(rate_limited),
        }
    }

    #[must_use]
    pub fn config_for_error(&self, error: &Error) -> Option<&RetryConfig> {
        match error.category() {
            ErrorCategory::Permanent => None,
            ErrorCategory::RateLimited => self.rate_limited.as_ref(),
            ErrorCategory::Transient => self.transient.as_ref(),
        }
    }
}

/// Execute an operation with retry logic
pub async fn retry_with_policy<T, F, Fut>(
    operation: F,
    policy: &RetryPolicy,
    operation_name: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        "operation '{}' succeeded after {} attempts",
                        operation_name, attempt
                    );
                }
                return Ok(value);
            }
            Err(error) => {
                let Some(retry_config) = policy.config_for_error(&error) else {
                    debug!(
                        "operation '{}' failed with non-retryable error: {}",
                        operation_name, error
                    );
                    return Err(error);
                };

                if attempt >= retry_config.max_attempts {
                    warn!(
                        "operation '{}' failed after {} attempts: {}",
                        operation_name, attempt, error
                    );
                    return Err(error);
                }

                let delay = calculate_delay(attempt - 1, retry_config, &error);
                debug!(
                    "operation '{}' failed (attempt {}), retrying after {:?}: {}",
                    operation_name, attempt, delay, error
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Calculate delay for a retry attempt
fn calculate_delay(attempt: u32, config: &RetryConfig, error: &Error) -> Duration {
    // A server-provided Retry-After wins over the backoff schedule
    if let Some(retry_after) = error.retry_after() {
        return retry_after.min(config.max_delay);
    }

    let base_delay_ms = config.initial_delay.as_millis() as f64;
    let exponential_delay_ms = base_delay_ms * config.multiplier.powi(attempt as i32);
    let capped_delay_ms = exponential_delay_ms.min(config.max_delay.as_millis() as f64);
    let delay = Duration::from_millis(capped_delay_ms as u64);

    add_jitter(delay, config.jitter)
}

/// Add jitter to prevent synchronized retries
fn add_jitter(delay: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return delay;
    }

    use rand::Rng;
    let mut rng = rand::thread_rng();
    let jitter_ms = (delay.as_millis() as f64 * jitter_factor) as u64;
    let jitter = rng.gen_range(0..=jitter_ms);

    delay + Duration::from_millis(jitter)
}
