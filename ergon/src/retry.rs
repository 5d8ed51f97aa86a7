//! Decides whether a failed request should be attempted again, and how long to wait first.
use std::time::Duration;

use chrono::TimeDelta;
use reqwest::StatusCode;

use crate::{backoff::BackoffStrategy, transport::TransportError};

/// Retry settings for a [`crate::Client`].
///
/// The defaults allow 3 retries, starting from 100ms and doubling each time, plus a random jitter
/// of up to 100ms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            jitter: Duration::from_millis(100),
        }
    }
}

impl RetryConfig {
    /// A configuration that never retries.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    pub fn with_base_delay(self, base_delay: Duration) -> Self {
        Self { base_delay, ..self }
    }

    pub fn with_jitter(self, jitter: Duration) -> Self {
        Self { jitter, ..self }
    }
}

/// A pure retry decision function over the attempt count and the outcome of the last attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: BackoffStrategy,
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(config)
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: BackoffStrategy::exponential(to_time_delta(config.base_delay))
                .with_jitter(to_time_delta(config.jitter)),
        }
    }

    /// Whether to retry after the `attempt`th retry (zero based) ended with either a response
    /// `status` or a transport `error`.
    ///
    /// Connection failures and timeouts, server errors (`5xx`) and rate limiting (`429`) are
    /// retried until `max_retries` retries have been performed. Anything else is final.
    ///
    /// # Example
    ///
    /// ```
    /// # use ergon::retry::{RetryConfig, RetryPolicy};
    /// # use reqwest::StatusCode;
    /// let policy = RetryPolicy::new(RetryConfig::default());
    ///
    /// assert!(policy.should_retry(0, Some(StatusCode::SERVICE_UNAVAILABLE), None));
    /// assert!(policy.should_retry(2, Some(StatusCode::TOO_MANY_REQUESTS), None));
    /// assert!(!policy.should_retry(3, Some(StatusCode::SERVICE_UNAVAILABLE), None));
    /// assert!(!policy.should_retry(0, Some(StatusCode::NOT_FOUND), None));
    /// ```
    pub fn should_retry(
        &self,
        attempt: u32,
        status: Option<StatusCode>,
        error: Option<&TransportError>,
    ) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        if error.is_some_and(TransportError::is_connection_failure) {
            return true;
        }
        match status {
            Some(status) => status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
            None => false,
        }
    }

    /// How long to wait before the next attempt: `base_delay * 2^attempt` plus jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff.backoff(attempt).to_std().unwrap_or(Duration::ZERO)
    }
}

fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::max_value())
}
