//! Retry classification and backoff policy for model calls.
//!
//! Pure decisions only: which errors deserve another attempt and how long to
//! wait before it. The loop that acts on these lives with the worker.

use std::time::Duration;

use crate::services::genmodel::ModelError;

pub const DEFAULT_MAX_RETRIES: u32 = 7;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);

/// Whether a failed attempt may be tried again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Retryable)
    }
}

/// Classify a model error. Rate limiting, transient overload and transport
/// failures are worth retrying; anything else would fail the same way again.
pub fn classify(err: &ModelError) -> ErrorClass {
    match err {
        ModelError::RateLimited(_) | ModelError::Unavailable(_) | ModelError::Network(_) => {
            ErrorClass::Retryable
        }
        ModelError::Api { .. } | ModelError::MissingImage | ModelError::BadResponse(_) => {
            ErrorClass::Fatal
        }
    }
}

/// Exponential backoff schedule: `initial_delay * 2^n` after the n-th failure
/// (zero-based), with a hard cap on total attempts. Deliberately no jitter:
/// a single sequential worker gains nothing from decorrelating itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts per photo, counting the first one.
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// Delay before the retry that follows failure number `failure_index`
    /// (zero-based). Saturates instead of overflowing for absurd indices.
    pub fn delay_for(&self, failure_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(failure_index);
        self.initial_delay.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 7);
        assert_eq!(policy.initial_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_delay_doubles_per_failure() {
        let policy = RetryPolicy::new(7, Duration::from_secs(5));
        assert_eq!(policy.delay_for(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(5), Duration::from_secs(160));
    }

    #[test]
    fn test_delay_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(7, Duration::from_secs(5));
        let huge = policy.delay_for(u32::MAX);
        assert!(huge > policy.delay_for(10));
    }

    #[test]
    fn test_rate_limit_and_overload_are_retryable() {
        assert_eq!(
            classify(&ModelError::RateLimited("quota".into())),
            ErrorClass::Retryable
        );
        assert_eq!(
            classify(&ModelError::Unavailable("overloaded".into())),
            ErrorClass::Retryable
        );
        assert!(classify(&ModelError::Unavailable("503".into())).is_retryable());
    }

    #[test]
    fn test_api_and_shape_errors_are_fatal() {
        assert_eq!(
            classify(&ModelError::Api {
                status: 400,
                message: "invalid argument".into()
            }),
            ErrorClass::Fatal
        );
        assert_eq!(classify(&ModelError::MissingImage), ErrorClass::Fatal);
        assert_eq!(
            classify(&ModelError::BadResponse("not json".into())),
            ErrorClass::Fatal
        );
    }
}
