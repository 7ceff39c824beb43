//! Exponential backoff policy for retrying transient failures.
//!
//! The policy only computes *when* to retry; reducers schedule the next
//! attempt with an `Effect::Delay`, so every retry is an observable action.
//!
//! # Example
//!
//! ```rust
//! use lemonade_runtime::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new()
//!     .with_max_attempts(3)
//!     .with_initial_delay(Duration::from_millis(1000))
//!     .with_max_delay(Duration::from_secs(10))
//!     .with_max_jitter(Duration::ZERO);
//!
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
//! assert!(policy.should_retry(2));
//! assert!(!policy.should_retry(3));
//! ```

use rand::Rng;
use std::time::Duration;

/// Retry policy configuration for exponential backoff.
///
/// `delay(attempt) = min(initial_delay * multiplier^attempt, max_delay) + jitter`
/// where `jitter` is uniform in `[0, max_jitter]`. Adding jitter on top of
/// the capped base keeps concurrent clients from retrying in lockstep.
///
/// # Default Values
///
/// - `max_attempts`: 3 (including the first attempt)
/// - `initial_delay`: 1 second
/// - `max_delay`: 10 seconds
/// - `backoff_multiplier`: 2.0
/// - `max_jitter`: 1 second
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt)
    max_attempts: u32,

    /// Base delay, multiplied by `backoff_multiplier^attempt`
    initial_delay: Duration,

    /// Cap applied to the exponential part (jitter is added after the cap)
    max_delay: Duration,

    /// Multiplier for exponential backoff (2.0 = double each time)
    backoff_multiplier: f64,

    /// Upper bound of the random delay added to every backoff
    max_jitter: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy with default settings
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            max_jitter: Duration::from_secs(1),
        }
    }

    /// Set maximum attempts (at least one attempt is always made)
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// Set the base delay
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the cap for the exponential part of the delay
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the jitter bound (`Duration::ZERO` disables jitter)
    #[must_use]
    pub const fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.max_jitter = jitter;
        self
    }

    /// Capped exponential delay for `attempt`, without jitter.
    #[must_use]
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        // Attempt counts are tiny, saturate rather than wrap.
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64());

        if capped_secs.is_finite() && capped_secs > 0.0 {
            Duration::from_secs_f64(capped_secs)
        } else if capped_secs > 0.0 {
            self.max_delay
        } else {
            Duration::ZERO
        }
    }

    /// Delay to wait after `attempt` failed, jitter included.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for_attempt(attempt);
        if self.max_jitter.is_zero() {
            return base;
        }

        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = rand::thread_rng().gen_range(0..=jitter_ms);
        base.saturating_add(Duration::from_millis(jitter))
    }

    /// Longest possible delay for any attempt.
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        self.max_delay.saturating_add(self.max_jitter)
    }

    /// Get maximum number of attempts
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt may follow the 1-based `attempt` that just failed.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy::new().with_max_jitter(Duration::ZERO)
    }

    #[test]
    fn test_retry_policy_delay_calculation() {
        let policy = no_jitter();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(8000));
    }

    #[test]
    fn test_retry_policy_max_delay_cap() {
        let policy = no_jitter();

        // 1000ms * 2^4 = 16s, capped at 10s
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let policy = RetryPolicy::new();
        for _ in 0..200 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(3000));
        }
    }

    #[test]
    fn test_jitter_applies_above_cap() {
        let policy = RetryPolicy::new();
        let delay = policy.delay_for_attempt(10);
        assert!(delay >= Duration::from_secs(10));
        assert!(delay <= policy.max_backoff());
    }

    #[test]
    fn test_should_retry_counts_first_attempt() {
        let policy = RetryPolicy::new();
        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_zero_attempts_still_allows_one() {
        let policy = RetryPolicy::new().with_max_attempts(0);
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.should_retry(1));
    }
}
