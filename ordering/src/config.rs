//! Configuration management for the lemonade stand.
//!
//! Loads configuration from `LEMONADE_*` environment variables with sensible
//! defaults. Unparseable values fall back to the default.

use crate::backend::{ConfirmationScheme, MockBackendConfig};
use crate::validation::PostalCodeFormat;
use lemonade_runtime::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Postal code syntax for delivery addresses
    pub postal_code_format: PostalCodeFormat,
    /// Submission retry settings
    pub submission: SubmissionConfig,
    /// Simulated backend settings
    pub backend: BackendConfig,
    /// Demo tracking loop settings
    pub tracking: TrackingConfig,
}

/// Submission retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Attempts per submission, including the first
    pub max_attempts: u32,
    /// Backoff base in milliseconds
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds (before jitter)
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter in milliseconds
    pub max_jitter_ms: u64,
    /// Timeout of a single backend call in milliseconds
    pub attempt_timeout_ms: u64,
}

/// Simulated backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Probability that a submission fails
    pub submit_failure_rate: f64,
    /// Probability that a read fails
    pub read_failure_rate: f64,
    /// Catalog latency in milliseconds
    pub catalog_latency_ms: u64,
    /// Submission latency in milliseconds
    pub submit_latency_ms: u64,
    /// Single-order lookup latency in milliseconds
    pub lookup_latency_ms: u64,
    /// Customer order list latency in milliseconds
    pub history_latency_ms: u64,
    /// Advance orders one status step per lookup
    pub auto_advance_status: bool,
    /// `sequential` or `random`
    pub confirmation_scheme: String,
    /// First sequential confirmation number
    pub confirmation_start: u64,
}

/// Demo tracking loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Interval between polls in milliseconds
    pub poll_interval_ms: u64,
    /// Maximum number of polls
    pub max_polls: u32,
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// A probability; non-finite values fall back to `default`.
fn parsed_rate(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f64) -> f64 {
    Some(parsed(lookup, key, default))
        .filter(|rate| rate.is_finite())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            log_level: lookup("LEMONADE_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            postal_code_format: parsed(
                &lookup,
                "LEMONADE_POSTAL_CODE_FORMAT",
                PostalCodeFormat::Canadian,
            ),
            submission: SubmissionConfig {
                max_attempts: parsed(&lookup, "LEMONADE_SUBMIT_MAX_ATTEMPTS", 3),
                base_delay_ms: parsed(&lookup, "LEMONADE_SUBMIT_BASE_DELAY_MS", 1000),
                max_delay_ms: parsed(&lookup, "LEMONADE_SUBMIT_MAX_DELAY_MS", 10_000),
                max_jitter_ms: parsed(&lookup, "LEMONADE_SUBMIT_MAX_JITTER_MS", 1000),
                attempt_timeout_ms: parsed(&lookup, "LEMONADE_ATTEMPT_TIMEOUT_MS", 15_000),
            },
            backend: BackendConfig {
                submit_failure_rate: parsed_rate(&lookup, "LEMONADE_SUBMIT_FAILURE_RATE", 0.2),
                read_failure_rate: parsed_rate(&lookup, "LEMONADE_READ_FAILURE_RATE", 0.1),
                catalog_latency_ms: parsed(&lookup, "LEMONADE_CATALOG_LATENCY_MS", 800),
                submit_latency_ms: parsed(&lookup, "LEMONADE_SUBMIT_LATENCY_MS", 1000),
                lookup_latency_ms: parsed(&lookup, "LEMONADE_LOOKUP_LATENCY_MS", 300),
                history_latency_ms: parsed(&lookup, "LEMONADE_HISTORY_LATENCY_MS", 400),
                auto_advance_status: parsed(&lookup, "LEMONADE_AUTO_ADVANCE_STATUS", true),
                confirmation_scheme: lookup("LEMONADE_CONFIRMATION_SCHEME")
                    .unwrap_or_else(|| "sequential".to_string()),
                confirmation_start: parsed(&lookup, "LEMONADE_CONFIRMATION_START", 1000),
            },
            tracking: TrackingConfig {
                poll_interval_ms: parsed(&lookup, "LEMONADE_TRACKING_POLL_MS", 30_000),
                max_polls: parsed(&lookup, "LEMONADE_TRACKING_MAX_POLLS", 5),
            },
        }
    }

    /// Backoff policy for submissions
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let s = &self.submission;
        RetryPolicy::new()
            .with_max_attempts(s.max_attempts)
            .with_initial_delay(Duration::from_millis(s.base_delay_ms))
            .with_max_delay(Duration::from_millis(s.max_delay_ms))
            .with_max_jitter(Duration::from_millis(s.max_jitter_ms))
    }

    /// Timeout of a single backend call
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.submission.attempt_timeout_ms)
    }

    /// Confirmation number scheme; unknown names fall back to sequential
    #[must_use]
    pub fn confirmation_scheme(&self) -> ConfirmationScheme {
        match self.backend.confirmation_scheme.parse::<ConfirmationScheme>() {
            Ok(ConfirmationScheme::Sequential { .. }) | Err(_) => ConfirmationScheme::Sequential {
                start: self.backend.confirmation_start,
            },
            Ok(ConfirmationScheme::Random) => ConfirmationScheme::Random,
        }
    }

    /// Latency and failure injection for the simulated backend
    #[must_use]
    pub fn mock_backend(&self) -> MockBackendConfig {
        let b = &self.backend;
        MockBackendConfig {
            catalog_latency: Duration::from_millis(b.catalog_latency_ms),
            submit_latency: Duration::from_millis(b.submit_latency_ms),
            lookup_latency: Duration::from_millis(b.lookup_latency_ms),
            history_latency: Duration::from_millis(b.history_latency_ms),
            submit_failure_rate: b.submit_failure_rate.clamp(0.0, 1.0),
            read_failure_rate: b.read_failure_rate.clamp(0.0, 1.0),
            auto_advance: b.auto_advance_status,
        }
    }

    /// Interval between tracking polls
    #[must_use]
    pub const fn tracking_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tracking.poll_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
