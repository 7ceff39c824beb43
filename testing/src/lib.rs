//! # Lemonade Testing
//!
//! Testing utilities and helpers for the ordering engine.
//!
//! This crate provides:
//! - Deterministic implementations of Environment traits
//! - A Given-When-Then harness for reducers
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use lemonade_testing::{test_clock, SequentialIdGenerator};
//!
//! let env = OrderEnvironment::new(backend, Arc::new(test_clock()), Arc::new(SequentialIdGenerator::new()));
//! ```

use chrono::{DateTime, Utc};
use lemonade_core::environment::{Clock, IdGenerator};


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use lemonade_testing::mocks::FixedClock;
    /// use lemonade_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable ids: `"1"`, `"2"`, `"3"`, ...
    ///
    /// # Example
    ///
    /// ```
    /// use lemonade_testing::mocks::SequentialIdGenerator;
    /// use lemonade_core::environment::IdGenerator;
    ///
    /// let ids = SequentialIdGenerator::new();
    /// assert_eq!(ids.next_id(), "1");
    /// assert_eq!(ids.next_id(), "2");
    /// ```
    #[derive(Debug, Default)]
    pub struct SequentialIdGenerator {
        last: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Start counting from 1.
        #[must_use]
        pub const fn new() -> Self {
            Self {
                last: AtomicU64::new(0),
            }
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> String {
            (self.last.fetch_add(1, Ordering::SeqCst) + 1).to_string()
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, SequentialIdGenerator, test_clock};
pub use reducer_test::{ReducerTest, assertions};
